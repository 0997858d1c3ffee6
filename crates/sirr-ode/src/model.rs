//! Right-hand side of the SIRR system

use sirr_core::{Compartments, RateParameters};

/// Instantaneous rate of change of every compartment.
///
/// ```text
/// dS/dt  = -beta*S*I + birthrate*(S+I+R+Re) - deathrate*S
/// dI/dt  =  beta*S*I - gamma*I + delta*R - deathrate*I
/// dR/dt  =  gamma*I - delta*R - deathrate*R
/// dRe/dt =  delta*R - deathrate*Re
/// ```
///
/// The system is autonomous, so `_t` does not enter the equations. Re has no
/// outflow other than death.
pub fn rates(state: &Compartments, _t: f64, params: &RateParameters) -> Compartments {
    let mut dy = [0.0; 4];
    rates_into(&state.to_array(), params, &mut dy);
    Compartments::from_array(dy)
}

/// Slice form of [`rates`] used by the integrator
pub(crate) fn rates_into(y: &[f64], params: &RateParameters, dy: &mut [f64]) {
    let (s, i, r, re) = (y[0], y[1], y[2], y[3]);
    let total = s + i + r + re;
    let infections = params.beta * s * i;

    dy[0] = -infections + params.birthrate * total - params.deathrate * s;
    dy[1] = infections - params.gamma * i + params.delta * r - params.deathrate * i;
    dy[2] = params.gamma * i - params.delta * r - params.deathrate * r;
    dy[3] = params.delta * r - params.deathrate * re;
}
