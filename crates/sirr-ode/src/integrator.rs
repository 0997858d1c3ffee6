//! Dormand–Prince 5(4) integration reported at prescribed times
//!
//! The stepping itself is `ode_solvers::Dopri5`. Each grid interval is one
//! solver run ending exactly on the next output time, and the step budget is
//! shared by all intervals.

use log::trace;
use ode_solvers::dop_shared::{OutputType, Stats};
use ode_solvers::dopri5::Dopri5;
use ode_solvers::{System, Vector4};
use serde::{Deserialize, Serialize};
use sirr_core::SimulationError;

/// State vector handed to the solver, ordered `(S, I, R, Re)`
pub type State = Vector4<f64>;

// Step size controller, Hairer's defaults
const SAFETY: f64 = 0.9;
const PI_BETA: f64 = 0.04;
const FAC_MIN: f64 = 0.2;
const FAC_MAX: f64 = 10.0;
const STIFFNESS_CHECK_STEPS: u32 = 1000;

/// Tolerances and budget of the integrator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    /// Relative error tolerance per step
    pub rtol: f64,

    /// Absolute error tolerance per step
    pub atol: f64,

    /// Maximum number of attempted steps over one integration
    pub max_steps: u32,

    /// First step size of every interval; estimated by the solver when `None`
    pub initial_step: Option<f64>,

    /// Upper limit on the step size; the interval width when `None`
    pub max_step: Option<f64>,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-10,
            atol: 1e-8,
            max_steps: 100_000,
            initial_step: None,
            max_step: None,
        }
    }
}

impl IntegratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rtol(mut self, rtol: f64) -> Self {
        self.rtol = rtol;
        self
    }

    pub fn with_atol(mut self, atol: f64) -> Self {
        self.atol = atol;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_initial_step(mut self, initial_step: f64) -> Self {
        self.initial_step = Some(initial_step);
        self
    }

    pub fn with_max_step(mut self, max_step: f64) -> Self {
        self.max_step = Some(max_step);
        self
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(SimulationError::invalid_input(format!(
                    "integrator {} must be finite and positive, got {}",
                    name, value
                )))
            }
        };
        positive("rtol", self.rtol)?;
        positive("atol", self.atol)?;
        if let Some(h) = self.initial_step {
            positive("initial_step", h)?;
        }
        if let Some(h) = self.max_step {
            positive("max_step", h)?;
        }
        if self.max_steps == 0 {
            return Err(SimulationError::invalid_input(
                "integrator max_steps must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Work counters summed over every interval of one integration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegrationStats {
    pub evaluations: u32,
    pub accepted_steps: u32,
    pub rejected_steps: u32,
}

impl IntegrationStats {
    /// Attempted steps so far
    pub fn steps(&self) -> u32 {
        self.accepted_steps + self.rejected_steps
    }

    fn record(&mut self, interval: &Stats) {
        self.evaluations += interval.num_eval;
        self.accepted_steps += interval.accepted_steps;
        self.rejected_steps += interval.rejected_steps;
    }
}

/// Adapts a borrowed right-hand side to the solver's `System` trait
struct RightHandSide<'a, F>(&'a F);

impl<F> System<f64, State> for RightHandSide<'_, F>
where
    F: Fn(f64, &State, &mut State),
{
    fn system(&self, t: f64, y: &State, dy: &mut State) {
        (self.0)(t, y, dy)
    }
}

/// Integrate `dy/dt = f(t, y)` from `y0` at `times[0]`, returning the state
/// at every entry of `times` (which must be strictly increasing).
pub fn integrate<F>(
    f: &F,
    y0: State,
    times: &[f64],
    config: &IntegratorConfig,
) -> Result<(Vec<State>, IntegrationStats), SimulationError>
where
    F: Fn(f64, &State, &mut State),
{
    let mut stats = IntegrationStats::default();
    let mut states = Vec::with_capacity(times.len());
    states.push(y0);

    let mut y = y0;
    for window in times.windows(2) {
        let (t0, t1) = (window[0], window[1]);
        let remaining = config.max_steps.saturating_sub(stats.steps());
        if remaining == 0 {
            return Err(failure(
                t0,
                format!("step budget of {} exhausted", config.max_steps),
            ));
        }

        let width = t1 - t0;
        let h_max = config.max_step.map_or(width, |h| h.min(width));
        // zero lets the solver pick the first step
        let h_first = config.initial_step.map_or(0.0, |h| h.min(h_max));

        let mut stepper = Dopri5::from_param(
            RightHandSide(f),
            t0,
            t1,
            width,
            y,
            config.rtol,
            config.atol,
            SAFETY,
            PI_BETA,
            FAC_MIN,
            FAC_MAX,
            h_max,
            h_first,
            remaining,
            STIFFNESS_CHECK_STEPS,
            OutputType::Sparse,
        );
        let interval = stepper
            .integrate()
            .map_err(|err| failure(t0, err.to_string()))?;
        stats.record(&interval);
        trace!(
            "[{}, {}]: {} accepted / {} rejected steps",
            t0, t1, interval.accepted_steps, interval.rejected_steps
        );

        y = match stepper.y_out().last() {
            Some(end) => *end,
            None => return Err(failure(t0, "solver produced no output".to_string())),
        };
        if y.iter().any(|v| !v.is_finite()) {
            return Err(failure(t1, "state became non-finite".to_string()));
        }
        states.push(y);
    }

    Ok((states, stats))
}

fn failure(time: f64, reason: String) -> SimulationError {
    SimulationError::IntegrationFailure { time, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exponential_decay(rate: f64) -> impl Fn(f64, &State, &mut State) {
        move |_t, y, dy| {
            dy.fill(0.0);
            dy[0] = -rate * y[0];
        }
    }

    fn initial(first: f64, second: f64) -> State {
        State::new(first, second, 0.0, 0.0)
    }

    #[test]
    fn test_matches_exponential_decay_at_output_times() {
        let times: Vec<f64> = (0..=20).map(|i| i as f64 * 0.5).collect();
        let (states, stats) = integrate(
            &exponential_decay(0.7),
            initial(2.0, 0.0),
            &times,
            &IntegratorConfig::default(),
        )
        .unwrap();

        assert_eq!(states.len(), times.len());
        for (t, y) in times.iter().zip(&states) {
            let exact = 2.0 * (-0.7 * t).exp();
            assert!((y[0] - exact).abs() < 1e-8, "t = {}: {} vs {}", t, y[0], exact);
        }
        assert!(stats.accepted_steps >= 20);
        assert!(stats.evaluations >= 6 * stats.accepted_steps);
    }

    #[test]
    fn test_harmonic_oscillator_on_uneven_grid() {
        let times = [0.0, 0.1, 0.15, 1.0, 3.7, 10.0];
        let oscillator = |_t: f64, y: &State, dy: &mut State| {
            dy.fill(0.0);
            dy[0] = y[1];
            dy[1] = -y[0];
        };
        let (states, _) = integrate(
            &oscillator,
            initial(1.0, 0.0),
            &times,
            &IntegratorConfig::default(),
        )
        .unwrap();

        for (t, y) in times.iter().zip(&states) {
            assert!((y[0] - t.cos()).abs() < 1e-7);
            assert!((y[1] + t.sin()).abs() < 1e-7);
        }
    }

    #[test]
    fn test_first_output_is_initial_state() {
        let (states, stats) = integrate(
            &exponential_decay(1.0),
            initial(5.0, 0.0),
            &[2.0],
            &IntegratorConfig::default(),
        )
        .unwrap();
        assert_eq!(states, vec![initial(5.0, 0.0)]);
        assert_eq!(stats, IntegrationStats::default());
    }

    #[test]
    fn test_step_budget_is_shared_across_intervals() {
        let times: Vec<f64> = (0..=50).map(f64::from).collect();
        let config = IntegratorConfig::default().with_max_steps(5);
        let err = integrate(&exponential_decay(1.0), initial(1.0, 0.0), &times, &config)
            .unwrap_err();
        assert!(err.is_integration_failure());
    }

    #[test]
    fn test_budget_exhausted_inside_one_interval_fails() {
        let config = IntegratorConfig::default().with_max_steps(5);
        let result = integrate(
            &exponential_decay(1.0),
            initial(1.0, 0.0),
            &[0.0, 1000.0],
            &config,
        );
        assert!(matches!(
            result,
            Err(SimulationError::IntegrationFailure { .. })
        ));
    }

    #[test]
    fn test_blow_up_fails() {
        // dy/dt = y^2 with y(0) = 1 escapes to infinity at t = 1
        let blow_up = |_t: f64, y: &State, dy: &mut State| {
            dy.fill(0.0);
            dy[0] = y[0] * y[0];
        };
        let config = IntegratorConfig::default().with_max_steps(20_000);
        let result = integrate(&blow_up, initial(1.0, 0.0), &[0.0, 2.0], &config);
        assert!(matches!(
            result,
            Err(SimulationError::IntegrationFailure { .. })
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(IntegratorConfig::default().validate().is_ok());
        assert!(IntegratorConfig::default().with_rtol(0.0).validate().is_err());
        assert!(IntegratorConfig::default().with_atol(-1.0).validate().is_err());
        assert!(
            IntegratorConfig::default()
                .with_max_steps(0)
                .validate()
                .is_err()
        );
    }
}
