use log::debug;
use sirr_core::types::parameters::validate_rate;
use sirr_core::{
    Compartments, ParameterId, RateParameters, SimulationEngine, SimulationError, TimeGrid,
    Trajectory,
};

use crate::integrator::{self, IntegratorConfig, State};
use crate::model::{rates, rates_into};

/// The SIRR ODE system with fixed initial conditions
#[derive(Debug, Clone, PartialEq)]
pub struct OdeEngine {
    initial_state: Compartments,
    parameters: RateParameters,
    config: IntegratorConfig,
}

impl OdeEngine {
    /// Create an engine, rejecting negative populations or rates
    pub fn new(
        initial_state: Compartments,
        parameters: RateParameters,
    ) -> Result<Self, SimulationError> {
        initial_state.validate()?;
        parameters.validate()?;
        Ok(Self {
            initial_state,
            parameters,
            config: IntegratorConfig::default(),
        })
    }

    /// Replace the integrator tolerances and budget
    pub fn with_config(mut self, config: IntegratorConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    pub fn set_parameters(&mut self, parameters: RateParameters) -> Result<(), SimulationError> {
        parameters.validate()?;
        self.parameters = parameters;
        Ok(())
    }
}

impl SimulationEngine for OdeEngine {
    fn initial_state(&self) -> Compartments {
        self.initial_state
    }

    fn parameters(&self) -> RateParameters {
        self.parameters
    }

    fn set_parameter(
        &mut self,
        parameter_id: ParameterId,
        value: f64,
    ) -> Result<(), SimulationError> {
        validate_rate(parameter_id, value)?;
        self.parameters.set(parameter_id, value);
        Ok(())
    }

    fn simulate(&self, grid: &TimeGrid) -> Result<Trajectory, SimulationError> {
        integrate(&self.initial_state, grid, &self.parameters, &self.config)
    }
}

/// Integrate the SIRR system from `initial` over `grid`.
///
/// The first state of the result is `initial` itself. A state where every
/// rate vanishes is a fixed point of the autonomous system and is returned
/// unchanged without stepping.
pub fn integrate(
    initial: &Compartments,
    grid: &TimeGrid,
    params: &RateParameters,
    config: &IntegratorConfig,
) -> Result<Trajectory, SimulationError> {
    initial.validate()?;
    params.validate()?;
    config.validate()?;

    let times = grid.points();
    if times.len() == 1 || rates(initial, times[0], params) == Compartments::ZERO {
        return Trajectory::new(grid.clone(), vec![*initial; times.len()]);
    }

    let rhs = |_t: f64, y: &State, dy: &mut State| {
        rates_into(y.as_slice(), params, dy.as_mut_slice())
    };
    let [s, i, r, re] = initial.to_array();
    let (states, stats) = integrator::integrate(&rhs, State::new(s, i, r, re), times, config)?;
    debug!(
        "integrated {} points over [{}, {}]: {} evaluations, {} accepted / {} rejected steps",
        times.len(),
        grid.start(),
        grid.end(),
        stats.evaluations,
        stats.accepted_steps,
        stats.rejected_steps
    );

    let states = states
        .iter()
        .map(|y| Compartments::new(y[0], y[1], y[2], y[3]))
        .collect();
    Trajectory::new(grid.clone(), states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sirr_core::{Compartment, Observable};

    fn outbreak_engine() -> OdeEngine {
        OdeEngine::new(
            Compartments::new(1000.0, 10.0, 0.0, 0.0),
            RateParameters::new(0.3, 0.05, 0.02, 0.01, 0.01),
        )
        .unwrap()
    }

    #[test]
    fn test_single_point_grid_returns_initial_state() {
        let engine = outbreak_engine();
        let grid = TimeGrid::new(vec![4.0]).unwrap();
        let trajectory = engine.simulate(&grid).unwrap();
        assert_eq!(trajectory.states(), &[engine.initial_state()]);
    }

    #[test]
    fn test_zero_population_stays_zero() {
        let engine = OdeEngine::new(
            Compartments::ZERO,
            RateParameters::new(0.3, 0.05, 0.02, 0.01, 0.01),
        )
        .unwrap();
        let grid = TimeGrid::linspace(0.0, 50.0, 11).unwrap();
        let trajectory = engine.simulate(&grid).unwrap();
        assert!(trajectory.states().iter().all(|s| *s == Compartments::ZERO));
    }

    #[test]
    fn test_first_state_is_initial_state() {
        let engine = outbreak_engine();
        let grid = TimeGrid::linspace(0.0, 50.0, 365).unwrap();
        let trajectory = engine.simulate(&grid).unwrap();
        assert_eq!(trajectory.len(), 365);
        assert_eq!(*trajectory.initial_state(), engine.initial_state());
    }

    #[test]
    fn test_population_is_constant_with_balanced_demography() {
        // with delta = 0 and birthrate == deathrate, S + I + R + Re is fixed
        let engine = OdeEngine::new(
            Compartments::new(1000.0, 10.0, 0.0, 0.0),
            RateParameters::new(0.3, 0.05, 0.0, 0.01, 0.01),
        )
        .unwrap();
        let grid = TimeGrid::linspace(0.0, 50.0, 101).unwrap();
        let trajectory = engine.simulate(&grid).unwrap();
        for total in trajectory.totals() {
            assert!((total - 1010.0).abs() < 1e-5, "total drifted to {}", total);
        }
    }

    #[test]
    fn test_population_grows_exponentially_with_net_births() {
        let engine = OdeEngine::new(
            Compartments::new(1000.0, 10.0, 0.0, 0.0),
            RateParameters::new(0.3, 0.05, 0.0, 0.03, 0.01),
        )
        .unwrap();
        let grid = TimeGrid::linspace(0.0, 20.0, 21).unwrap();
        let trajectory = engine.simulate(&grid).unwrap();
        for (t, total) in grid.points().iter().zip(trajectory.totals()) {
            let expected = 1010.0 * (0.02 * t).exp();
            assert!((total - expected).abs() / expected < 1e-7);
        }
    }

    #[test]
    fn test_relapse_adds_to_the_population() {
        // delta * R enters both I and Re but leaves R only once
        let engine = outbreak_engine();
        let grid = TimeGrid::linspace(0.0, 50.0, 101).unwrap();
        let trajectory = engine.simulate(&grid).unwrap();
        let totals = trajectory.totals();
        let recovered = trajectory.series(Compartment::Recovered);
        let dt = grid.points()[1] - grid.points()[0];

        // trapezoid rule on d(total)/dt = delta * R with balanced demography
        let mut expected = totals[0];
        for k in 1..totals.len() {
            expected += 0.5 * dt * 0.02 * (recovered[k - 1] + recovered[k]);
            let error = (totals[k] - expected).abs() / expected;
            assert!(error < 1e-3, "t = {}: {} vs {}", grid.points()[k], totals[k], expected);
        }
        assert!(totals[totals.len() - 1] > 1100.0);
    }

    #[test]
    fn test_projection_matches_series() {
        let engine = outbreak_engine();
        let grid = TimeGrid::linspace(0.0, 10.0, 50).unwrap();
        let infected = engine.project(&grid, &Observable::infected()).unwrap();
        let trajectory = engine.simulate(&grid).unwrap();
        assert_eq!(infected, trajectory.series(Compartment::Infected));
    }

    #[test]
    fn test_deterministic() {
        let engine = outbreak_engine();
        let grid = TimeGrid::linspace(0.0, 50.0, 365).unwrap();
        assert_eq!(engine.simulate(&grid).unwrap(), engine.simulate(&grid).unwrap());
    }

    #[test]
    fn test_rejects_invalid_inputs() {
        let params = RateParameters::new(0.3, 0.05, 0.02, 0.01, 0.01);
        assert!(OdeEngine::new(Compartments::new(-1.0, 10.0, 0.0, 0.0), params).is_err());

        let mut bad = params;
        bad.beta = -0.3;
        assert!(OdeEngine::new(Compartments::new(1000.0, 10.0, 0.0, 0.0), bad).is_err());

        let mut engine = outbreak_engine();
        assert!(engine.set_parameter(ParameterId::Gamma, -0.1).is_err());
        assert!(engine.set_parameter(ParameterId::Gamma, 0.1).is_ok());
        assert_eq!(engine.parameters().gamma, 0.1);

        let grid = TimeGrid::linspace(0.0, 1.0, 3).unwrap();
        let result = integrate(
            &Compartments::new(1.0, f64::NAN, 0.0, 0.0),
            &grid,
            &params,
            &IntegratorConfig::default(),
        );
        assert!(matches!(result, Err(SimulationError::InvalidInput(_))));
    }

    #[test]
    fn test_step_budget_is_reported_as_integration_failure() {
        let engine = outbreak_engine()
            .with_config(IntegratorConfig::default().with_max_steps(10))
            .unwrap();
        let grid = TimeGrid::linspace(0.0, 50.0, 365).unwrap();
        let err = engine.simulate(&grid).unwrap_err();
        assert!(err.is_integration_failure());
    }
}
