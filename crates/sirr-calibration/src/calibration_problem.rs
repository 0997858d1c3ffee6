//! Calibration problem definition and implementation

use std::collections::HashSet;

use argmin::core::{CostFunction, Error, Operator};
use log::warn;
use sirr_core::{ParameterId, SimulationEngine, SimulationError, TimeGrid};

use crate::error::CalibrationError;
use crate::jacobian::{covariance, forward_difference, gradient};
use crate::types::{CalibrationParameter, LossConfig, ObservedSeries};

/// Residual assigned to every observation when a trial simulation cannot be
/// integrated. Large enough that no optimizer accepts such a point.
pub const FAILED_SIMULATION_RESIDUAL: f64 = 1e6;

/// Least-squares calibration problem for any [`SimulationEngine`].
///
/// The engine carries the fixed initial conditions and the values of any
/// rate parameter that is not calibrated. Each evaluation clones it, applies
/// the trial parameters and compares the simulated observables against the
/// observed series on a shared time grid.
///
/// # Example
///
/// ```rust,ignore
/// use sirr_calibration::{CalibrationParameter, CalibrationProblem, LossConfig, ObservedSeries};
///
/// let problem = CalibrationProblem::new(
///     engine,
///     grid,
///     vec![ObservedSeries::infected(observed)],
///     CalibrationParameter::default_bounds(),
///     LossConfig::SumSquaredError,
/// )?;
/// ```
#[derive(Debug, Clone)]
pub struct CalibrationProblem<E: SimulationEngine> {
    /// Base engine used as template (cloned for each evaluation)
    base_engine: E,

    /// Time points shared by all observed series
    grid: TimeGrid,

    /// Observed series to fit against
    observations: Vec<ObservedSeries>,

    /// Parameters to calibrate with their bounds
    parameters: Vec<CalibrationParameter>,

    /// Loss function configuration
    loss_config: LossConfig,
}

impl<E: SimulationEngine> CalibrationProblem<E> {
    /// Create a new calibration problem
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when:
    /// - no observations or no calibration parameters are given
    /// - a series length differs from the grid length
    /// - an observed value is not finite or a weight is not positive
    /// - a parameter id appears twice
    /// - a bound is not finite, is negative, or `min_bound > max_bound`
    /// - an explicit initial guess lies outside its bounds
    pub fn new(
        base_engine: E,
        grid: TimeGrid,
        observations: Vec<ObservedSeries>,
        parameters: Vec<CalibrationParameter>,
        loss_config: LossConfig,
    ) -> Result<Self, CalibrationError> {
        if observations.is_empty() {
            return Err(CalibrationError::invalid_input("No observed data provided"));
        }

        if parameters.is_empty() {
            return Err(CalibrationError::invalid_input(
                "No calibration parameters provided",
            ));
        }

        for (index, series) in observations.iter().enumerate() {
            series.observable.validate().map_err(|error| match error {
                SimulationError::InvalidInput(message) => CalibrationError::InvalidInput(message),
                other => CalibrationError::Simulation(other),
            })?;
            if series.values.len() != grid.len() {
                return Err(CalibrationError::invalid_input(format!(
                    "series {} ({}) has {} values but the time grid has {} points",
                    index,
                    series.observable,
                    series.values.len(),
                    grid.len()
                )));
            }
            if let Some(position) = series.values.iter().position(|v| !v.is_finite()) {
                return Err(CalibrationError::invalid_input(format!(
                    "series {} ({}) has a non-finite value at t = {}",
                    index,
                    series.observable,
                    grid.points()[position]
                )));
            }
            if !(series.weight.is_finite() && series.weight > 0.0) {
                return Err(CalibrationError::invalid_input(format!(
                    "series {} ({}) has weight {}, weights must be positive",
                    index, series.observable, series.weight
                )));
            }
        }

        let mut seen = HashSet::new();
        for param in &parameters {
            if !seen.insert(param.id) {
                return Err(CalibrationError::invalid_input(format!(
                    "parameter '{}' is listed more than once",
                    param.id
                )));
            }
            validate_bounds(param)?;
        }

        Ok(Self {
            base_engine,
            grid,
            observations,
            parameters,
            loss_config,
        })
    }

    /// Get the number of parameters being calibrated
    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    /// Total number of residuals across all series
    pub fn num_residuals(&self) -> usize {
        self.observations.iter().map(|s| s.values.len()).sum()
    }

    /// Get parameter ids in order
    pub fn parameter_names(&self) -> Vec<ParameterId> {
        self.parameters.iter().map(|p| p.id).collect()
    }

    /// Get initial parameter values
    pub fn initial_parameters(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.initial_value()).collect()
    }

    /// Get parameter bounds as (min, max) tuples
    pub fn parameter_bounds(&self) -> Vec<(f64, f64)> {
        self.parameters
            .iter()
            .map(|p| (p.min_bound, p.max_bound))
            .collect()
    }

    pub fn loss_config(&self) -> LossConfig {
        self.loss_config
    }

    pub fn base_engine(&self) -> &E {
        &self.base_engine
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    /// Weighted residuals `weight * (model - observed)` for every series,
    /// concatenated in series order
    ///
    /// Parameters are clamped to their bounds first. A trial that cannot be
    /// integrated yields [`FAILED_SIMULATION_RESIDUAL`] everywhere; any other
    /// simulation error is returned.
    pub fn residuals(&self, param_values: &[f64]) -> Result<Vec<f64>, CalibrationError> {
        self.validate_parameter_count(param_values)?;
        match self.try_residuals(param_values)? {
            Some(residuals) => Ok(residuals),
            None => Ok(vec![FAILED_SIMULATION_RESIDUAL; self.num_residuals()]),
        }
    }

    /// Scalar loss at `param_values` according to the configured loss
    pub fn loss(&self, param_values: &[f64]) -> Result<f64, CalibrationError> {
        Ok(self.loss_config.evaluate(&self.residuals(param_values)?))
    }

    /// Whether the model can be integrated at `param_values`
    pub fn is_simulable(&self, param_values: &[f64]) -> Result<bool, CalibrationError> {
        self.validate_parameter_count(param_values)?;
        Ok(self.try_residuals(param_values)?.is_some())
    }

    /// Covariance estimate `s² (JᵀJ)⁻¹` at `param_values`
    ///
    /// Parameters held against a bound by the gradient are excluded and get
    /// zero rows and columns. `None` when the point cannot be simulated,
    /// when there are no more residuals than free parameters, or when the
    /// normal matrix is singular.
    pub fn covariance(
        &self,
        param_values: &[f64],
    ) -> Result<Option<Vec<Vec<f64>>>, CalibrationError> {
        self.validate_parameter_count(param_values)?;
        let params = self.clamp_to_bounds(param_values);
        let Some(residuals) = self.try_residuals(&params)? else {
            return Ok(None);
        };

        let bounds = self.parameter_bounds();
        let jacobian = forward_difference(&params, &residuals, &bounds, |trial| {
            self.residuals(trial).map_err(Error::from)
        })
        .map_err(CalibrationError::from)?;

        let grad = gradient(&jacobian, &residuals);
        let free: Vec<bool> = bounds
            .iter()
            .enumerate()
            .map(|(j, (lower, upper))| {
                !((params[j] <= *lower && grad[j] > 0.0) || (params[j] >= *upper && grad[j] < 0.0))
            })
            .collect();

        let ssr = residuals.iter().map(|r| r * r).sum();
        Ok(covariance(&jacobian, ssr, &free))
    }

    /// Simulate at clamped parameters; `None` when integration failed
    fn try_residuals(&self, param_values: &[f64]) -> Result<Option<Vec<f64>>, SimulationError> {
        let clamped_params = self.clamp_to_bounds(param_values);

        let mut engine = self.base_engine.clone();
        for (value, param) in clamped_params.iter().zip(&self.parameters) {
            engine.set_parameter(param.id, *value)?;
        }

        let trajectory = match engine.simulate(&self.grid) {
            Ok(trajectory) => trajectory,
            Err(error) if error.is_integration_failure() => {
                warn!(
                    "simulation failed at {:?}, penalising trial: {}",
                    clamped_params, error
                );
                return Ok(None);
            }
            Err(error) => return Err(error),
        };

        let mut residuals = Vec::with_capacity(self.num_residuals());
        for series in &self.observations {
            let predicted = trajectory.project(&series.observable);
            residuals.extend(
                predicted
                    .iter()
                    .zip(&series.values)
                    .map(|(model, observed)| series.weight * (model - observed)),
            );
        }
        Ok(Some(residuals))
    }

    /// Clamp parameter values to their defined bounds
    ///
    /// Nelder-Mead explores outside the bounds freely, so every evaluation
    /// sees the nearest admissible point instead.
    fn clamp_to_bounds(&self, param_values: &[f64]) -> Vec<f64> {
        param_values
            .iter()
            .zip(&self.parameters)
            .map(|(value, param)| value.clamp(param.min_bound, param.max_bound))
            .collect()
    }

    /// Validate parameter vector length
    fn validate_parameter_count(&self, param_values: &[f64]) -> Result<(), CalibrationError> {
        if param_values.len() != self.parameters.len() {
            return Err(CalibrationError::invalid_input(format!(
                "Expected {} parameters, got {}",
                self.parameters.len(),
                param_values.len()
            )));
        }
        Ok(())
    }
}

fn validate_bounds(param: &CalibrationParameter) -> Result<(), CalibrationError> {
    let (lower, upper) = (param.min_bound, param.max_bound);
    if !(lower.is_finite() && upper.is_finite()) {
        return Err(CalibrationError::invalid_input(format!(
            "parameter '{}' has non-finite bounds [{}, {}]",
            param.id, lower, upper
        )));
    }
    if lower < 0.0 {
        return Err(CalibrationError::invalid_input(format!(
            "parameter '{}' has negative lower bound {}, rates must be non-negative",
            param.id, lower
        )));
    }
    if lower > upper {
        return Err(CalibrationError::invalid_input(format!(
            "parameter '{}' has lower bound {} above upper bound {}",
            param.id, lower, upper
        )));
    }
    if let Some(guess) = param.initial_guess {
        if !param.is_within_bounds(guess) {
            return Err(CalibrationError::invalid_input(format!(
                "initial guess {} for '{}' lies outside [{}, {}]",
                guess, param.id, lower, upper
            )));
        }
    }
    Ok(())
}

/// Scalar loss for derivative-free solvers such as Nelder-Mead
impl<E: SimulationEngine> CostFunction for CalibrationProblem<E> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param_values: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.loss(param_values)?)
    }
}

/// Residual vector for least-squares solvers
impl<E: SimulationEngine> Operator for CalibrationProblem<E> {
    type Param = Vec<f64>;
    type Output = Vec<f64>;

    fn apply(&self, param_values: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.residuals(param_values)?)
    }
}
