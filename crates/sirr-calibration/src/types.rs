//! Type definitions for calibration

use serde::{Deserialize, Serialize};
use sirr_core::{Observable, ParameterId, RateParameters};

/// A series of observations of one observable, one value per grid point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedSeries {
    /// What part of the model state was observed
    pub observable: Observable,

    /// Observed values, aligned with the calibration time grid
    pub values: Vec<f64>,

    /// Weight applied to every residual of this series (default 1.0)
    /// Higher weights give the series more importance in the loss
    pub weight: f64,
}

impl ObservedSeries {
    /// Create a new series with default weight of 1.0
    pub fn new(observable: Observable, values: Vec<f64>) -> Self {
        Self {
            observable,
            values,
            weight: 1.0,
        }
    }

    /// Observations of the infected count
    pub fn infected(values: Vec<f64>) -> Self {
        Self::new(Observable::infected(), values)
    }

    /// Create a new series with a custom weight
    pub fn with_weight(observable: Observable, values: Vec<f64>, weight: f64) -> Self {
        Self {
            observable,
            values,
            weight,
        }
    }
}

/// Parameter to be calibrated with its bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParameter {
    /// Which rate parameter is estimated
    pub id: ParameterId,

    /// Minimum allowed value
    pub min_bound: f64,

    /// Maximum allowed value
    pub max_bound: f64,

    /// Optional initial guess (if None, will use midpoint of bounds)
    pub initial_guess: Option<f64>,
}

impl CalibrationParameter {
    /// Create a new calibration parameter
    pub fn new(id: ParameterId, min_bound: f64, max_bound: f64) -> Self {
        Self {
            id,
            min_bound,
            max_bound,
            initial_guess: None,
        }
    }

    /// Create a new calibration parameter with initial guess
    pub fn with_initial_guess(
        id: ParameterId,
        min_bound: f64,
        max_bound: f64,
        initial_guess: f64,
    ) -> Self {
        Self {
            id,
            min_bound,
            max_bound,
            initial_guess: Some(initial_guess),
        }
    }

    /// All five rate parameters with lower bound 0 and upper bounds
    /// 1.0, 1.0, 1.0, 0.1, 0.1: demographic rates stay small relative to
    /// the epidemiological ones
    pub fn default_bounds() -> Vec<Self> {
        vec![
            Self::new(ParameterId::Beta, 0.0, 1.0),
            Self::new(ParameterId::Gamma, 0.0, 1.0),
            Self::new(ParameterId::Delta, 0.0, 1.0),
            Self::new(ParameterId::Birthrate, 0.0, 0.1),
            Self::new(ParameterId::Deathrate, 0.0, 0.1),
        ]
    }

    /// Get the initial value, or midpoint of bounds if not specified
    pub fn initial_value(&self) -> f64 {
        self.initial_guess
            .unwrap_or_else(|| (self.min_bound + self.max_bound) / 2.0)
    }

    /// Check if a value is within the parameter bounds
    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min_bound && value <= self.max_bound
    }

    /// Check if a value sits on either bound
    pub fn is_at_bound(&self, value: f64) -> bool {
        value <= self.min_bound || value >= self.max_bound
    }
}

/// Configuration for loss function calculation
///
/// Levenberg-Marquardt always minimises the sum of squared errors; the other
/// losses are available to Nelder-Mead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum LossConfig {
    /// Sum of squared errors: sum(weight * (predicted - observed)) ** 2
    #[default]
    SumSquaredError,

    /// Root mean squared error: sqrt(sum(weight * (predicted - observed)) ** 2 / n)
    RootMeanSquaredError,

    /// Mean absolute error: sum(abs(weight * (predicted - observed))) / n
    MeanAbsoluteError,
}

impl LossConfig {
    /// Reduce weighted residuals to a scalar loss
    pub fn evaluate(&self, residuals: &[f64]) -> f64 {
        if residuals.is_empty() {
            return 0.0;
        }
        let n = residuals.len() as f64;
        match self {
            LossConfig::SumSquaredError => residuals.iter().map(|r| r * r).sum(),
            LossConfig::RootMeanSquaredError => {
                (residuals.iter().map(|r| r * r).sum::<f64>() / n).sqrt()
            }
            LossConfig::MeanAbsoluteError => residuals.iter().map(|r| r.abs()).sum::<f64>() / n,
        }
    }
}

impl std::fmt::Display for LossConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LossConfig::SumSquaredError => write!(f, "Sum Squared Error"),
            LossConfig::RootMeanSquaredError => write!(f, "Root Mean Squared Error"),
            LossConfig::MeanAbsoluteError => write!(f, "Mean Absolute Error"),
        }
    }
}

/// Result from a calibration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// Best parameter values found
    pub best_parameters: Vec<f64>,

    /// Parameters in the same order as best_parameters
    pub parameter_names: Vec<ParameterId>,

    /// Final loss value achieved
    pub final_loss: f64,

    /// Number of iterations performed
    pub iterations: usize,

    /// Number of residual/cost evaluations
    pub evaluations: u64,

    /// Whether the optimization converged
    pub converged: bool,

    /// Termination reason
    pub termination_reason: String,

    /// `s² (JᵀJ)⁻¹` at the estimate with `s² = SSR / (m - n)`, in the
    /// order of best_parameters; None when it cannot be formed
    pub covariance: Option<Vec<Vec<f64>>>,
}

impl CalibrationResult {
    /// Get parameters as a HashMap for easy lookup
    pub fn parameters_map(&self) -> std::collections::HashMap<ParameterId, f64> {
        self.parameter_names
            .iter()
            .zip(self.best_parameters.iter())
            .map(|(name, value)| (*name, *value))
            .collect()
    }

    /// Merge the estimate into a full parameter set; rates that were not
    /// calibrated keep their value from `base`
    pub fn rate_parameters(&self, base: &RateParameters) -> RateParameters {
        let mut merged = *base;
        for (id, value) in self.parameter_names.iter().zip(&self.best_parameters) {
            merged.set(*id, *value);
        }
        merged
    }

    /// Estimate of a single parameter, if it was calibrated
    pub fn get(&self, id: ParameterId) -> Option<f64> {
        self.parameter_names
            .iter()
            .position(|name| *name == id)
            .map(|i| self.best_parameters[i])
    }
}
