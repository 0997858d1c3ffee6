use sirr_core::SimulationError;
use thiserror::Error;

use crate::types::CalibrationResult;

/// Errors raised while setting up or running a calibration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    /// The optimizer stopped without meeting a convergence test. The best
    /// estimate found so far is still available.
    #[error("Fit did not converge: {reason} (best loss {})", .best.final_loss)]
    FitDivergence {
        reason: String,
        best: Box<CalibrationResult>,
    },

    #[error("Optimization failed: {0}")]
    Optimizer(String),
}

impl CalibrationError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        CalibrationError::InvalidInput(message.into())
    }

    /// Best-found estimate carried by a divergence
    pub fn best_estimate(&self) -> Option<&CalibrationResult> {
        match self {
            CalibrationError::FitDivergence { best, .. } => Some(best),
            _ => None,
        }
    }
}

/// Recover errors that travelled through argmin as opaque errors
impl From<argmin::core::Error> for CalibrationError {
    fn from(error: argmin::core::Error) -> Self {
        let error = match error.downcast::<CalibrationError>() {
            Ok(calibration) => return calibration,
            Err(error) => error,
        };
        match error.downcast::<SimulationError>() {
            Ok(simulation) => CalibrationError::Simulation(simulation),
            Err(other) => CalibrationError::Optimizer(other.to_string()),
        }
    }
}
