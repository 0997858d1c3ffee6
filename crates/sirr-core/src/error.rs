/// Errors raised while validating model inputs or integrating the dynamics
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Integration failed at t = {time}: {reason}")]
    IntegrationFailure { time: f64, reason: String },
}

impl SimulationError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        SimulationError::InvalidInput(message.into())
    }

    /// Whether the error came from the integrator rather than from bad input
    pub fn is_integration_failure(&self) -> bool {
        matches!(self, SimulationError::IntegrationFailure { .. })
    }
}
