use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::SimulationError;

/// Identifies one of the five rate parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterId {
    /// Transmission rate (S*I interaction)
    Beta,
    /// Recovery rate (I -> R)
    Gamma,
    /// Transition rate out of R (R -> Re, and back into I)
    Delta,
    Birthrate,
    Deathrate,
}

impl ParameterId {
    /// All parameters in canonical order
    pub const ALL: [ParameterId; 5] = [
        ParameterId::Beta,
        ParameterId::Gamma,
        ParameterId::Delta,
        ParameterId::Birthrate,
        ParameterId::Deathrate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParameterId::Beta => "beta",
            ParameterId::Gamma => "gamma",
            ParameterId::Delta => "delta",
            ParameterId::Birthrate => "birthrate",
            ParameterId::Deathrate => "deathrate",
        }
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ParameterId {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| {
                SimulationError::invalid_input(format!(
                    "unknown parameter '{}' (available: beta, gamma, delta, birthrate, deathrate)",
                    s
                ))
            })
    }
}

/// The five per-unit-time rate constants of the model
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RateParameters {
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    pub birthrate: f64,
    pub deathrate: f64,
}

impl RateParameters {
    pub fn new(beta: f64, gamma: f64, delta: f64, birthrate: f64, deathrate: f64) -> Self {
        Self {
            beta,
            gamma,
            delta,
            birthrate,
            deathrate,
        }
    }

    pub fn get(&self, id: ParameterId) -> f64 {
        match id {
            ParameterId::Beta => self.beta,
            ParameterId::Gamma => self.gamma,
            ParameterId::Delta => self.delta,
            ParameterId::Birthrate => self.birthrate,
            ParameterId::Deathrate => self.deathrate,
        }
    }

    pub fn set(&mut self, id: ParameterId, value: f64) {
        match id {
            ParameterId::Beta => self.beta = value,
            ParameterId::Gamma => self.gamma = value,
            ParameterId::Delta => self.delta = value,
            ParameterId::Birthrate => self.birthrate = value,
            ParameterId::Deathrate => self.deathrate = value,
        }
    }

    /// Values in canonical order (beta, gamma, delta, birthrate, deathrate)
    pub fn to_vec(&self) -> Vec<f64> {
        ParameterId::ALL.iter().map(|id| self.get(*id)).collect()
    }

    /// Check that every rate is finite and non-negative
    pub fn validate(&self) -> Result<(), SimulationError> {
        for id in ParameterId::ALL {
            validate_rate(id, self.get(id))?;
        }
        Ok(())
    }
}

/// Check a single rate value
pub fn validate_rate(id: ParameterId, value: f64) -> Result<(), SimulationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(SimulationError::invalid_input(format!(
            "parameter '{}' must be finite and non-negative, got {}",
            id, value
        )));
    }
    Ok(())
}
