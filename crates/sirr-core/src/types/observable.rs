use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Compartment, Compartments, SimulationError};

/// The part of the model state a fit is compared against.
///
/// Each variant reduces a full state vector to one scalar per time point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Observable {
    /// A single compartment, e.g. the infected count
    Compartment(Compartment),
    /// The sum of several compartments, e.g. total population
    Sum(Vec<Compartment>),
}

impl Observable {
    pub fn infected() -> Self {
        Observable::Compartment(Compartment::Infected)
    }

    pub fn total_population() -> Self {
        Observable::Sum(Compartment::ALL.to_vec())
    }

    pub fn evaluate(&self, state: &Compartments) -> f64 {
        match self {
            Observable::Compartment(compartment) => state.get(*compartment),
            Observable::Sum(compartments) => compartments.iter().map(|c| state.get(*c)).sum(),
        }
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        match self {
            Observable::Sum(compartments) if compartments.is_empty() => Err(
                SimulationError::invalid_input("observable sums an empty set of compartments"),
            ),
            _ => Ok(()),
        }
    }
}

impl Default for Observable {
    fn default() -> Self {
        Observable::infected()
    }
}

impl fmt::Display for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observable::Compartment(compartment) => write!(f, "{}", compartment),
            Observable::Sum(compartments) => {
                let ids: Vec<&str> = compartments.iter().map(|c| c.id()).collect();
                write!(f, "{}", ids.join(" + "))
            }
        }
    }
}
