use std::fmt;

use serde::{Deserialize, Serialize};

use crate::SimulationError;

/// One of the four population classes of the model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compartment {
    #[serde(rename = "S")]
    Susceptible,
    #[serde(rename = "I")]
    Infected,
    #[serde(rename = "R")]
    Recovered,
    #[serde(rename = "Re")]
    Reinfected,
}

impl Compartment {
    /// All compartments in state-vector order
    pub const ALL: [Compartment; 4] = [
        Compartment::Susceptible,
        Compartment::Infected,
        Compartment::Recovered,
        Compartment::Reinfected,
    ];

    /// Position of the compartment in the state vector
    pub fn index(self) -> usize {
        match self {
            Compartment::Susceptible => 0,
            Compartment::Infected => 1,
            Compartment::Recovered => 2,
            Compartment::Reinfected => 3,
        }
    }

    /// Short identifier (`S`, `I`, `R`, `Re`)
    pub fn id(self) -> &'static str {
        match self {
            Compartment::Susceptible => "S",
            Compartment::Infected => "I",
            Compartment::Recovered => "R",
            Compartment::Reinfected => "Re",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Compartment::Susceptible => "Susceptible",
            Compartment::Infected => "Infected",
            Compartment::Recovered => "Recovered",
            Compartment::Reinfected => "Reinfected",
        }
    }

    /// Look up a compartment by its short identifier
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.id() == id)
    }
}

impl fmt::Display for Compartment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Population counts of every compartment at one instant: the state vector
/// `(S, I, R, Re)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Compartments {
    #[serde(rename = "S")]
    pub susceptible: f64,
    #[serde(rename = "I")]
    pub infected: f64,
    #[serde(rename = "R")]
    pub recovered: f64,
    #[serde(rename = "Re")]
    pub reinfected: f64,
}

impl Compartments {
    pub const ZERO: Compartments = Compartments {
        susceptible: 0.0,
        infected: 0.0,
        recovered: 0.0,
        reinfected: 0.0,
    };

    pub fn new(susceptible: f64, infected: f64, recovered: f64, reinfected: f64) -> Self {
        Self {
            susceptible,
            infected,
            recovered,
            reinfected,
        }
    }

    pub fn from_array(values: [f64; 4]) -> Self {
        let [susceptible, infected, recovered, reinfected] = values;
        Self::new(susceptible, infected, recovered, reinfected)
    }

    pub fn to_array(&self) -> [f64; 4] {
        [
            self.susceptible,
            self.infected,
            self.recovered,
            self.reinfected,
        ]
    }

    /// Count in a single compartment
    pub fn get(&self, compartment: Compartment) -> f64 {
        match compartment {
            Compartment::Susceptible => self.susceptible,
            Compartment::Infected => self.infected,
            Compartment::Recovered => self.recovered,
            Compartment::Reinfected => self.reinfected,
        }
    }

    /// Total population `S + I + R + Re`
    pub fn total(&self) -> f64 {
        self.susceptible + self.infected + self.recovered + self.reinfected
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// Check that every count is finite and non-negative
    pub fn validate(&self) -> Result<(), SimulationError> {
        for compartment in Compartment::ALL {
            let value = self.get(compartment);
            if !value.is_finite() || value < 0.0 {
                return Err(SimulationError::invalid_input(format!(
                    "initial population of compartment '{}' must be finite and non-negative, got {}",
                    compartment, value
                )));
            }
        }
        Ok(())
    }
}
