use serde::Serialize;

use crate::{Compartment, Compartments, Observable, SimulationError, TimeGrid};

/// The state of every compartment at each point of a time grid
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Trajectory {
    grid: TimeGrid,
    states: Vec<Compartments>,
}

impl Trajectory {
    pub fn new(grid: TimeGrid, states: Vec<Compartments>) -> Result<Self, SimulationError> {
        if grid.len() != states.len() {
            return Err(SimulationError::invalid_input(format!(
                "trajectory has {} states for {} time points",
                states.len(),
                grid.len()
            )));
        }
        Ok(Self { grid, states })
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    pub fn times(&self) -> &[f64] {
        self.grid.points()
    }

    pub fn states(&self) -> &[Compartments] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn initial_state(&self) -> &Compartments {
        &self.states[0]
    }

    pub fn final_state(&self) -> &Compartments {
        &self.states[self.states.len() - 1]
    }

    /// Time series of a single compartment
    pub fn series(&self, compartment: Compartment) -> Vec<f64> {
        self.states.iter().map(|s| s.get(compartment)).collect()
    }

    /// Time series of an observable
    pub fn project(&self, observable: &Observable) -> Vec<f64> {
        self.states.iter().map(|s| observable.evaluate(s)).collect()
    }

    /// Total population at each time point
    pub fn totals(&self) -> Vec<f64> {
        self.states.iter().map(Compartments::total).collect()
    }
}
