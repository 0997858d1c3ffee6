//! # sirr-core
//!
//! Shared vocabulary for the SIRR outbreak model: the four population
//! classes, rate parameters, time grids, trajectories and observables,
//! plus the [`SimulationEngine`] trait that calibration is written against.

pub mod engine;
pub mod error;
pub mod types;

pub use engine::SimulationEngine;
pub use error::SimulationError;
pub use types::compartments::{Compartment, Compartments};
pub use types::observable::Observable;
pub use types::parameters::{ParameterId, RateParameters};
pub use types::time::TimeGrid;
pub use types::trajectory::Trajectory;
