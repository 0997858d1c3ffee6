//! # sirr-ode
//!
//! Dynamics engine for the SIRR outbreak model. The four-compartment ODE
//! system is integrated with the adaptive Dormand–Prince 5(4) solver of
//! `ode_solvers`, reporting exactly at the requested time points.

pub mod engine;
pub mod integrator;
pub mod model;
pub mod synthetic;

pub use engine::{OdeEngine, integrate};
pub use integrator::{IntegrationStats, IntegratorConfig};
pub use model::rates;
pub use synthetic::{NoiseModel, SyntheticData};
