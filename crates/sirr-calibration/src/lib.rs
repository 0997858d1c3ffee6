//! # sirr-calibration
//!
//! Bounded least-squares estimation of SIRR rate parameters from observed
//! series. The default solver is a box-constrained Levenberg-Marquardt
//! written against argmin's [`Solver`](argmin::core::Solver) trait;
//! argmin's Nelder-Mead is available for non-quadratic losses.
//!
//! Works with any model that implements
//! [`SimulationEngine`](sirr_core::SimulationEngine).

pub mod calibration_problem;
pub mod error;
pub mod jacobian;
pub mod levenberg_marquardt;
pub mod optimization;
pub mod types;

pub use calibration_problem::{CalibrationProblem, FAILED_SIMULATION_RESIDUAL};
pub use error::CalibrationError;
pub use levenberg_marquardt::BoundedLevenbergMarquardt;
pub use optimization::{
    LevenbergMarquardtConfig, NelderMeadConfig, OptimizationConfig, optimize,
};
pub use types::{CalibrationParameter, CalibrationResult, LossConfig, ObservedSeries};
