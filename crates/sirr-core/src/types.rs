//! Plain data types shared by the dynamics engine and the estimator

pub mod compartments;
pub mod observable;
pub mod parameters;
pub mod time;
pub mod trajectory;
