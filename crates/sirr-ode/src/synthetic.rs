//! Synthetic observations: the model's own output plus seeded Gaussian noise

use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use sirr_core::{Observable, SimulationEngine, SimulationError, TimeGrid, Trajectory};

/// Additive, independent, zero-mean Gaussian measurement noise
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseModel {
    /// Standard deviation of every draw
    pub std_dev: f64,

    /// Seed of the random source; equal seeds give identical draws
    pub seed: u64,
}

impl NoiseModel {
    pub fn new(std_dev: f64, seed: u64) -> Self {
        Self { std_dev, seed }
    }

    pub fn noiseless() -> Self {
        Self::new(0.0, 0)
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        if !self.std_dev.is_finite() || self.std_dev < 0.0 {
            return Err(SimulationError::invalid_input(format!(
                "noise standard deviation must be finite and non-negative, got {}",
                self.std_dev
            )));
        }
        Ok(())
    }
}

/// Ground truth and the noisy series derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticData {
    /// Full trajectory at the generating parameters
    pub trajectory: Trajectory,

    /// Noise-free observable series
    pub clean: Vec<f64>,

    /// `clean` plus measurement noise
    pub observed: Vec<f64>,
}

/// Simulate `engine` on `grid`, project onto `observable` and perturb every
/// point with noise drawn from `noise`.
///
/// Integration failures are returned to the caller: without ground truth
/// there is nothing to fit.
pub fn generate<E: SimulationEngine>(
    engine: &E,
    grid: &TimeGrid,
    observable: &Observable,
    noise: NoiseModel,
) -> Result<SyntheticData, SimulationError> {
    noise.validate()?;
    observable.validate()?;

    let trajectory = engine.simulate(grid)?;
    let clean = trajectory.project(observable);
    let observed = add_gaussian_noise(&clean, noise)?;
    debug!(
        "generated {} observations of {} (noise std {}, seed {})",
        observed.len(),
        observable,
        noise.std_dev,
        noise.seed
    );

    Ok(SyntheticData {
        trajectory,
        clean,
        observed,
    })
}

/// Add one independent noise draw to every value
pub fn add_gaussian_noise(values: &[f64], noise: NoiseModel) -> Result<Vec<f64>, SimulationError> {
    noise.validate()?;
    if noise.std_dev == 0.0 {
        return Ok(values.to_vec());
    }

    let normal = Normal::new(0.0, noise.std_dev).map_err(|e| {
        SimulationError::invalid_input(format!("invalid noise distribution: {}", e))
    })?;
    let mut rng = StdRng::seed_from_u64(noise.seed);
    Ok(values.iter().map(|v| v + normal.sample(&mut rng)).collect())
}
