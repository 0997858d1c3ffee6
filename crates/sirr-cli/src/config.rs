//! Run configuration for `sirr-fit`

use std::path::Path;

use serde::{Deserialize, Serialize};
use sirr_calibration::CalibrationParameter;
use sirr_core::{Compartments, ParameterId, RateParameters, TimeGrid};
use sirr_ode::IntegratorConfig;

use crate::error::CliError;

/// Evenly spaced time points, both ends included
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub start: f64,
    pub end: f64,
    pub points: usize,
}

impl GridSpec {
    pub fn to_grid(&self) -> Result<TimeGrid, CliError> {
        Ok(TimeGrid::linspace(self.start, self.end, self.points)?)
    }
}

/// Search range of one fitted parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundSpec {
    pub id: ParameterId,
    pub min: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_guess: Option<f64>,
}

impl From<BoundSpec> for CalibrationParameter {
    fn from(spec: BoundSpec) -> Self {
        CalibrationParameter {
            id: spec.id,
            min_bound: spec.min,
            max_bound: spec.max,
            initial_guess: spec.initial_guess,
        }
    }
}

/// Everything one generate-and-fit run needs. Missing fields take the
/// values of the reference outbreak scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Seed of the measurement noise
    pub seed: u64,

    /// Parameters that generate the synthetic observations
    pub true_parameters: RateParameters,

    /// Population at the first grid point, shared by generation and fit
    pub initial_state: Compartments,

    /// Observation times
    pub data_grid: GridSpec,

    /// Times at which the fitted trajectory is reported
    pub smooth_grid: GridSpec,

    /// Standard deviation of the Gaussian measurement noise
    pub noise_std: f64,

    /// Fitted parameters and their ranges; all five with the default
    /// ranges when omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Vec<BoundSpec>>,

    pub max_iterations: u64,

    pub integrator: IntegratorConfig,

    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 3,
            true_parameters: RateParameters::new(0.3, 0.05, 0.02, 0.01, 0.01),
            initial_state: Compartments::new(1000.0, 10.0, 0.0, 0.0),
            data_grid: GridSpec {
                start: 0.0,
                end: 50.0,
                points: 365,
            },
            smooth_grid: GridSpec {
                start: 0.0,
                end: 50.0,
                points: 200,
            },
            noise_std: 5.0,
            bounds: None,
            max_iterations: 1000,
            integrator: IntegratorConfig::default(),
            verbose: false,
        }
    }
}

impl RunConfig {
    /// Read a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, CliError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn calibration_parameters(&self) -> Vec<CalibrationParameter> {
        match &self.bounds {
            Some(bounds) => bounds.iter().copied().map(CalibrationParameter::from).collect(),
            None => CalibrationParameter::default_bounds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_reference_scenario() {
        let config = RunConfig::from_json("{}").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.data_grid.to_grid().unwrap().len(), 365);
        assert_eq!(config.calibration_parameters().len(), 5);
        assert_eq!(config.seed, 3);
    }

    #[test]
    fn test_partial_override() {
        let config = RunConfig::from_json(
            r#"{
                "seed": 7,
                "noise_std": 0.0,
                "initial_state": {"S": 500, "I": 1, "R": 0, "Re": 0},
                "bounds": [{"id": "gamma", "min": 0.0, "max": 0.5, "initial_guess": 0.1}]
            }"#,
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.noise_std, 0.0);
        assert_eq!(config.initial_state.susceptible, 500.0);
        assert_eq!(config.true_parameters, RunConfig::default().true_parameters);

        let params = config.calibration_parameters();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].id, ParameterId::Gamma);
        assert_eq!(params[0].max_bound, 0.5);
        assert_eq!(params[0].initial_value(), 0.1);
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(matches!(
            RunConfig::from_json(r#"{"sede": 3}"#),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn test_bad_grid() {
        let spec = GridSpec {
            start: 0.0,
            end: 1.0,
            points: 0,
        };
        assert!(spec.to_grid().is_err());
    }
}
