//! Text and JSON output of a fit

use serde::Serialize;
use sirr_calibration::CalibrationResult;
use sirr_core::{Compartment, ParameterId, RateParameters, Trajectory};

use crate::error::CliError;

fn label(id: ParameterId) -> &'static str {
    match id {
        ParameterId::Beta => "Beta",
        ParameterId::Gamma => "Gamma",
        ParameterId::Delta => "Delta",
        ParameterId::Birthrate => "Birth Rate",
        ParameterId::Deathrate => "Death Rate",
    }
}

/// The estimate block printed on stdout, four decimals per rate
pub fn format_estimates(params: &RateParameters) -> String {
    let lines: String = ParameterId::ALL
        .iter()
        .map(|&id| format!("{}: {:.4}\n", label(id), params.get(id)))
        .collect();
    format!("Estimated Parameters:\n{}", lines)
}

/// Fit diagnostics for stderr
pub fn format_summary(result: &CalibrationResult) -> String {
    format!(
        "{} after {} iterations, {} evaluations, loss {:.6e}",
        result.termination_reason, result.iterations, result.evaluations, result.final_loss
    )
}

/// Trajectory columns for a plotting collaborator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurveExport {
    pub t: Vec<f64>,
    #[serde(rename = "S")]
    pub susceptible: Vec<f64>,
    #[serde(rename = "I")]
    pub infected: Vec<f64>,
    #[serde(rename = "R")]
    pub recovered: Vec<f64>,
    #[serde(rename = "Re")]
    pub reinfected: Vec<f64>,
}

impl CurveExport {
    pub fn from_trajectory(trajectory: &Trajectory) -> Self {
        Self {
            t: trajectory.times().to_vec(),
            susceptible: trajectory.series(Compartment::Susceptible),
            infected: trajectory.series(Compartment::Infected),
            recovered: trajectory.series(Compartment::Recovered),
            reinfected: trajectory.series(Compartment::Reinfected),
        }
    }

    pub fn to_json(&self) -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
