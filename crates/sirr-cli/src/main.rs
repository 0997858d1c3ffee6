//! `sirr-fit`: generate noisy infected counts from the SIRR model, fit the
//! five rates back and report the estimate with the fitted trajectory.
//!
//! Usage: `sirr-fit [CONFIG.json]`

mod config;
mod error;
mod logging;
mod report;

use std::path::PathBuf;
use std::process::ExitCode;

use log::{info, warn};
use sirr_calibration::{
    CalibrationError, CalibrationProblem, CalibrationResult, LevenbergMarquardtConfig,
    LossConfig, ObservedSeries, OptimizationConfig, optimize,
};
use sirr_core::{Observable, SimulationEngine, TimeGrid};
use sirr_ode::{NoiseModel, OdeEngine, synthetic};

use crate::config::RunConfig;
use crate::error::CliError;
use crate::report::{CurveExport, format_estimates, format_summary};

fn main() -> ExitCode {
    match run(std::env::args().nth(1).map(PathBuf::from)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: Option<PathBuf>) -> Result<(), CliError> {
    let config = match &config_path {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };
    logging::init(logging::level(config.verbose))?;
    match &config_path {
        Some(path) => info!("configuration read from {}", path.display()),
        None => info!("no configuration given, running the reference scenario"),
    }

    let engine = OdeEngine::new(config.initial_state, config.true_parameters)?
        .with_config(config.integrator)?;
    let data_grid = config.data_grid.to_grid()?;
    let smooth_grid = config.smooth_grid.to_grid()?;

    let data = synthetic::generate(
        &engine,
        &data_grid,
        &Observable::infected(),
        NoiseModel::new(config.noise_std, config.seed),
    )?;
    info!(
        "generated {} observations (noise std {}, seed {})",
        data.observed.len(),
        config.noise_std,
        config.seed
    );

    let problem = CalibrationProblem::new(
        engine.clone(),
        data_grid,
        vec![ObservedSeries::infected(data.observed)],
        config.calibration_parameters(),
        LossConfig::SumSquaredError,
    )?;
    let optimizer = OptimizationConfig::LevenbergMarquardt(
        LevenbergMarquardtConfig::new()
            .with_max_iterations(config.max_iterations)
            .with_verbose(config.verbose),
    );

    match optimize(problem, optimizer) {
        Ok(result) => report(&engine, &result, &smooth_grid),
        Err(CalibrationError::FitDivergence { reason, best }) => {
            warn!("fit did not converge ({}), reporting the best estimate", reason);
            report(&engine, &best, &smooth_grid)?;
            Err(CalibrationError::FitDivergence { reason, best }.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Print the estimate and the trajectory it produces on the smooth grid
fn report(
    engine: &OdeEngine,
    result: &CalibrationResult,
    smooth_grid: &TimeGrid,
) -> Result<(), CliError> {
    let estimate = result.rate_parameters(&engine.parameters());
    let mut fitted = engine.clone();
    fitted.set_parameters(estimate)?;
    let trajectory = fitted.simulate(smooth_grid)?;

    info!("{}", format_summary(result));
    print!("{}", format_estimates(&estimate));
    println!("{}", CurveExport::from_trajectory(&trajectory).to_json()?);
    Ok(())
}
