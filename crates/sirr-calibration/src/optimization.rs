//! Optimization solver setup and execution

use argmin::core::observers::ObserverMode;
use argmin::core::{
    Executor, IterState, OptimizationResult, Solver, State, TerminationReason, TerminationStatus,
};
use argmin::solver::neldermead::NelderMead;
use argmin_observer_slog::SlogLogger;
use log::debug;
use serde::{Deserialize, Serialize};
use sirr_core::{ParameterId, SimulationEngine};

use crate::calibration_problem::CalibrationProblem;
use crate::error::CalibrationError;
use crate::levenberg_marquardt::BoundedLevenbergMarquardt;
use crate::types::{CalibrationResult, LossConfig};

type VecState = IterState<Vec<f64>, (), (), (), (), f64>;

/// Print optimization header for verbose output
fn print_optimization_header(
    algorithm: &str,
    parameter_names: &[ParameterId],
    initial_values: &[f64],
    max_iterations: u64,
) {
    eprintln!("=== {} Optimization (Verbose Mode) ===", algorithm);
    eprintln!("Parameters: {:?}", parameter_names);
    eprintln!("Initial values: {:?}", initial_values);
    eprintln!("Max iterations: {}", max_iterations);
}

/// Run executor, attaching the terminal logger when verbose
fn run_executor<O, S>(
    executor: Executor<O, S, VecState>,
    verbose: bool,
) -> Result<OptimizationResult<O, S, VecState>, CalibrationError>
where
    S: Solver<O, VecState>,
{
    let executor = if verbose {
        executor.add_observer(SlogLogger::term(), ObserverMode::Always)
    } else {
        executor
    };
    Ok(executor.run()?)
}

/// Configuration for bounded Levenberg-Marquardt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevenbergMarquardtConfig {
    /// Maximum number of iterations
    pub max_iterations: u64,

    /// Relative cost reduction tolerance
    /// Converged when both the actual and the predicted relative reduction
    /// of an accepted step fall below it
    pub ftol: f64,

    /// Relative step tolerance
    /// Converged when `|step| <= xtol * (xtol + |params|)`
    pub xtol: f64,

    /// Projected gradient tolerance, relative to the residual norm
    pub gtol: f64,

    /// Damping factor of the first iteration
    pub initial_damping: f64,

    /// Enable verbose output
    pub verbose: bool,
}

impl Default for LevenbergMarquardtConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            initial_damping: 1e-3,
            verbose: false,
        }
    }
}

impl LevenbergMarquardtConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum iterations
    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set relative cost reduction tolerance
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.ftol = ftol;
        self
    }

    /// Set relative step tolerance
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.xtol = xtol;
        self
    }

    /// Set projected gradient tolerance
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.gtol = gtol;
        self
    }

    /// Set the damping factor of the first iteration
    pub fn with_initial_damping(mut self, damping: f64) -> Self {
        self.initial_damping = damping;
        self
    }

    /// Enable verbose output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Configuration for Nelder-Mead optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NelderMeadConfig {
    /// Maximum number of iterations
    pub max_iterations: u64,

    /// Sample standard deviation tolerance (convergence criterion)
    /// Must be non-negative
    pub sd_tolerance: f64,

    /// Size of the initial simplex as a fraction of each bound range
    pub initial_simplex_scale: f64,

    /// Reflection parameter (alpha)
    /// Must be > 0, defaults to 1.0
    pub alpha: Option<f64>,

    /// Expansion parameter (gamma)
    /// Must be > 1, defaults to 2.0
    pub gamma: Option<f64>,

    /// Contraction parameter (rho)
    /// Must be in (0, 0.5], defaults to 0.5
    pub rho: Option<f64>,

    /// Shrinking parameter (sigma)
    /// Must be in (0, 1], defaults to 0.5
    pub sigma: Option<f64>,

    /// Enable verbose output
    pub verbose: bool,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            sd_tolerance: 1e-6,
            initial_simplex_scale: 0.1,
            alpha: None, // argmin's default: 1.0
            gamma: None, // argmin's default: 2.0
            rho: None,   // argmin's default: 0.5
            sigma: None, // argmin's default: 0.5
            verbose: false,
        }
    }
}

impl NelderMeadConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum iterations
    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set sample standard deviation tolerance (convergence criterion)
    pub fn with_sd_tolerance(mut self, tolerance: f64) -> Self {
        self.sd_tolerance = tolerance;
        self
    }

    /// Set the initial simplex size as a fraction of each bound range
    pub fn with_initial_simplex_scale(mut self, scale: f64) -> Self {
        self.initial_simplex_scale = scale;
        self
    }

    /// Set reflection parameter (alpha)
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    /// Set expansion parameter (gamma)
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = Some(gamma);
        self
    }

    /// Set contraction parameter (rho)
    pub fn with_rho(mut self, rho: f64) -> Self {
        self.rho = Some(rho);
        self
    }

    /// Set shrinking parameter (sigma)
    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = Some(sigma);
        self
    }

    /// Enable verbose output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Algorithm-specific optimization configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationConfig {
    /// Box-constrained Levenberg-Marquardt (finite-difference Jacobian)
    /// Requires the sum of squared errors loss
    LevenbergMarquardt(LevenbergMarquardtConfig),

    /// Nelder-Mead simplex method (gradient-free)
    /// Works with every loss; trial points are clamped to the bounds
    NelderMead(NelderMeadConfig),
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        OptimizationConfig::LevenbergMarquardt(LevenbergMarquardtConfig::default())
    }
}

impl std::fmt::Display for OptimizationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizationConfig::LevenbergMarquardt(_) => write!(f, "Levenberg-Marquardt"),
            OptimizationConfig::NelderMead(_) => write!(f, "Nelder-Mead"),
        }
    }
}

/// Fields shared by every solver's outcome before it becomes a result
struct Outcome {
    best_parameters: Vec<f64>,
    final_loss: f64,
    iterations: u64,
    evaluations: u64,
    status: TerminationStatus,
}

impl Outcome {
    fn from_state(state: &VecState, initial_params: Vec<f64>) -> Self {
        Self {
            best_parameters: state.best_param.clone().unwrap_or(initial_params),
            final_loss: state.best_cost,
            iterations: state.iter,
            evaluations: state.get_func_counts().values().sum(),
            status: state.termination_status.clone(),
        }
    }
}

/// Run optimization on a calibration problem
///
/// # Returns
///
/// The estimate when a convergence test was met. When the iteration budget
/// runs out, or the solver gives up, `CalibrationError::FitDivergence`
/// carries the best estimate found.
///
/// # Example
///
/// ```rust,ignore
/// use sirr_calibration::{optimize, LevenbergMarquardtConfig, OptimizationConfig};
///
/// let config = OptimizationConfig::LevenbergMarquardt(
///     LevenbergMarquardtConfig::new().with_max_iterations(500),
/// );
///
/// let result = optimize(problem, config)?;
/// println!("Best parameters: {:?}", result.best_parameters);
/// println!("Final loss: {}", result.final_loss);
/// ```
pub fn optimize<E: SimulationEngine>(
    problem: CalibrationProblem<E>,
    config: OptimizationConfig,
) -> Result<CalibrationResult, CalibrationError> {
    let evaluator = problem.clone();
    let initial_params = problem.initial_parameters();
    let parameter_names = problem.parameter_names();

    let outcome = match &config {
        OptimizationConfig::LevenbergMarquardt(lm_config) => {
            optimize_levenberg_marquardt(problem, initial_params, &parameter_names, lm_config)?
        }
        OptimizationConfig::NelderMead(nm_config) => {
            optimize_nelder_mead(problem, initial_params, &parameter_names, nm_config)?
        }
    };

    // a flat penalty landscape satisfies every convergence test
    let simulable = evaluator.is_simulable(&outcome.best_parameters)?;
    let converged = simulable
        && matches!(
            outcome.status,
            TerminationStatus::Terminated(
                TerminationReason::SolverConverged | TerminationReason::TargetCostReached
            )
        );
    let termination_reason = if simulable {
        describe(&outcome.status)
    } else {
        "no simulable parameter set found".to_string()
    };
    debug!(
        "{} finished after {} iterations ({} evaluations): {}, loss {:e}",
        config, outcome.iterations, outcome.evaluations, termination_reason, outcome.final_loss
    );

    let covariance = evaluator.covariance(&outcome.best_parameters)?;
    let result = CalibrationResult {
        best_parameters: outcome.best_parameters,
        parameter_names,
        final_loss: outcome.final_loss,
        iterations: outcome.iterations as usize,
        evaluations: outcome.evaluations,
        converged,
        termination_reason: termination_reason.clone(),
        covariance,
    };

    if converged {
        Ok(result)
    } else {
        Err(CalibrationError::FitDivergence {
            reason: termination_reason,
            best: Box::new(result),
        })
    }
}

fn describe(status: &TerminationStatus) -> String {
    match status {
        TerminationStatus::Terminated(TerminationReason::SolverConverged) => {
            "solver converged".to_string()
        }
        TerminationStatus::Terminated(TerminationReason::MaxItersReached) => {
            "maximum number of iterations reached".to_string()
        }
        TerminationStatus::Terminated(TerminationReason::TargetCostReached) => {
            "target cost reached".to_string()
        }
        TerminationStatus::Terminated(TerminationReason::SolverExit(message)) => message.clone(),
        other => format!("{:?}", other),
    }
}

/// Optimize using bounded Levenberg-Marquardt
fn optimize_levenberg_marquardt<E: SimulationEngine>(
    problem: CalibrationProblem<E>,
    initial_params: Vec<f64>,
    parameter_names: &[ParameterId],
    config: &LevenbergMarquardtConfig,
) -> Result<Outcome, CalibrationError> {
    if problem.loss_config() != LossConfig::SumSquaredError {
        return Err(CalibrationError::invalid_input(format!(
            "Levenberg-Marquardt minimises the sum of squared errors, not {}",
            problem.loss_config()
        )));
    }

    let solver = BoundedLevenbergMarquardt::new(&problem.parameter_bounds())
        .with_ftol(config.ftol)?
        .with_xtol(config.xtol)?
        .with_gtol(config.gtol)?
        .with_initial_damping(config.initial_damping)?;

    if config.verbose {
        print_optimization_header(
            "Levenberg-Marquardt",
            parameter_names,
            &initial_params,
            config.max_iterations,
        );
        eprintln!(
            "Tolerances: ftol {}, xtol {}, gtol {}",
            config.ftol, config.xtol, config.gtol
        );
        eprintln!("===============================================");
    }

    let start = initial_params.clone();
    let executor = Executor::new(problem, solver)
        .configure(|state| state.param(start).max_iters(config.max_iterations));
    let result = run_executor(executor, config.verbose)?;

    Ok(Outcome::from_state(result.state(), initial_params))
}

/// Build the initial simplex: the start point plus one vertex per
/// parameter, stepped toward the roomier side of its range
fn initial_simplex(initial_params: &[f64], bounds: &[(f64, f64)], scale: f64) -> Vec<Vec<f64>> {
    let mut vertices = vec![initial_params.to_vec()];
    for (i, (lower, upper)) in bounds.iter().enumerate() {
        let mut vertex = initial_params.to_vec();
        let step = scale * (upper - lower);
        vertex[i] = if upper - vertex[i] >= vertex[i] - lower {
            vertex[i] + step
        } else {
            vertex[i] - step
        };
        vertices.push(vertex);
    }
    vertices
}

/// Build Nelder-Mead solver from configuration
fn build_nelder_mead_solver(
    initial_params: &[f64],
    bounds: &[(f64, f64)],
    config: &NelderMeadConfig,
) -> Result<NelderMead<Vec<f64>, f64>, CalibrationError> {
    if !(config.initial_simplex_scale > 0.0 && config.initial_simplex_scale <= 1.0) {
        return Err(CalibrationError::invalid_input(format!(
            "initial simplex scale must be in (0, 1], got {}",
            config.initial_simplex_scale
        )));
    }
    let vertices = initial_simplex(initial_params, bounds, config.initial_simplex_scale);

    let mut solver = NelderMead::new(vertices).with_sd_tolerance(config.sd_tolerance)?;

    if let Some(alpha) = config.alpha {
        solver = solver.with_alpha(alpha)?;
    }

    if let Some(gamma) = config.gamma {
        solver = solver.with_gamma(gamma)?;
    }

    if let Some(rho) = config.rho {
        solver = solver.with_rho(rho)?;
    }

    if let Some(sigma) = config.sigma {
        solver = solver.with_sigma(sigma)?;
    }

    Ok(solver)
}

/// Optimize using Nelder-Mead algorithm
fn optimize_nelder_mead<E: SimulationEngine>(
    problem: CalibrationProblem<E>,
    initial_params: Vec<f64>,
    parameter_names: &[ParameterId],
    config: &NelderMeadConfig,
) -> Result<Outcome, CalibrationError> {
    let bounds = problem.parameter_bounds();
    let solver = build_nelder_mead_solver(&initial_params, &bounds, config)?;

    if config.verbose {
        print_optimization_header(
            "Nelder-Mead",
            parameter_names,
            &initial_params,
            config.max_iterations,
        );
        eprintln!("SD tolerance: {}", config.sd_tolerance);
        eprintln!("===============================================");
    }

    let executor =
        Executor::new(problem, solver).configure(|state| state.max_iters(config.max_iterations));
    let result = run_executor(executor, config.verbose)?;

    // the simplex may have wandered outside the box; report what was evaluated
    let mut outcome = Outcome::from_state(result.state(), initial_params);
    outcome.best_parameters = outcome
        .best_parameters
        .iter()
        .zip(&bounds)
        .map(|(value, (lower, upper))| value.clamp(*lower, *upper))
        .collect();
    Ok(outcome)
}
