//! Box-constrained Levenberg-Marquardt as an argmin solver
//!
//! Each iteration solves the damped normal equations
//! `(JᵀJ + λ D) δ = -Jᵀr` over the free parameters, where `D` holds a
//! decaying running maximum of the diagonal of `JᵀJ` (Moré scaling). A parameter
//! sitting on a bound with the gradient pushing it outward is held fixed
//! for that iteration. The trial point is projected onto the box and judged
//! by the ratio of actual to predicted cost reduction; the damping update
//! follows Nielsen's rule.

use argmin::core::{
    Error, IterState, Operator, Problem, Solver, State, TerminationReason, KV,
};
use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::jacobian::{forward_difference, gradient};

type LmState = IterState<Vec<f64>, (), (), (), (), f64>;

/// Damping beyond which no step can make progress
const MAX_DAMPING: f64 = 1e20;

/// Floor for the column scaling so fully insensitive parameters stay solvable
const MIN_SCALE: f64 = 1e-300;

/// Per-iteration decay of the remembered column scale. A pure running maximum
/// keeps the scale of a column that was large far from the optimum, which
/// over-damps that parameter and shrinks its share of the gradient test.
const SCALE_DECAY: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct BoundedLevenbergMarquardt {
    lower: Vec<f64>,
    upper: Vec<f64>,
    ftol: f64,
    xtol: f64,
    gtol: f64,
    initial_damping: f64,

    residuals: Vec<f64>,
    jacobian: DMatrix<f64>,
    scale: DVector<f64>,
    damping: f64,
    growth: f64,
}

impl BoundedLevenbergMarquardt {
    /// Create a solver for the box `bounds`, one `(lower, upper)` per parameter
    pub fn new(bounds: &[(f64, f64)]) -> Self {
        let n = bounds.len();
        Self {
            lower: bounds.iter().map(|(lower, _)| *lower).collect(),
            upper: bounds.iter().map(|(_, upper)| *upper).collect(),
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
            initial_damping: 1e-3,
            residuals: Vec::new(),
            jacobian: DMatrix::zeros(0, n),
            scale: DVector::zeros(n),
            damping: 1e-3,
            growth: 2.0,
        }
    }

    /// Relative cost reduction tolerance, must be non-negative
    pub fn with_ftol(mut self, ftol: f64) -> Result<Self, Error> {
        self.ftol = non_negative("ftol", ftol)?;
        Ok(self)
    }

    /// Relative step size tolerance, must be non-negative
    pub fn with_xtol(mut self, xtol: f64) -> Result<Self, Error> {
        self.xtol = non_negative("xtol", xtol)?;
        Ok(self)
    }

    /// Scaled projected gradient tolerance, must be non-negative
    pub fn with_gtol(mut self, gtol: f64) -> Result<Self, Error> {
        self.gtol = non_negative("gtol", gtol)?;
        Ok(self)
    }

    /// Starting damping factor, must be positive
    pub fn with_initial_damping(mut self, damping: f64) -> Result<Self, Error> {
        if !(damping.is_finite() && damping > 0.0) {
            return Err(Error::msg(format!(
                "initial damping must be positive, got {}",
                damping
            )));
        }
        self.initial_damping = damping;
        Ok(self)
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        self.lower.iter().copied().zip(self.upper.iter().copied()).collect()
    }

    fn project(&self, param: &[f64]) -> Vec<f64> {
        param
            .iter()
            .zip(self.lower.iter().zip(&self.upper))
            .map(|(value, (lower, upper))| value.clamp(*lower, *upper))
            .collect()
    }

    /// Parameters not pinned against a bound by the gradient
    fn free_parameters(&self, param: &[f64], gradient: &DVector<f64>) -> Vec<bool> {
        (0..param.len())
            .map(|j| {
                let pinned_low = param[j] <= self.lower[j] && gradient[j] > 0.0;
                let pinned_high = param[j] >= self.upper[j] && gradient[j] < 0.0;
                !(pinned_low || pinned_high)
            })
            .collect()
    }

    fn jacobian_at<O>(
        &self,
        problem: &mut Problem<O>,
        param: &[f64],
        residuals: &[f64],
    ) -> Result<DMatrix<f64>, Error>
    where
        O: Operator<Param = Vec<f64>, Output = Vec<f64>>,
    {
        forward_difference(param, residuals, &self.bounds(), |trial| {
            problem.apply(&trial.to_vec())
        })
    }

    /// Solve the damped system restricted to the free parameters
    fn damped_step(&self, gradient: &DVector<f64>, free: &[bool]) -> Option<DVector<f64>> {
        let n = gradient.len();
        let normal = self.jacobian.tr_mul(&self.jacobian);
        let system = DMatrix::from_fn(n, n, |a, b| {
            if free[a] && free[b] {
                let diagonal = if a == b { self.damping * self.scale[a] } else { 0.0 };
                normal[(a, b)] + diagonal
            } else if a == b {
                1.0
            } else {
                0.0
            }
        });
        let rhs = DVector::from_fn(n, |j, _| if free[j] { -gradient[j] } else { 0.0 });

        let step = match system.clone().cholesky() {
            Some(cholesky) => cholesky.solve(&rhs),
            None => system.lu().solve(&rhs)?,
        };
        step.iter().all(|v| v.is_finite()).then_some(step)
    }

    fn reject(&mut self) -> bool {
        self.damping *= self.growth;
        self.growth *= 2.0;
        self.damping > MAX_DAMPING
    }
}

fn non_negative(name: &str, value: f64) -> Result<f64, Error> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(Error::msg(format!(
            "{} must be non-negative, got {}",
            name, value
        )))
    }
}

fn sum_of_squares(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

impl<O> Solver<O, LmState> for BoundedLevenbergMarquardt
where
    O: Operator<Param = Vec<f64>, Output = Vec<f64>>,
{
    const NAME: &'static str = "Bounded Levenberg-Marquardt";

    fn init(
        &mut self,
        problem: &mut Problem<O>,
        mut state: LmState,
    ) -> Result<(LmState, Option<KV>), Error> {
        let initial = state
            .take_param()
            .ok_or_else(|| Error::msg("initial parameter vector required"))?;
        if initial.len() != self.lower.len() {
            return Err(Error::msg(format!(
                "expected {} parameters, got {}",
                self.lower.len(),
                initial.len()
            )));
        }

        let param = self.project(&initial);
        let residuals = problem.apply(&param)?;
        let cost = sum_of_squares(&residuals);
        self.jacobian = self.jacobian_at(problem, &param, &residuals)?;
        self.residuals = residuals;
        self.scale = DVector::zeros(param.len());
        self.damping = self.initial_damping;
        self.growth = 2.0;

        Ok((state.param(param).cost(cost), None))
    }

    fn next_iter(
        &mut self,
        problem: &mut Problem<O>,
        mut state: LmState,
    ) -> Result<(LmState, Option<KV>), Error> {
        let param = state
            .take_param()
            .ok_or_else(|| Error::msg("solver state lost its parameters"))?;
        let cost = state.get_cost();

        let gradient = gradient(&self.jacobian, &self.residuals);
        for j in 0..param.len() {
            let diagonal = self.jacobian.column(j).norm_squared();
            self.scale[j] = (SCALE_DECAY * self.scale[j]).max(diagonal).max(MIN_SCALE);
        }

        let free = self.free_parameters(&param, &gradient);
        let projected_gradient = (0..param.len())
            .filter(|&j| free[j])
            .map(|j| gradient[j].abs() / self.scale[j].sqrt())
            .fold(0.0, f64::max);
        if projected_gradient <= self.gtol * cost.sqrt() {
            debug!("gradient test met: {:e}", projected_gradient);
            return Ok((
                state
                    .param(param)
                    .cost(cost)
                    .terminate_with(TerminationReason::SolverConverged),
                None,
            ));
        }

        let Some(delta) = self.damped_step(&gradient, &free) else {
            let stalled = self.reject();
            let state = state.param(param).cost(cost);
            return Ok((stall_or_continue(state, stalled), None));
        };

        let trial: Vec<f64> = self.project(
            &param
                .iter()
                .zip(delta.iter())
                .map(|(p, d)| p + d)
                .collect::<Vec<_>>(),
        );
        let step = DVector::from_iterator(
            param.len(),
            trial.iter().zip(&param).map(|(new, old)| new - old),
        );
        let linearised = DVector::from_column_slice(&self.residuals) + &self.jacobian * &step;
        let predicted = cost - linearised.norm_squared();

        let trial_residuals = problem.apply(&trial)?;
        let trial_cost = sum_of_squares(&trial_residuals);
        let gain = if predicted > 0.0 && trial_cost.is_finite() {
            (cost - trial_cost) / predicted
        } else {
            -1.0
        };

        if gain <= 0.0 {
            let stalled = self.reject();
            debug!(
                "rejected step, cost {:e} vs {:e}, damping {:e}",
                trial_cost, cost, self.damping
            );
            let state = state.param(param).cost(cost);
            return Ok((stall_or_continue(state, stalled), None));
        }

        self.damping *= (1.0 - (2.0 * gain - 1.0).powi(3)).max(1.0 / 3.0);
        self.growth = 2.0;
        debug!(
            "accepted step, cost {:e}, gain {:.3}, damping {:e}",
            trial_cost, gain, self.damping
        );

        let relative_reduction = (cost - trial_cost) / cost;
        let small_reduction = relative_reduction <= self.ftol && predicted / cost <= self.ftol;
        let trial_norm = trial.iter().map(|v| v * v).sum::<f64>().sqrt();
        let small_step = step.norm() <= self.xtol * (self.xtol + trial_norm);

        if small_reduction || small_step {
            debug!(
                "{} test met",
                if small_reduction { "cost reduction" } else { "step size" }
            );
            self.residuals = trial_residuals;
            let state = state.param(trial).cost(trial_cost);
            return Ok((state.terminate_with(TerminationReason::SolverConverged), None));
        }

        self.jacobian = self.jacobian_at(problem, &trial, &trial_residuals)?;
        self.residuals = trial_residuals;
        Ok((state.param(trial).cost(trial_cost), None))
    }
}

fn stall_or_continue(state: LmState, stalled: bool) -> LmState {
    if stalled {
        state.terminate_with(TerminationReason::SolverExit(
            "damping grew without finding a better point".to_string(),
        ))
    } else {
        state
    }
}
