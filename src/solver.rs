use core::fmt;

use std::time::{Duration, Instant};

use crate::prox::{SortedL1Norm, SortedL1Workspace};
use crate::report::{
    IterationReport, Reporter, SolveStatus, SolverStats, StdoutReporter, emit_line,
};

/// Absolute floor added to |primal| when scaling the duality-gap tolerance,
/// so a perfect fit (primal -> 0) can still converge.
const GAP_EPSILON: f64 = 1e-10;
/// The line search gives up once the learning rate falls below this.
const MIN_LEARNING_RATE: f64 = 1e-12;

/// Errors while constructing the solver.
#[derive(Debug)]
pub enum SolverError {
    /// The problem has zero rows or columns.
    InvalidDimensions { nrows: usize, ncols: usize },
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions { nrows, ncols } => {
                write!(f, "invalid dimensions: nrows={nrows}, ncols={ncols}")
            }
        }
    }
}

impl std::error::Error for SolverError {}

/// Errors specific to a solve call.
#[derive(Debug)]
pub enum SolveError {
    /// The response has the wrong length.
    ResponseLength { expected: usize, actual: usize },
    /// The coefficient vector has the wrong length.
    CoefficientLength { expected: usize, actual: usize },
    /// The penalty sequence has the wrong length.
    PenaltyLength { expected: usize, actual: usize },
    /// The problem's dimensions do not match the solver workspace.
    ProblemShape {
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResponseLength { expected, actual } => {
                write!(f, "y length {actual} does not match expected {expected}")
            }
            Self::CoefficientLength { expected, actual } => {
                write!(f, "beta length {actual} does not match expected {expected}")
            }
            Self::PenaltyLength { expected, actual } => {
                write!(
                    f,
                    "penalty length {actual} does not match expected {expected}"
                )
            }
            Self::ProblemShape { expected, actual } => {
                write!(
                    f,
                    "problem shape {}x{} does not match solver workspace {}x{}",
                    actual.0, actual.1, expected.0, expected.1
                )
            }
        }
    }
}

impl std::error::Error for SolveError {}

/// Options controlling the proximal gradient solve.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Maximum number of iterations.
    pub max_iters: usize,
    /// Converge when the duality gap is at most (|primal| + 1e-10) * tol.
    pub tol: f64,
    /// Initial learning rate for the proximal gradient step.
    pub learning_rate: f64,
    /// Learning rate decrease factor when the line search rejects a step.
    pub learning_rate_decr: f64,
    /// FISTA-style extrapolation with adaptive restart.
    pub acceleration: bool,
    /// Declare divergence when the primal exceeds this multiple of the
    /// starting objective plus one.
    pub divergence_ratio: f64,
    /// Emit per-iteration diagnostics to stdout by default.
    pub verbose: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iters: 500,
            tol: 1e-7,
            learning_rate: 1.0,
            learning_rate_decr: 0.5,
            acceleration: true,
            divergence_ratio: 1e8,
            verbose: false,
        }
    }
}

/// Least-squares problem data accessed by the solver's inner loop.
///
/// Implementations own the design matrix (and any normalization) and expose
/// only the products the optimizer needs, so storage formats and backends
/// can change without touching the iteration logic.
pub trait LeastSquares {
    /// Number of observations.
    fn nrows(&self) -> usize;
    /// Number of features.
    fn ncols(&self) -> usize;
    /// Fill `eta` with the linear predictor `X * beta` (no intercept).
    fn linear_predictor(&mut self, beta: &[f64], eta: &mut [f64]);
    /// Fill `gradient` with `-X^T * residual / n`.
    fn gradient(&mut self, residual: &[f64], gradient: &mut [f64]);
    /// Fill `out` with the design's column sums.
    fn column_sums(&mut self, out: &mut [f64]);
}

/// Proximal gradient solver for sorted-L1 penalized least squares.
///
/// Minimizes `||y - X beta - b0||^2 / (2n) + alpha * J(beta)` where `J` is a
/// [`SortedL1Norm`], using backtracking line search and FISTA extrapolation
/// with adaptive restart. All workspace is allocated at construction and
/// reused across solves.
pub struct SlopeSolver {
    nrows: usize,
    ncols: usize,
    eta: Vec<f64>,
    eta_search: Vec<f64>,
    eta_trial: Vec<f64>,
    residual: Vec<f64>,
    search_residual: Vec<f64>,
    trial_residual: Vec<f64>,
    theta: Vec<f64>,
    gradient: Vec<f64>,
    step_gradient: Vec<f64>,
    dual_gradient: Vec<f64>,
    col_sums: Vec<f64>,
    step_point: Vec<f64>,
    beta_trial: Vec<f64>,
    beta_prev: Vec<f64>,
    search_point: Vec<f64>,
    prox_ws: SortedL1Workspace,
}

enum ReporterSlot<'a> {
    External(&'a mut dyn Reporter),
    Local(StdoutReporter),
    None,
}

impl<'a> ReporterSlot<'a> {
    fn new(reporter: Option<&'a mut dyn Reporter>, verbose: bool) -> Self {
        match reporter {
            Some(r) => Self::External(r),
            None if verbose => Self::Local(StdoutReporter::new()),
            None => Self::None,
        }
    }

    fn as_mut(&mut self) -> Option<&mut dyn Reporter> {
        match self {
            Self::External(r) => Some(*r),
            Self::Local(r) => Some(r),
            Self::None => None,
        }
    }
}

impl SlopeSolver {
    /// Create a solver with workspace sized for an n x p problem.
    pub fn new(nrows: usize, ncols: usize) -> Result<Self, SolverError> {
        if nrows == 0 || ncols == 0 {
            return Err(SolverError::InvalidDimensions { nrows, ncols });
        }
        Ok(Self {
            nrows,
            ncols,
            eta: vec![0.0; nrows],
            eta_search: vec![0.0; nrows],
            eta_trial: vec![0.0; nrows],
            residual: vec![0.0; nrows],
            search_residual: vec![0.0; nrows],
            trial_residual: vec![0.0; nrows],
            theta: vec![0.0; nrows],
            gradient: vec![0.0; ncols],
            step_gradient: vec![0.0; ncols],
            dual_gradient: vec![0.0; ncols],
            col_sums: vec![0.0; ncols],
            step_point: vec![0.0; ncols],
            beta_trial: vec![0.0; ncols],
            beta_prev: vec![0.0; ncols],
            search_point: vec![0.0; ncols],
            prox_ws: SortedL1Workspace::new(ncols),
        })
    }

    /// Number of observations the workspace was sized for.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of features the workspace was sized for.
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Solve for `beta` (and optionally an unpenalized intercept) in place.
    ///
    /// `beta` is the starting point (zeros for a cold start, a previous
    /// solution for a warm start) and holds the final iterate on return.
    /// Divergence is reported through [`SolveStatus::Diverged`] on the
    /// returned stats with the last stable iterate restored, never as an
    /// error, so batch callers can inspect every fit uniformly.
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &mut self,
        problem: &mut impl LeastSquares,
        y: &[f64],
        penalty: &SortedL1Norm,
        alpha: f64,
        beta: &mut [f64],
        intercept: Option<&mut f64>,
        options: &SolverOptions,
        reporter: Option<&mut dyn Reporter>,
    ) -> Result<SolverStats, SolveError> {
        let n = self.nrows;
        let p = self.ncols;
        if (problem.nrows(), problem.ncols()) != (n, p) {
            return Err(SolveError::ProblemShape {
                expected: (n, p),
                actual: (problem.nrows(), problem.ncols()),
            });
        }
        if y.len() != n {
            return Err(SolveError::ResponseLength {
                expected: n,
                actual: y.len(),
            });
        }
        if beta.len() != p {
            return Err(SolveError::CoefficientLength {
                expected: p,
                actual: beta.len(),
            });
        }
        if penalty.len() != p {
            return Err(SolveError::PenaltyLength {
                expected: p,
                actual: penalty.len(),
            });
        }

        let start_time = options.verbose.then(Instant::now);
        let mut reporter = ReporterSlot::new(reporter, options.verbose);

        let fit_intercept = intercept.is_some();
        let mut b0 = intercept.as_deref().copied().unwrap_or(0.0);
        let mut b0_prev = b0;

        let nf = n as f64;
        let mut learning_rate = options.learning_rate.max(MIN_LEARNING_RATE);
        let mut momentum = 1.0f64;
        let mut extrapolated = false;

        self.search_point.copy_from_slice(beta);
        self.beta_prev.copy_from_slice(beta);
        problem.column_sums(&mut self.col_sums);
        problem.linear_predictor(beta, &mut self.eta);

        let mut primal_bound = f64::INFINITY;
        let mut last_primal = f64::NAN;
        let mut last_gap = f64::INFINITY;

        for iter in 0..options.max_iters {
            // Residual and objective at the current iterate.
            for i in 0..n {
                self.residual[i] = y[i] - self.eta[i] - b0;
            }
            let loss = 0.5 * dot(&self.residual, &self.residual) / nf;
            let primal = loss + penalty.eval(beta, alpha, &mut self.prox_ws);

            if !primal.is_finite() || primal > primal_bound {
                // Roll back to the last stable iterate.
                beta.copy_from_slice(&self.beta_prev);
                b0 = b0_prev;
                let stats = SolverStats {
                    status: SolveStatus::Diverged,
                    iterations: iter,
                    primal: if iter == 0 { primal } else { last_primal },
                    dual_gap: last_gap,
                    learning_rate,
                };
                return Ok(finish_stats(stats, intercept, b0, start_time, &mut reporter));
            }
            if iter == 0 {
                primal_bound = options.divergence_ratio * (primal.abs() + 1.0);
            }
            last_primal = primal;

            // Duality-gap certificate. Theta is the residual, centered when
            // an intercept is fit (with the matching column-sum offset on the
            // dual gradient), scaled into the feasible set.
            problem.gradient(&self.residual, &mut self.gradient);
            self.theta.copy_from_slice(&self.residual);
            self.dual_gradient.copy_from_slice(&self.gradient);
            if fit_intercept {
                let theta_mean = mean(&self.theta);
                for value in self.theta.iter_mut() {
                    *value -= theta_mean;
                }
                for j in 0..p {
                    self.dual_gradient[j] += theta_mean * self.col_sums[j] / nf;
                }
            }
            let dual_norm = penalty.dual_norm(&self.dual_gradient, alpha, &mut self.prox_ws);
            let theta_scale = dual_norm.max(1.0);
            for value in self.theta.iter_mut() {
                *value /= theta_scale;
            }
            let dual = dot(&self.theta, y) / nf - 0.5 * dot(&self.theta, &self.theta) / nf;
            let dual_gap = primal - dual;
            last_gap = dual_gap;

            let tol_scaled = (primal.abs() + GAP_EPSILON) * options.tol;
            if dual_gap.max(0.0) <= tol_scaled {
                let stats = SolverStats {
                    status: SolveStatus::Converged,
                    iterations: iter,
                    primal,
                    dual_gap,
                    learning_rate,
                };
                return Ok(finish_stats(stats, intercept, b0, start_time, &mut reporter));
            }

            // Loss and gradient at the extrapolation point.
            if extrapolated {
                problem.linear_predictor(&self.search_point, &mut self.eta_search);
            } else {
                self.eta_search.copy_from_slice(&self.eta);
            }
            for i in 0..n {
                self.search_residual[i] = y[i] - self.eta_search[i] - b0;
            }
            let search_loss = 0.5 * dot(&self.search_residual, &self.search_residual) / nf;
            problem.gradient(&self.search_residual, &mut self.step_gradient);

            // Backtracking line search on the proximal step.
            let mut accepted = false;
            let mut trial_loss = f64::INFINITY;
            while learning_rate >= MIN_LEARNING_RATE {
                for j in 0..p {
                    self.step_point[j] = self.search_point[j] - learning_rate * self.step_gradient[j];
                }
                penalty.prox_into(
                    &self.step_point,
                    learning_rate * alpha,
                    &mut self.beta_trial,
                    &mut self.prox_ws,
                );
                problem.linear_predictor(&self.beta_trial, &mut self.eta_trial);
                for i in 0..n {
                    self.trial_residual[i] = y[i] - self.eta_trial[i] - b0;
                }
                trial_loss = 0.5 * dot(&self.trial_residual, &self.trial_residual) / nf;

                let mut bound = search_loss;
                let mut diff_sq = 0.0;
                for j in 0..p {
                    let diff = self.beta_trial[j] - self.search_point[j];
                    bound += diff * self.step_gradient[j];
                    diff_sq += diff * diff;
                }
                bound += diff_sq / (2.0 * learning_rate);

                if bound >= trial_loss * (1.0 - 1e-12) {
                    accepted = true;
                    break;
                }
                learning_rate *= options.learning_rate_decr;
            }
            if !accepted {
                // The learning rate underflowed: the gradient model and the
                // observed loss disagree beyond floating point. The current
                // beta was never overwritten, so it is the stable iterate.
                let stats = SolverStats {
                    status: SolveStatus::Diverged,
                    iterations: iter,
                    primal,
                    dual_gap,
                    learning_rate,
                };
                return Ok(finish_stats(stats, intercept, b0, start_time, &mut reporter));
            }
            learning_rate *= 1.1;

            // Accept the trial point, extrapolate, refresh the intercept.
            let trial_primal = trial_loss + penalty.eval(&self.beta_trial, alpha, &mut self.prox_ws);
            self.beta_prev.copy_from_slice(beta);
            b0_prev = b0;
            beta.copy_from_slice(&self.beta_trial);
            self.eta.copy_from_slice(&self.eta_trial);

            let mut restarted = false;
            extrapolated = false;
            if options.acceleration {
                if trial_primal > primal {
                    // Momentum overshot; restart from the new iterate.
                    momentum = 1.0;
                    restarted = true;
                } else {
                    let momentum_next = 0.5 * (1.0 + (1.0 + 4.0 * momentum * momentum).sqrt());
                    let weight = (momentum - 1.0) / momentum_next;
                    if weight > 0.0 {
                        for j in 0..p {
                            self.search_point[j] =
                                beta[j] + weight * (beta[j] - self.beta_prev[j]);
                        }
                        extrapolated = true;
                    }
                    momentum = momentum_next;
                }
            }
            if !extrapolated {
                self.search_point.copy_from_slice(beta);
            }

            if fit_intercept {
                // Closed-form unpenalized intercept: shift by the residual mean.
                for i in 0..n {
                    self.residual[i] = y[i] - self.eta[i] - b0;
                }
                b0 += mean(&self.residual);
            }

            if let Some(reporter) = reporter.as_mut() {
                reporter.on_iteration(&IterationReport {
                    iteration: iter,
                    primal,
                    dual,
                    dual_gap,
                    learning_rate,
                    restarted,
                });
            }
        }

        // Budget exhausted: recompute the objective at the final iterate.
        for i in 0..n {
            self.residual[i] = y[i] - self.eta[i] - b0;
        }
        let loss = 0.5 * dot(&self.residual, &self.residual) / nf;
        let primal = loss + penalty.eval(beta, alpha, &mut self.prox_ws);
        let stats = SolverStats {
            status: SolveStatus::MaxIterations,
            iterations: options.max_iters,
            primal,
            dual_gap: last_gap,
            learning_rate,
        };
        Ok(finish_stats(stats, intercept, b0, start_time, &mut reporter))
    }
}

fn finish_stats(
    stats: SolverStats,
    intercept: Option<&mut f64>,
    b0: f64,
    start_time: Option<Instant>,
    reporter: &mut ReporterSlot<'_>,
) -> SolverStats {
    if let Some(slot) = intercept {
        *slot = b0;
    }
    if let Some(reporter) = reporter.as_mut() {
        reporter.on_finish();
    }
    if let Some(start) = start_time {
        let elapsed = format_duration(start.elapsed());
        emit_line(&format!("time: {elapsed}"));
    }
    stats
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 1.0 {
        format!("{:.3} s", secs)
    } else if secs >= 1e-3 {
        format!("{:.3} ms", secs * 1e3)
    } else if secs >= 1e-6 {
        format!("{:.3} us", secs * 1e6)
    } else {
        format!("{:.0} ns", secs * 1e9)
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += x * y;
    }
    sum
}

fn mean(x: &[f64]) -> f64 {
    let mut sum = 0.0;
    for &v in x {
        sum += v;
    }
    sum / x.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{DesignMatrix, NormalizedDesign};
    use faer_core::Parallelism;

    #[test]
    fn solves_single_feature_least_squares() {
        let x = DesignMatrix::from_column_major(1, 1, vec![1.0]).unwrap();
        let mut problem = NormalizedDesign::new(&x, None, Parallelism::None);
        let penalty = SortedL1Norm::new(vec![0.0]).unwrap();
        let mut solver = SlopeSolver::new(1, 1).unwrap();
        let mut beta = [0.0];
        let options = SolverOptions {
            tol: 1e-4,
            ..SolverOptions::default()
        };
        let stats = solver
            .solve(
                &mut problem,
                &[2.0],
                &penalty,
                0.0,
                &mut beta,
                None,
                &options,
                None,
            )
            .unwrap();
        assert_eq!(stats.status, SolveStatus::Converged);
        assert!((beta[0] - 2.0).abs() < 1e-6);
    }
}
