use core::fmt;

use faer_core::Parallelism;

use crate::design::{DesignMatrix, Normalization, NormalizedDesign};
use crate::prox::{PenaltyError, SortedL1Norm};
use crate::report::{Reporter, SolveStatus, SolverStats};
use crate::solver::{LeastSquares, SlopeSolver, SolveError, SolverError, SolverOptions};

/// Errors detected before any optimization iteration runs.
#[derive(Debug)]
pub enum FitError {
    /// The response has the wrong length.
    ResponseLength { expected: usize, actual: usize },
    /// The response contains a NaN or infinite value.
    NonFiniteResponse { row: usize },
    /// The penalty sequence has the wrong length.
    PenaltyLength { expected: usize, actual: usize },
    /// The penalty sequence is invalid.
    Penalty(PenaltyError),
    /// Alpha is negative, NaN, or infinite.
    InvalidAlpha { value: f64 },
    /// The warm start has the wrong length.
    WarmStartLength { expected: usize, actual: usize },
    /// The warm start contains a NaN or infinite value.
    NonFiniteWarmStart { index: usize },
    /// The solver workspace could not be constructed.
    Solver(SolverError),
    /// The solver rejected the assembled problem.
    Solve(SolveError),
}

impl fmt::Display for FitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResponseLength { expected, actual } => {
                write!(
                    f,
                    "y length {actual} does not match design rows {expected}"
                )
            }
            Self::NonFiniteResponse { row } => {
                write!(f, "y[{row}] is not finite")
            }
            Self::PenaltyLength { expected, actual } => {
                write!(
                    f,
                    "lambda length {actual} does not match feature count {expected}"
                )
            }
            Self::Penalty(err) => write!(f, "invalid lambda sequence: {err}"),
            Self::InvalidAlpha { value } => {
                write!(f, "alpha must be non-negative and finite (got {value})")
            }
            Self::WarmStartLength { expected, actual } => {
                write!(
                    f,
                    "warm start length {actual} does not match feature count {expected}"
                )
            }
            Self::NonFiniteWarmStart { index } => {
                write!(f, "warm start[{index}] is not finite")
            }
            Self::Solver(err) => write!(f, "{err}"),
            Self::Solve(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for FitError {}

impl From<PenaltyError> for FitError {
    fn from(err: PenaltyError) -> Self {
        Self::Penalty(err)
    }
}

impl From<SolverError> for FitError {
    fn from(err: SolverError) -> Self {
        Self::Solver(err)
    }
}

impl From<SolveError> for FitError {
    fn from(err: SolveError) -> Self {
        Self::Solve(err)
    }
}

/// Options controlling a [`fit_slope`] call.
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Center and scale features before fitting; coefficients are reported
    /// back in the original feature scale.
    pub standardize: bool,
    /// Fit an unpenalized intercept.
    pub intercept: bool,
    /// Starting coefficients on the original feature scale (e.g. a previous
    /// solution along a lambda path). Zeros when absent.
    pub warm_start: Option<Vec<f64>>,
    /// Parallelism mode for dense matrix products.
    pub parallelism: Parallelism,
    /// Inner solver knobs (iteration budget, tolerance, line search).
    pub solver: SolverOptions,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            standardize: true,
            intercept: true,
            warm_start: None,
            parallelism: Parallelism::None,
            solver: SolverOptions::default(),
        }
    }
}

/// Outcome of a single SLOPE fit, reported on the original feature scale.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Fitted coefficients (length P).
    pub coefficients: Vec<f64>,
    /// Fitted intercept; 0.0 when intercept fitting is disabled.
    pub intercept: f64,
    /// Solver diagnostics for the terminal state.
    pub stats: SolverStats,
}

impl FitResult {
    /// Whether the duality-gap criterion was met.
    pub fn converged(&self) -> bool {
        self.stats.status == SolveStatus::Converged
    }

    /// Number of outer iterations performed.
    pub fn iterations(&self) -> usize {
        self.stats.iterations
    }
}

/// Fits a SLOPE model: minimizes
/// `||y - X beta - b0||^2 / (2n) + alpha * sum_i lambda_i * |beta|_(i)`.
///
/// Inputs are validated before any iteration: response length and
/// finiteness, lambda length/sign/monotonicity/finiteness, alpha sign, warm
/// start shape. Violations fail fast with a [`FitError`] naming the
/// offending dimension or value; no partial result is produced. Once the
/// solve starts, divergence and budget exhaustion are reported through the
/// result's status instead, so a caller sweeping a path of penalties can
/// keep going.
pub fn fit_slope(
    x: &DesignMatrix,
    y: &[f64],
    lambda: &[f64],
    alpha: f64,
    options: &FitOptions,
    reporter: Option<&mut dyn Reporter>,
) -> Result<FitResult, FitError> {
    let n = x.nrows();
    let p = x.ncols();

    if y.len() != n {
        return Err(FitError::ResponseLength {
            expected: n,
            actual: y.len(),
        });
    }
    if let Some(row) = y.iter().position(|v| !v.is_finite()) {
        return Err(FitError::NonFiniteResponse { row });
    }
    if lambda.len() != p {
        return Err(FitError::PenaltyLength {
            expected: p,
            actual: lambda.len(),
        });
    }
    let penalty = SortedL1Norm::new(lambda.to_vec())?;
    if !alpha.is_finite() || alpha < 0.0 {
        return Err(FitError::InvalidAlpha { value: alpha });
    }

    let normalization = if options.standardize {
        Some(Normalization::from_design(x))
    } else {
        None
    };

    let mut beta = match &options.warm_start {
        None => vec![0.0; p],
        Some(warm) => {
            if warm.len() != p {
                return Err(FitError::WarmStartLength {
                    expected: p,
                    actual: warm.len(),
                });
            }
            if let Some(index) = warm.iter().position(|v| !v.is_finite()) {
                return Err(FitError::NonFiniteWarmStart { index });
            }
            let mut beta = warm.clone();
            if let Some(norm) = &normalization {
                // Warm starts arrive on the original scale; the solver works
                // on the standardized one.
                for (value, scale) in beta.iter_mut().zip(norm.scales()) {
                    *value *= scale;
                }
            }
            beta
        }
    };

    let mut problem = NormalizedDesign::new(x, normalization.as_ref(), options.parallelism);

    let mut intercept = 0.0;
    if options.intercept {
        let mut eta = vec![0.0; n];
        problem.linear_predictor(&beta, &mut eta);
        let mut sum = 0.0;
        for (yi, ei) in y.iter().zip(&eta) {
            sum += yi - ei;
        }
        intercept = sum / n as f64;
    }

    let mut solver = SlopeSolver::new(n, p)?;
    let stats = solver.solve(
        &mut problem,
        y,
        &penalty,
        alpha,
        &mut beta,
        options.intercept.then_some(&mut intercept),
        &options.solver,
        reporter,
    )?;

    if let Some(norm) = &normalization {
        norm.rescale_coefficients(&mut beta, &mut intercept, options.intercept);
    }

    Ok(FitResult {
        coefficients: beta,
        intercept,
        stats,
    })
}
