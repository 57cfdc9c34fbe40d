//! SLOPE (sorted L-one penalized estimation) for least-squares regression.
//!
//! This crate minimizes `||y - X beta - b0||^2 / (2n) + alpha * J(beta)`,
//! where `J` is the sorted-L1 norm: coefficient magnitudes are sorted
//! descending and matched against a non-increasing weight sequence. The
//! penalty induces both sparsity and clusters of coefficients with equal
//! absolute value.
//!
//! How it works (high level):
//! - Take a proximal gradient step with a backtracking line search.
//! - Apply the exact sorted-L1 proximal operator (a stack-based isotonic
//!   projection) to the stepped coefficients.
//! - Accelerate with FISTA extrapolation, restarting when the objective
//!   rises.
//! - Certify convergence with a duality gap each iteration.
//!
//! Calling it:
//! - Build a `DesignMatrix` (dense column-major or CSC).
//! - Call `fit_slope` with the response, a non-increasing weight sequence,
//!   a penalty strength, and options; inspect the returned `FitResult`.
//!
//! Example:
//! ```rust,no_run
//! use slope_rs::{DesignMatrix, FitOptions, fit_slope};
//!
//! let x = DesignMatrix::from_column_major(3, 2, vec![1.0, 0.0, 1.0, 2.0, 1.0, 0.0]).unwrap();
//! let y = [3.0, 1.0, 1.0];
//! let lambda = [0.5, 0.25];
//!
//! let fit = fit_slope(&x, &y, &lambda, 0.1, &FitOptions::default(), None).unwrap();
//! assert!(fit.converged());
//! assert_eq!(fit.coefficients.len(), 2);
//! ```

mod design;
mod fit;
mod prox;
mod report;
mod solver;

pub use design::{DesignError, DesignMatrix, Normalization, NormalizedDesign};
pub use fit::{FitError, FitOptions, FitResult, fit_slope};
pub use prox::{PenaltyError, SortedL1Norm, SortedL1Workspace};
pub use report::{IterationReport, Reporter, SolveStatus, SolverStats, StdoutReporter};
pub use solver::{LeastSquares, SlopeSolver, SolveError, SolverError, SolverOptions};
