use core::fmt;

// Denominator used for the dual norm when the penalty is effectively zero
// and the constraint set is the whole space.
const UNREGULARIZED_EPS: f64 = 1e-6;

/// Validation errors for a sorted-L1 weight sequence.
#[derive(Debug, Clone)]
pub enum PenaltyError {
    /// The weight sequence is empty.
    Empty,
    /// A weight is NaN or infinite.
    NonFinite { index: usize },
    /// A weight is negative.
    Negative { index: usize, value: f64 },
    /// The sequence increases somewhere.
    NotDecreasing { index: usize, prev: f64, next: f64 },
}

impl fmt::Display for PenaltyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "lambda must contain at least one weight"),
            Self::NonFinite { index } => {
                write!(f, "lambda[{index}] is not finite")
            }
            Self::Negative { index, value } => {
                write!(f, "lambda[{index}] = {value} is negative")
            }
            Self::NotDecreasing { index, prev, next } => {
                write!(
                    f,
                    "lambda must be non-increasing: lambda[{}] = {prev} < lambda[{index}] = {next}",
                    index - 1
                )
            }
        }
    }
}

impl std::error::Error for PenaltyError {}

/// Reusable scratch space for sorted-L1 evaluations on vectors of length p.
#[derive(Debug, Clone)]
pub struct SortedL1Workspace {
    order: Vec<usize>,
    sorted: Vec<f64>,
    block_sum: Vec<f64>,
    block_value: Vec<f64>,
    block_start: Vec<usize>,
    block_end: Vec<usize>,
}

impl SortedL1Workspace {
    /// Scratch space for vectors of the given length.
    pub fn new(len: usize) -> Self {
        Self {
            order: Vec::with_capacity(len),
            sorted: vec![0.0; len],
            block_sum: vec![0.0; len],
            block_value: vec![0.0; len],
            block_start: vec![0; len],
            block_end: vec![0; len],
        }
    }
}

/// The sorted-L1 norm `J(v) = sum_i lambda_i * |v|_(i)`, where `|v|_(i)` is
/// the i-th largest absolute entry of `v`.
///
/// The weight sequence is validated at construction: finite, non-negative,
/// and non-increasing. Violating monotonicity would break the proximal
/// operator, so it is rejected up front rather than checked per call.
#[derive(Debug, Clone)]
pub struct SortedL1Norm {
    lambda: Vec<f64>,
    lambda_cumsum: Vec<f64>,
}

impl SortedL1Norm {
    /// Creates a validated sorted-L1 norm from a weight sequence.
    pub fn new(lambda: Vec<f64>) -> Result<Self, PenaltyError> {
        if lambda.is_empty() {
            return Err(PenaltyError::Empty);
        }
        for (index, &value) in lambda.iter().enumerate() {
            if !value.is_finite() {
                return Err(PenaltyError::NonFinite { index });
            }
            if value < 0.0 {
                return Err(PenaltyError::Negative { index, value });
            }
            if index > 0 && lambda[index - 1] < value {
                return Err(PenaltyError::NotDecreasing {
                    index,
                    prev: lambda[index - 1],
                    next: value,
                });
            }
        }

        let mut lambda_cumsum = Vec::with_capacity(lambda.len());
        let mut acc = 0.0;
        for &value in &lambda {
            acc += value;
            lambda_cumsum.push(acc);
        }

        Ok(Self {
            lambda,
            lambda_cumsum,
        })
    }

    /// Number of weights (the coefficient dimension this norm applies to).
    pub fn len(&self) -> usize {
        self.lambda.len()
    }

    /// Whether the weight sequence is empty (never true after `new`).
    pub fn is_empty(&self) -> bool {
        self.lambda.is_empty()
    }

    /// The validated weight sequence.
    pub fn weights(&self) -> &[f64] {
        &self.lambda
    }

    /// Evaluates `alpha * sum_i lambda_i * |v|_(i)`.
    pub fn eval(&self, v: &[f64], alpha: f64, ws: &mut SortedL1Workspace) -> f64 {
        debug_assert_eq!(v.len(), self.lambda.len());
        if alpha == 0.0 {
            return 0.0;
        }
        for (dst, &value) in ws.sorted.iter_mut().zip(v) {
            *dst = value.abs();
        }
        ws.sorted.sort_unstable_by(|a, b| f64::total_cmp(b, a));
        let mut sum = 0.0;
        for (weight, value) in self.lambda.iter().zip(&ws.sorted) {
            sum += weight * value;
        }
        alpha * sum
    }

    /// Allocating convenience wrapper around [`SortedL1Norm::prox_into`].
    pub fn prox(&self, v: &[f64], scale: f64) -> Vec<f64> {
        let mut out = vec![0.0; v.len()];
        let mut ws = SortedL1Workspace::new(v.len());
        self.prox_into(v, scale, &mut out, &mut ws);
        out
    }

    /// Computes `argmin_u { 0.5 ||u - v||^2 + scale * sum_i lambda_i |u|_(i) }`
    /// exactly.
    ///
    /// The absolute values of `v` are sorted descending (stable, so ties keep
    /// their input order), the scaled weights are subtracted cumulatively, and
    /// adjacent blocks that would violate monotonicity are merged and averaged
    /// (pool-adjacent-violators on a stack). Non-positive blocks clip to zero,
    /// then the permutation and signs are undone.
    pub fn prox_into(&self, v: &[f64], scale: f64, out: &mut [f64], ws: &mut SortedL1Workspace) {
        let p = v.len();
        debug_assert_eq!(p, self.lambda.len());
        debug_assert_eq!(p, out.len());

        ws.order.clear();
        ws.order.extend(0..p);
        // Descending by absolute value, index as tiebreaker: reproduces a
        // stable sort without the stable sort's scratch allocation.
        ws.order.sort_unstable_by(|&a, &b| {
            f64::total_cmp(&v[b].abs(), &v[a].abs()).then(a.cmp(&b))
        });
        for (slot, &src) in ws.sorted.iter_mut().zip(&ws.order) {
            *slot = v[src].abs();
        }

        // Stack of blocks; block k covers sorted positions
        // block_start[k]..=block_end[k] and carries the running sum and the
        // averaged value of its entries after weight subtraction.
        let mut k = 0usize;
        for i in 0..p {
            ws.block_start[k] = i;
            ws.block_end[k] = i;
            ws.block_sum[k] = ws.sorted[i] - scale * self.lambda[i];
            ws.block_value[k] = ws.block_sum[k];
            while k > 0 && ws.block_value[k - 1] <= ws.block_value[k] {
                k -= 1;
                ws.block_end[k] = i;
                ws.block_sum[k] += ws.block_sum[k + 1];
                ws.block_value[k] = ws.block_sum[k] / (i - ws.block_start[k] + 1) as f64;
            }
            k += 1;
        }

        for block in 0..k {
            let value = ws.block_value[block].max(0.0);
            let (start, end) = (ws.block_start[block], ws.block_end[block]);
            for slot in &mut ws.sorted[start..=end] {
                *slot = value;
            }
        }

        for (i, &src) in ws.order.iter().enumerate() {
            out[src] = ws.sorted[i].copysign(v[src]);
        }
    }

    /// Dual norm of `a` with respect to the scaled weights:
    /// `max_j cumsum(sort_desc(|a|))_j / (alpha * cumsum(lambda)_j)`.
    ///
    /// A dual point is feasible when this is at most one; the solver divides
    /// its dual candidate by `max(1, dual_norm)` to force feasibility.
    pub fn dual_norm(&self, a: &[f64], alpha: f64, ws: &mut SortedL1Workspace) -> f64 {
        debug_assert_eq!(a.len(), self.lambda.len());
        for (dst, &value) in ws.sorted.iter_mut().zip(a) {
            *dst = value.abs();
        }
        ws.sorted.sort_unstable_by(|a, b| f64::total_cmp(b, a));

        let unregularized = alpha == 0.0 || self.lambda_cumsum[self.lambda.len() - 1] == 0.0;
        let mut cum = 0.0;
        let mut max_ratio = 0.0f64;
        for (i, &value) in ws.sorted.iter().enumerate() {
            cum += value;
            let denom = alpha * self.lambda_cumsum[i];
            let ratio = if unregularized || denom == 0.0 {
                cum / UNREGULARIZED_EPS
            } else {
                cum / denom
            };
            if ratio > max_ratio {
                max_ratio = ratio;
            }
        }
        max_ratio
    }
}
