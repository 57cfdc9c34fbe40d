use core::fmt;

use faer_core::{Parallelism, mat, mul::matmul};

use crate::solver::LeastSquares;

/// Validation errors for a [`DesignMatrix`].
#[derive(Debug, Clone)]
pub enum DesignError {
    /// The matrix has zero rows or columns.
    InvalidDimensions { nrows: usize, ncols: usize },
    /// Dense value buffer length does not match nrows * ncols.
    ValueLen { expected: usize, actual: usize },
    /// col_ptrs length is not ncols + 1.
    ColPtrLen { expected: usize, actual: usize },
    /// col_ptrs[0] is not 0.
    ColPtrStart { value: usize },
    /// col_ptrs is not non-decreasing.
    ColPtrNotMonotonic { col: usize, prev: usize, next: usize },
    /// col_ptrs[ncols] does not match row_indices length.
    ColPtrOutOfBounds { last: usize, row_indices_len: usize },
    /// A row index is >= nrows.
    RowIndexOutOfBounds { col: usize, row: usize, nrows: usize },
    /// Row indices in a column are not sorted.
    RowIndexNotSorted { col: usize, prev: usize, next: usize },
    /// Sparse value buffer length does not match row_indices length.
    SparseValueLen { expected: usize, actual: usize },
    /// An entry is NaN or infinite.
    NonFinite { row: usize, col: usize },
}

impl fmt::Display for DesignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions { nrows, ncols } => {
                write!(f, "invalid dimensions: nrows={nrows}, ncols={ncols}")
            }
            Self::ValueLen { expected, actual } => {
                write!(f, "value length {actual} does not match nrows * ncols = {expected}")
            }
            Self::ColPtrLen { expected, actual } => {
                write!(f, "col_ptrs length {actual} does not match expected {expected}")
            }
            Self::ColPtrStart { value } => {
                write!(f, "col_ptrs must start at 0 (got {value})")
            }
            Self::ColPtrNotMonotonic { col, prev, next } => {
                write!(f, "col_ptrs not monotonic at col {col}: {prev} > {next}")
            }
            Self::ColPtrOutOfBounds {
                last,
                row_indices_len,
            } => {
                write!(
                    f,
                    "col_ptrs end {last} exceeds row_indices length {row_indices_len}"
                )
            }
            Self::RowIndexOutOfBounds { col, row, nrows } => {
                write!(f, "row index {row} in col {col} exceeds nrows {nrows}")
            }
            Self::RowIndexNotSorted { col, prev, next } => {
                write!(f, "row indices not sorted in col {col}: {prev} > {next}")
            }
            Self::SparseValueLen { expected, actual } => {
                write!(
                    f,
                    "sparse value length {actual} does not match row_indices length {expected}"
                )
            }
            Self::NonFinite { row, col } => {
                write!(f, "entry ({row}, {col}) is not finite")
            }
        }
    }
}

impl std::error::Error for DesignError {}

#[derive(Debug, Clone)]
enum Storage {
    /// Column-major values of length nrows * ncols.
    Dense(Vec<f64>),
    /// Compressed sparse column storage; row indices sorted per column.
    Sparse {
        col_ptrs: Vec<usize>,
        row_indices: Vec<usize>,
        values: Vec<f64>,
    },
}

/// A validated N x P design matrix, dense or compressed sparse column.
///
/// All entries are finite; dimensions are at least 1 x 1. The matrix is
/// immutable after construction, so normalization is applied just-in-time by
/// [`NormalizedDesign`] instead of rewriting the storage.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    nrows: usize,
    ncols: usize,
    storage: Storage,
}

impl DesignMatrix {
    /// Creates a dense design matrix from column-major values.
    pub fn from_column_major(
        nrows: usize,
        ncols: usize,
        values: Vec<f64>,
    ) -> Result<Self, DesignError> {
        if nrows == 0 || ncols == 0 {
            return Err(DesignError::InvalidDimensions { nrows, ncols });
        }
        let expected = nrows * ncols;
        if values.len() != expected {
            return Err(DesignError::ValueLen {
                expected,
                actual: values.len(),
            });
        }
        for (k, &value) in values.iter().enumerate() {
            if !value.is_finite() {
                return Err(DesignError::NonFinite {
                    row: k % nrows,
                    col: k / nrows,
                });
            }
        }
        Ok(Self {
            nrows,
            ncols,
            storage: Storage::Dense(values),
        })
    }

    /// Creates a sparse design matrix from compressed sparse column arrays.
    ///
    /// Requirements:
    /// - `col_ptrs.len() == ncols + 1`
    /// - `col_ptrs` is non-decreasing and starts at `0`
    /// - `col_ptrs[ncols] == row_indices.len() == values.len()`
    /// - row indices are sorted and `< nrows` within each column
    pub fn from_csc(
        nrows: usize,
        ncols: usize,
        col_ptrs: Vec<usize>,
        row_indices: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self, DesignError> {
        if nrows == 0 || ncols == 0 {
            return Err(DesignError::InvalidDimensions { nrows, ncols });
        }
        let expected = ncols + 1;
        if col_ptrs.len() != expected {
            return Err(DesignError::ColPtrLen {
                expected,
                actual: col_ptrs.len(),
            });
        }
        if col_ptrs[0] != 0 {
            return Err(DesignError::ColPtrStart { value: col_ptrs[0] });
        }
        for col in 0..ncols {
            let prev = col_ptrs[col];
            let next = col_ptrs[col + 1];
            if prev > next {
                return Err(DesignError::ColPtrNotMonotonic { col, prev, next });
            }
        }
        let last = col_ptrs[ncols];
        if last != row_indices.len() {
            return Err(DesignError::ColPtrOutOfBounds {
                last,
                row_indices_len: row_indices.len(),
            });
        }
        if values.len() != row_indices.len() {
            return Err(DesignError::SparseValueLen {
                expected: row_indices.len(),
                actual: values.len(),
            });
        }

        for col in 0..ncols {
            let start = col_ptrs[col];
            let end = col_ptrs[col + 1];
            if start == end {
                continue;
            }
            let mut prev = row_indices[start];
            if prev >= nrows {
                return Err(DesignError::RowIndexOutOfBounds {
                    col,
                    row: prev,
                    nrows,
                });
            }
            for &row in &row_indices[start + 1..end] {
                if prev >= row {
                    return Err(DesignError::RowIndexNotSorted { col, prev, next: row });
                }
                if row >= nrows {
                    return Err(DesignError::RowIndexOutOfBounds { col, row, nrows });
                }
                prev = row;
            }
            for idx in start..end {
                if !values[idx].is_finite() {
                    return Err(DesignError::NonFinite {
                        row: row_indices[idx],
                        col,
                    });
                }
            }
        }

        Ok(Self {
            nrows,
            ncols,
            storage: Storage::Sparse {
                col_ptrs,
                row_indices,
                values,
            },
        })
    }

    /// Number of observations (rows).
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of features (columns).
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Fill `out` with `X * beta`.
    ///
    /// `out.len() == nrows`, `beta.len() == ncols`. Sparse products use a
    /// fixed column-by-column accumulation order, so results are
    /// deterministic across runs.
    pub fn gemv(&self, beta: &[f64], out: &mut [f64], parallelism: Parallelism) {
        debug_assert_eq!(beta.len(), self.ncols);
        debug_assert_eq!(out.len(), self.nrows);
        match &self.storage {
            Storage::Dense(values) => {
                let x = mat::from_column_major_slice::<f64>(values, self.nrows, self.ncols);
                let rhs = mat::from_column_major_slice::<f64>(beta, self.ncols, 1);
                let acc = mat::from_column_major_slice_mut::<f64>(out, self.nrows, 1);
                matmul(acc, x, rhs, None, 1.0, parallelism);
            }
            Storage::Sparse {
                col_ptrs,
                row_indices,
                values,
            } => {
                out.fill(0.0);
                for col in 0..self.ncols {
                    let b = beta[col];
                    if b == 0.0 {
                        continue;
                    }
                    for idx in col_ptrs[col]..col_ptrs[col + 1] {
                        out[row_indices[idx]] += values[idx] * b;
                    }
                }
            }
        }
    }

    /// Fill `out` with `X^T * r`.
    ///
    /// `out.len() == ncols`, `r.len() == nrows`.
    pub fn gemv_t(&self, r: &[f64], out: &mut [f64], parallelism: Parallelism) {
        debug_assert_eq!(r.len(), self.nrows);
        debug_assert_eq!(out.len(), self.ncols);
        match &self.storage {
            Storage::Dense(values) => {
                let x = mat::from_column_major_slice::<f64>(values, self.nrows, self.ncols);
                let rhs = mat::from_column_major_slice::<f64>(r, self.nrows, 1);
                let acc = mat::from_column_major_slice_mut::<f64>(out, self.ncols, 1);
                matmul(acc, x.transpose(), rhs, None, 1.0, parallelism);
            }
            Storage::Sparse {
                col_ptrs,
                row_indices,
                values,
            } => {
                for col in 0..self.ncols {
                    let mut sum = 0.0;
                    for idx in col_ptrs[col]..col_ptrs[col + 1] {
                        sum += values[idx] * r[row_indices[idx]];
                    }
                    out[col] = sum;
                }
            }
        }
    }

    /// Fill `out` with the column sums of the matrix.
    pub fn column_sums_into(&self, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.ncols);
        match &self.storage {
            Storage::Dense(values) => {
                for (col, slot) in out.iter_mut().enumerate() {
                    let column = &values[col * self.nrows..(col + 1) * self.nrows];
                    *slot = column.iter().sum();
                }
            }
            Storage::Sparse {
                col_ptrs, values, ..
            } => {
                for (col, slot) in out.iter_mut().enumerate() {
                    *slot = values[col_ptrs[col]..col_ptrs[col + 1]].iter().sum();
                }
            }
        }
    }

    /// Per-column means and population standard deviations via Welford's
    /// algorithm, counting the implicit zeros of sparse columns.
    pub fn column_stats(&self) -> (Vec<f64>, Vec<f64>) {
        let n = self.nrows;
        let mut means = vec![0.0; self.ncols];
        let mut stddevs = vec![0.0; self.ncols];
        for col in 0..self.ncols {
            let mut mean = 0.0;
            let mut m2 = 0.0;
            let mut count = 0usize;

            let mut push = |value: f64| {
                count += 1;
                let delta = value - mean;
                mean += delta / count as f64;
                m2 += delta * (value - mean);
            };
            match &self.storage {
                Storage::Dense(values) => {
                    for &value in &values[col * n..(col + 1) * n] {
                        push(value);
                    }
                }
                Storage::Sparse {
                    col_ptrs, values, ..
                } => {
                    for &value in &values[col_ptrs[col]..col_ptrs[col + 1]] {
                        push(value);
                    }
                }
            }
            // Account for rows not stored in the column.
            while count < n {
                count += 1;
                let delta = -mean;
                mean += delta / count as f64;
                m2 += delta * (-mean);
            }

            means[col] = mean;
            stddevs[col] = (m2 / n as f64).sqrt();
        }
        (means, stddevs)
    }
}

/// Column centers and scales used for just-in-time standardization.
///
/// Zero-variance columns get a unit scale so the division stays defined; a
/// centered constant column contributes nothing either way.
#[derive(Debug, Clone)]
pub struct Normalization {
    centers: Vec<f64>,
    scales: Vec<f64>,
}

impl Normalization {
    /// Computes centers and scales from the design matrix columns.
    pub fn from_design(x: &DesignMatrix) -> Self {
        let (centers, mut scales) = x.column_stats();
        for scale in &mut scales {
            if *scale == 0.0 {
                *scale = 1.0;
            }
        }
        Self { centers, scales }
    }

    pub fn centers(&self) -> &[f64] {
        &self.centers
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    /// Converts standardized-scale coefficients back to the original feature
    /// scale, folding the centering into the intercept when one is fit.
    pub fn rescale_coefficients(&self, beta: &mut [f64], intercept: &mut f64, fit_intercept: bool) {
        let mut center_shift = 0.0;
        for (j, value) in beta.iter_mut().enumerate() {
            *value /= self.scales[j];
            center_shift += self.centers[j] * *value;
        }
        if fit_intercept {
            *intercept -= center_shift;
        }
    }
}

/// A design matrix with optional just-in-time normalization, exposed to the
/// solver through the [`LeastSquares`] seam.
pub struct NormalizedDesign<'a> {
    x: &'a DesignMatrix,
    normalization: Option<&'a Normalization>,
    parallelism: Parallelism,
    scaled: Vec<f64>,
}

impl<'a> NormalizedDesign<'a> {
    pub fn new(
        x: &'a DesignMatrix,
        normalization: Option<&'a Normalization>,
        parallelism: Parallelism,
    ) -> Self {
        let scaled = vec![0.0; x.ncols()];
        Self {
            x,
            normalization,
            parallelism,
            scaled,
        }
    }
}

impl LeastSquares for NormalizedDesign<'_> {
    fn nrows(&self) -> usize {
        self.x.nrows()
    }

    fn ncols(&self) -> usize {
        self.x.ncols()
    }

    fn linear_predictor(&mut self, beta: &[f64], eta: &mut [f64]) {
        match self.normalization {
            None => self.x.gemv(beta, eta, self.parallelism),
            Some(norm) => {
                for (slot, (value, scale)) in
                    self.scaled.iter_mut().zip(beta.iter().zip(norm.scales()))
                {
                    *slot = value / scale;
                }
                self.x.gemv(&self.scaled, eta, self.parallelism);
                let mut shift = 0.0;
                for (center, value) in norm.centers().iter().zip(&self.scaled) {
                    shift += center * value;
                }
                for slot in eta.iter_mut() {
                    *slot -= shift;
                }
            }
        }
    }

    fn gradient(&mut self, residual: &[f64], gradient: &mut [f64]) {
        self.x.gemv_t(residual, gradient, self.parallelism);
        let n = self.x.nrows() as f64;
        match self.normalization {
            None => {
                for slot in gradient.iter_mut() {
                    *slot = -*slot / n;
                }
            }
            Some(norm) => {
                let residual_sum: f64 = residual.iter().sum();
                for (j, slot) in gradient.iter_mut().enumerate() {
                    *slot = -(*slot - norm.centers()[j] * residual_sum) / (norm.scales()[j] * n);
                }
            }
        }
    }

    fn column_sums(&mut self, out: &mut [f64]) {
        self.x.column_sums_into(out);
        if let Some(norm) = self.normalization {
            let n = self.x.nrows() as f64;
            for (j, slot) in out.iter_mut().enumerate() {
                *slot = (*slot - n * norm.centers()[j]) / norm.scales()[j];
            }
        }
    }
}
