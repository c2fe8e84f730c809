//! Dense row-major storage for 2D matrices and 3D sequence tensors.
//!
//! - [`Matrix`] has shape `(rows, cols)`; dense layers see `(batch, features)`.
//! - [`Tensor3`] has shape `(batch, steps, features)`; recurrent layers see one
//!   `(batch, features)` slab per timestep.
//!
//! Constructors validate shapes and return [`Result`]. Arithmetic helpers treat
//! shape mismatches as programmer error and panic via `assert!`, like the rest of
//! the numeric hot path.

use crate::matmul::gemm_f64;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Build a matrix from a flat row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::ShapeMismatch(format!(
                "buffer length {} does not match rows * cols ({rows} * {cols})",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build a matrix from per-row vectors.
    ///
    /// This is a convenience constructor (it copies into contiguous storage).
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(Error::ShapeMismatch(format!(
                    "row {i} has len {}, expected {cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// A `(len, 1)` column vector.
    pub fn column(values: &[f64]) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            data: values.to_vec(),
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    #[inline]
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    /// Returns the `idx`-th row.
    ///
    /// Panics if `idx >= rows`.
    #[inline]
    pub fn row(&self, idx: usize) -> &[f64] {
        let start = idx * self.cols;
        &self.data[start..start + self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, idx: usize) -> &mut [f64] {
        let start = idx * self.cols;
        &mut self.data[start..start + self.cols]
    }

    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        out
    }

    /// Gather rows in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Matrix {
            rows: indices.len(),
            cols: self.cols,
            data,
        }
    }

    /// `self * other`.
    pub fn matmul(&self, other: &Matrix) -> Matrix {
        assert_eq!(
            self.cols, other.rows,
            "matmul inner dims differ: ({}, {}) x ({}, {})",
            self.rows, self.cols, other.rows, other.cols
        );
        let mut out = Matrix::zeros(self.rows, other.cols);
        gemm_f64(
            self.rows,
            other.cols,
            self.cols,
            1.0,
            &self.data,
            self.cols,
            1,
            &other.data,
            other.cols,
            1,
            0.0,
            &mut out.data,
            out.cols,
            1,
        );
        out
    }

    /// `self^T * other` without materializing the transpose.
    pub fn t_matmul(&self, other: &Matrix) -> Matrix {
        assert_eq!(
            self.rows, other.rows,
            "t_matmul inner dims differ: ({}, {})^T x ({}, {})",
            self.rows, self.cols, other.rows, other.cols
        );
        let mut out = Matrix::zeros(self.cols, other.cols);
        gemm_f64(
            self.cols,
            other.cols,
            self.rows,
            1.0,
            &self.data,
            1,
            self.cols,
            &other.data,
            other.cols,
            1,
            0.0,
            &mut out.data,
            out.cols,
            1,
        );
        out
    }

    /// `self * other^T` without materializing the transpose.
    pub fn matmul_t(&self, other: &Matrix) -> Matrix {
        assert_eq!(
            self.cols, other.cols,
            "matmul_t inner dims differ: ({}, {}) x ({}, {})^T",
            self.rows, self.cols, other.rows, other.cols
        );
        let mut out = Matrix::zeros(self.rows, other.rows);
        gemm_f64(
            self.rows,
            other.rows,
            self.cols,
            1.0,
            &self.data,
            self.cols,
            1,
            &other.data,
            1,
            other.cols,
            0.0,
            &mut out.data,
            out.cols,
            1,
        );
        out
    }

    /// Add a `(1, cols)` row to every row.
    pub fn add_row_broadcast(&mut self, bias: &Matrix) {
        assert_eq!(
            bias.shape(),
            (1, self.cols),
            "bias shape {:?} does not broadcast over ({}, {})",
            bias.shape(),
            self.rows,
            self.cols
        );
        for r in 0..self.rows {
            for (v, &b) in self.row_mut(r).iter_mut().zip(&bias.data) {
                *v += b;
            }
        }
    }

    /// Column sums as a `(1, cols)` row.
    pub fn sum_rows(&self) -> Matrix {
        let mut out = Matrix::zeros(1, self.cols);
        for r in 0..self.rows {
            for (acc, &v) in out.data.iter_mut().zip(self.row(r)) {
                *acc += v;
            }
        }
        out
    }

    /// Horizontal concatenation `[self, other]`.
    pub fn hstack(&self, other: &Matrix) -> Matrix {
        assert_eq!(
            self.rows, other.rows,
            "hstack row counts differ: {} vs {}",
            self.rows, other.rows
        );
        let cols = self.cols + other.cols;
        let mut data = Vec::with_capacity(self.rows * cols);
        for r in 0..self.rows {
            data.extend_from_slice(self.row(r));
            data.extend_from_slice(other.row(r));
        }
        Matrix {
            rows: self.rows,
            cols,
            data,
        }
    }

    /// Split columns into `[0, at)` and `[at, cols)`.
    pub fn split_cols(&self, at: usize) -> (Matrix, Matrix) {
        assert!(at <= self.cols, "split point {at} exceeds cols {}", self.cols);
        let mut left = Matrix::zeros(self.rows, at);
        let mut right = Matrix::zeros(self.rows, self.cols - at);
        for r in 0..self.rows {
            let row = self.row(r);
            left.row_mut(r).copy_from_slice(&row[..at]);
            right.row_mut(r).copy_from_slice(&row[at..]);
        }
        (left, right)
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Matrix {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Element-wise combination of two same-shaped matrices.
    pub fn zip_map(&self, other: &Matrix, f: impl Fn(f64, f64) -> f64) -> Matrix {
        assert_eq!(
            self.shape(),
            other.shape(),
            "element-wise shapes differ: {:?} vs {:?}",
            self.shape(),
            other.shape()
        );
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }

    /// `self += other`, element-wise.
    pub fn add_assign(&mut self, other: &Matrix) {
        assert_eq!(
            self.shape(),
            other.shape(),
            "element-wise shapes differ: {:?} vs {:?}",
            self.shape(),
            other.shape()
        );
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }

    pub fn scale(&mut self, k: f64) {
        for v in &mut self.data {
            *v *= k;
        }
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

/// A batch of sequences with shape `(batch, steps, features)`.
///
/// Stored contiguously: example `b`, step `t`, feature `f` lives at
/// `(b * steps + t) * features + f`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor3 {
    batch: usize,
    steps: usize,
    features: usize,
    data: Vec<f64>,
}

impl Tensor3 {
    pub fn zeros(batch: usize, steps: usize, features: usize) -> Self {
        Self {
            batch,
            steps,
            features,
            data: vec![0.0; batch * steps * features],
        }
    }

    pub fn from_vec(batch: usize, steps: usize, features: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != batch * steps * features {
            return Err(Error::ShapeMismatch(format!(
                "buffer length {} does not match batch * steps * features ({batch} * {steps} * {features})",
                data.len()
            )));
        }
        Ok(Self {
            batch,
            steps,
            features,
            data,
        })
    }

    /// Build a tensor from nested `[example][step][feature]` vectors.
    ///
    /// Every example must have the same number of steps and every step the same
    /// number of features.
    pub fn from_nested(examples: &[Vec<Vec<f64>>]) -> Result<Self> {
        let steps = examples.first().map(|e| e.len()).unwrap_or(0);
        let features = examples
            .first()
            .and_then(|e| e.first())
            .map(|s| s.len())
            .unwrap_or(0);

        let mut data = Vec::with_capacity(examples.len() * steps * features);
        for (b, example) in examples.iter().enumerate() {
            if example.len() != steps {
                return Err(Error::ShapeMismatch(format!(
                    "example {b} has {} steps, expected {steps}",
                    example.len()
                )));
            }
            for (t, step) in example.iter().enumerate() {
                if step.len() != features {
                    return Err(Error::ShapeMismatch(format!(
                        "example {b} step {t} has {} features, expected {features}",
                        step.len()
                    )));
                }
                data.extend_from_slice(step);
            }
        }

        Ok(Self {
            batch: examples.len(),
            steps,
            features,
            data,
        })
    }

    #[inline]
    pub fn batch(&self) -> usize {
        self.batch
    }

    #[inline]
    pub fn steps(&self) -> usize {
        self.steps
    }

    #[inline]
    pub fn features(&self) -> usize {
        self.features
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.batch, self.steps, self.features)
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn get(&self, b: usize, t: usize, f: usize) -> f64 {
        self.data[(b * self.steps + t) * self.features + f]
    }

    /// The `(steps, features)` block of one example.
    #[inline]
    pub fn example(&self, b: usize) -> &[f64] {
        let len = self.steps * self.features;
        &self.data[b * len..(b + 1) * len]
    }

    /// Feature vector of example `b` at step `t`.
    #[inline]
    pub fn step_row(&self, b: usize, t: usize) -> &[f64] {
        let start = (b * self.steps + t) * self.features;
        &self.data[start..start + self.features]
    }

    #[inline]
    pub fn step_row_mut(&mut self, b: usize, t: usize) -> &mut [f64] {
        let start = (b * self.steps + t) * self.features;
        &mut self.data[start..start + self.features]
    }

    /// Copy out timestep `t` as a `(batch, features)` matrix.
    pub fn step(&self, t: usize) -> Matrix {
        assert!(t < self.steps, "step {t} out of range ({})", self.steps);
        let mut out = Matrix::zeros(self.batch, self.features);
        for b in 0..self.batch {
            out.row_mut(b).copy_from_slice(self.step_row(b, t));
        }
        out
    }

    /// Overwrite timestep `t` from a `(batch, features)` matrix.
    pub fn set_step(&mut self, t: usize, values: &Matrix) {
        assert!(t < self.steps, "step {t} out of range ({})", self.steps);
        assert_eq!(
            values.shape(),
            (self.batch, self.features),
            "step values shape {:?} does not match ({}, {})",
            values.shape(),
            self.batch,
            self.features
        );
        for b in 0..self.batch {
            self.step_row_mut(b, t).copy_from_slice(values.row(b));
        }
    }

    /// Gather examples in the given order.
    pub fn select_examples(&self, indices: &[usize]) -> Tensor3 {
        let mut data = Vec::with_capacity(indices.len() * self.steps * self.features);
        for &i in indices {
            data.extend_from_slice(self.example(i));
        }
        Tensor3 {
            batch: indices.len(),
            steps: self.steps,
            features: self.features,
            data,
        }
    }
}
