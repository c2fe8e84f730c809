//! Dense (fully-connected) layer.
//!
//! Batched rule over `(batch, in_dim)` inputs:
//! - `z = x W + b`, with `W: (in_dim, out_dim)` and `b: (1, out_dim)` broadcast over rows
//! - `a = activation(z)`
//!
//! Backward uses overwrite semantics: every call produces fresh gradients.

use rand::Rng;

use crate::layer::Init;
use crate::{Activation, Error, Matrix, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct DenseParams {
    /// Shape `(in_dim, out_dim)`.
    pub w: Matrix,
    /// Shape `(1, out_dim)`.
    pub b: Matrix,
}

/// Values recorded by [`forward`] for [`backward`].
#[derive(Debug, Clone)]
pub struct DenseCache {
    pub input: Matrix,
    pub pre_activation: Matrix,
    pub output: Matrix,
    pub activation: Activation,
    /// Set when this layer consumed the collapsed output of an LSTM layer.
    pub after_recurrent: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DenseGrads {
    pub d_w: Matrix,
    pub d_b: Matrix,
}

impl DenseParams {
    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        init: Init,
        rng: &mut R,
    ) -> Self {
        Self {
            w: init.weights(in_dim, out_dim, rng),
            b: Matrix::zeros(1, out_dim),
        }
    }

    /// Build from explicit parts, validating shapes.
    pub fn from_parts(w: Matrix, b: Matrix) -> Result<Self> {
        if b.shape() != (1, w.cols()) {
            return Err(Error::ShapeMismatch(format!(
                "dense bias shape {:?} does not match (1, {})",
                b.shape(),
                w.cols()
            )));
        }
        Ok(Self { w, b })
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.w.rows()
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.w.cols()
    }

    pub fn tensors(&self) -> [&Matrix; 2] {
        [&self.w, &self.b]
    }

    pub fn tensors_mut(&mut self) -> [&mut Matrix; 2] {
        [&mut self.w, &mut self.b]
    }
}

impl DenseGrads {
    pub fn tensors(&self) -> [&Matrix; 2] {
        [&self.d_w, &self.d_b]
    }
}

/// Forward pass for one batch.
///
/// Returns the layer output and the cache needed by [`backward`].
pub fn forward(
    params: &DenseParams,
    input: &Matrix,
    activation: Activation,
    after_recurrent: bool,
) -> Result<(Matrix, DenseCache)> {
    if input.cols() != params.in_dim() {
        return Err(Error::ShapeMismatch(format!(
            "dense input has {} features, layer expects {}",
            input.cols(),
            params.in_dim()
        )));
    }

    let mut z = input.matmul(&params.w);
    z.add_row_broadcast(&params.b);
    let a = activation.apply(&z);

    let cache = DenseCache {
        input: input.clone(),
        pre_activation: z,
        output: a.clone(),
        activation,
        after_recurrent,
    };
    Ok((a, cache))
}

/// Backward pass for one batch.
///
/// `d_output` is `dL/d(output)` with the same shape as the cached output.
/// Returns the parameter gradients and `dL/d(input)`.
pub fn backward(
    params: &DenseParams,
    cache: &DenseCache,
    d_output: &Matrix,
) -> Result<(DenseGrads, Matrix)> {
    if d_output.shape() != cache.output.shape() {
        return Err(Error::ShapeMismatch(format!(
            "dense upstream gradient shape {:?} does not match output shape {:?}",
            d_output.shape(),
            cache.output.shape()
        )));
    }

    let d_z = cache.activation.backprop(&cache.output, d_output);
    let d_w = cache.input.t_matmul(&d_z);
    let d_b = d_z.sum_rows();
    let d_input = d_z.matmul_t(&params.w);

    Ok((DenseGrads { d_w, d_b }, d_input))
}
