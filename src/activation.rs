//! Activation functions.
//!
//! A dense layer computes a pre-activation value `z = x W + b` and then applies an
//! activation function element-wise: `y = activation(z)`. LSTM gates use the
//! same functions (sigmoid for forget/input/output gates, tanh for the candidate).
//!
//! Caches keep the *post-activation* outputs `y`. During backprop we compute
//! `dL/dz` from `dL/dy` using `y`, so no separate `z` buffer is needed for the
//! derivative.

use crate::Matrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Element-wise activation function.
pub enum Activation {
    Tanh,
    ReLU,
    Sigmoid,
    Identity,
}

impl Activation {
    #[inline]
    pub fn forward(self, x: f64) -> f64 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::ReLU => x.max(0.0),
            Activation::Sigmoid => sigmoid(x),
            Activation::Identity => x,
        }
    }

    /// Derivative of the activation with respect to its input, expressed in terms
    /// of the cached post-activation output `y`.
    #[inline]
    pub fn grad_from_output(self, y: f64) -> f64 {
        match self {
            Activation::Tanh => 1.0 - y * y,
            Activation::ReLU => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Sigmoid => y * (1.0 - y),
            Activation::Identity => 1.0,
        }
    }

    pub fn apply(self, z: &Matrix) -> Matrix {
        z.map(|v| self.forward(v))
    }

    /// `dL/dz = dL/dy * f'(z)` using the cached outputs `y`.
    pub fn backprop(self, y: &Matrix, d_y: &Matrix) -> Matrix {
        y.zip_map(d_y, |y, d| d * self.grad_from_output(y))
    }
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    // Numerically stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}
