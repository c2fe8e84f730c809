//! Optimizers.
//!
//! This module provides the parameter update step that runs after every backward
//! pass, given the per-layer [`LayerGrads`].
//!
//! Design notes:
//! - Optimizer *state* (Adam moments, step counter) lives outside the parameters.
//! - The session owns the optimizer state and reuses it across steps.
//! - Every named parameter of every layer is updated independently and identically:
//!   ten groups per LSTM layer, two per dense layer.

use crate::params::found_kind;
use crate::{Error, LayerGrads, Matrix, ParameterStore, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
/// Optimizer choice for training.
pub enum Optimizer {
    /// Plain SGD.
    Sgd,
    /// Adam (bias-corrected).
    Adam { beta1: f64, beta2: f64, eps: f64 },
}

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer::Adam {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

impl Optimizer {
    /// Validate optimizer hyperparameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Optimizer::Sgd => Ok(()),
            Optimizer::Adam { beta1, beta2, eps } => {
                if !(beta1.is_finite() && (0.0..1.0).contains(&beta1)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta1 must be finite and in [0,1), got {beta1}"
                    )));
                }
                if !(beta2.is_finite() && (0.0..1.0).contains(&beta2)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta2 must be finite and in [0,1), got {beta2}"
                    )));
                }
                if !(eps.is_finite() && eps > 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "adam eps must be finite and > 0, got {eps}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Allocate zeroed optimizer state for `params` with the step counter at 0.
    pub fn state(self, params: &ParameterStore) -> Result<OptimizerState> {
        self.validate()?;

        match self {
            Optimizer::Sgd => Ok(OptimizerState::Sgd { t: 0 }),
            Optimizer::Adam { beta1, beta2, eps } => Ok(OptimizerState::Adam {
                beta1,
                beta2,
                eps,
                t: 0,
                beta1_pow: 1.0,
                beta2_pow: 1.0,
                moments: zeros_like_params(params),
            }),
        }
    }
}

/// First ("v") and second ("s") moment accumulators for one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Moments {
    pub v: Matrix,
    pub s: Matrix,
}

#[derive(Debug, Clone)]
/// Owned optimizer state.
pub enum OptimizerState {
    /// Plain SGD (step counter only).
    Sgd { t: u64 },
    /// Adam state, `moments[layer][param]` in [`crate::LayerParams::tensors`] order.
    Adam {
        beta1: f64,
        beta2: f64,
        eps: f64,
        t: u64,
        beta1_pow: f64,
        beta2_pow: f64,
        moments: Vec<Vec<Moments>>,
    },
}

impl OptimizerState {
    /// Number of completed steps.
    pub fn step_count(&self) -> u64 {
        match self {
            OptimizerState::Sgd { t } | OptimizerState::Adam { t, .. } => *t,
        }
    }

    /// Adam bias-correction denominators `(1 - beta1^t, 1 - beta2^t)` for the
    /// current step count. `None` for SGD.
    pub fn bias_corrections(&self) -> Option<(f64, f64)> {
        match self {
            OptimizerState::Sgd { .. } => None,
            OptimizerState::Adam {
                beta1_pow,
                beta2_pow,
                ..
            } => Some((1.0 - beta1_pow, 1.0 - beta2_pow)),
        }
    }

    /// Adam moments of layer `idx`.
    pub fn moments(&self, idx: usize) -> Option<&[Moments]> {
        match self {
            OptimizerState::Sgd { .. } => None,
            OptimizerState::Adam { moments, .. } => moments.get(idx).map(Vec::as_slice),
        }
    }

    /// Apply one optimizer step.
    ///
    /// The step counter is incremented first, so the first update uses `t = 1` in
    /// the bias correction.
    pub fn step(
        &mut self,
        params: &mut ParameterStore,
        grads: &[LayerGrads],
        lr: f64,
    ) -> Result<()> {
        if !(lr.is_finite() && lr > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be finite and > 0, got {lr}"
            )));
        }
        if grads.len() != params.num_layers() {
            return Err(Error::InvalidState(format!(
                "{} gradient records for {} layers",
                grads.len(),
                params.num_layers()
            )));
        }
        check_layout(params, grads)?;

        match self {
            OptimizerState::Sgd { t } => {
                *t += 1;
                for (idx, layer_grads) in grads.iter().enumerate() {
                    let layer = params
                        .layer_mut(idx)
                        .expect("layer count checked against grads");
                    for (p, g) in layer.tensors_mut().into_iter().zip(layer_grads.tensors()) {
                        for (w, &d) in p.as_mut_slice().iter_mut().zip(g.as_slice()) {
                            *w -= lr * d;
                        }
                    }
                }
            }
            OptimizerState::Adam {
                beta1,
                beta2,
                eps,
                t,
                beta1_pow,
                beta2_pow,
                moments,
            } => {
                *t += 1;
                *beta1_pow *= *beta1;
                *beta2_pow *= *beta2;

                let one_minus_beta1 = 1.0 - *beta1;
                let one_minus_beta2 = 1.0 - *beta2;
                let corr1 = 1.0 - *beta1_pow;
                let corr2 = 1.0 - *beta2_pow;

                for (idx, layer_grads) in grads.iter().enumerate() {
                    let layer = params
                        .layer_mut(idx)
                        .expect("layer count checked against grads");
                    let tensors = layer.tensors_mut().into_iter().zip(layer_grads.tensors());
                    for ((p, g), m) in tensors.zip(moments[idx].iter_mut()) {
                        let p = p.as_mut_slice();
                        let g = g.as_slice();
                        let v = m.v.as_mut_slice();
                        let s = m.s.as_mut_slice();

                        for i in 0..p.len() {
                            v[i] = (*beta1) * v[i] + one_minus_beta1 * g[i];
                            s[i] = (*beta2) * s[i] + one_minus_beta2 * (g[i] * g[i]);

                            let v_hat = v[i] / corr1;
                            let s_hat = s[i] / corr2;
                            p[i] -= lr * v_hat / (s_hat.sqrt() + *eps);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Gradients must mirror the parameter store exactly: same kinds, same shapes.
fn check_layout(params: &ParameterStore, grads: &[LayerGrads]) -> Result<()> {
    for (idx, (spec, (layer, layer_grads))) in params
        .specs()
        .iter()
        .zip(params.layers().iter().zip(grads))
        .enumerate()
    {
        if spec.kind.is_recurrent() != layer_grads.is_recurrent() {
            return Err(Error::CacheIndexMismatch {
                layer: idx,
                expected: spec.kind,
                found: found_kind(spec.kind, layer_grads.is_recurrent()),
            });
        }
        for (name, (p, g)) in layer
            .names()
            .iter()
            .zip(layer.tensors().into_iter().zip(layer_grads.tensors()))
        {
            if p.shape() != g.shape() {
                return Err(Error::ShapeMismatch(format!(
                    "layer {idx} {name}: gradient shape {:?} does not match parameter shape {:?}",
                    g.shape(),
                    p.shape()
                )));
            }
        }
    }
    Ok(())
}

fn zeros_like_params(params: &ParameterStore) -> Vec<Vec<Moments>> {
    params
        .layers()
        .iter()
        .map(|layer| {
            layer
                .tensors()
                .into_iter()
                .map(|p| Moments {
                    v: Matrix::zeros(p.rows(), p.cols()),
                    s: Matrix::zeros(p.rows(), p.cols()),
                })
                .collect()
        })
        .collect()
}
