//! Per-layer parameter, gradient and cache records.
//!
//! Every store is a `Vec` addressed by the 0-based layer position. Each entry is a
//! small sum type tagged by the layer kind, so a lookup can check that the record
//! at position `i` matches `specs[i].kind` instead of trusting string keys.

use rand::Rng;

use crate::dense::{DenseCache, DenseGrads, DenseParams};
use crate::layer::Init;
use crate::lstm::{LSTM_PARAM_NAMES, LstmCache, LstmGrads, LstmParams};
use crate::{Error, LayerKind, LayerSpec, Matrix, Result};

const DENSE_PARAM_NAMES: [&str; 2] = ["w", "b"];

#[derive(Debug, Clone, PartialEq)]
pub enum LayerParams {
    Lstm(LstmParams),
    Dense(DenseParams),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerGrads {
    Lstm(LstmGrads),
    Dense(DenseGrads),
}

#[derive(Debug, Clone)]
pub enum LayerCache {
    Lstm(LstmCache),
    Dense(DenseCache),
}

impl LayerParams {
    /// Parameter names in [`LayerParams::tensors`] order.
    pub fn names(&self) -> &'static [&'static str] {
        match self {
            LayerParams::Lstm(_) => &LSTM_PARAM_NAMES,
            LayerParams::Dense(_) => &DENSE_PARAM_NAMES,
        }
    }

    pub fn tensors(&self) -> Vec<&Matrix> {
        match self {
            LayerParams::Lstm(p) => p.tensors().to_vec(),
            LayerParams::Dense(p) => p.tensors().to_vec(),
        }
    }

    pub fn tensors_mut(&mut self) -> Vec<&mut Matrix> {
        match self {
            LayerParams::Lstm(p) => p.tensors_mut().into_iter().collect(),
            LayerParams::Dense(p) => p.tensors_mut().into_iter().collect(),
        }
    }

    /// Output width of the layer.
    pub fn out_dim(&self) -> usize {
        match self {
            LayerParams::Lstm(p) => p.out_dim(),
            LayerParams::Dense(p) => p.out_dim(),
        }
    }

    fn is_recurrent(&self) -> bool {
        matches!(self, LayerParams::Lstm(_))
    }
}

impl LayerGrads {
    /// Parameter gradients in the same order as [`LayerParams::tensors`].
    pub fn tensors(&self) -> Vec<&Matrix> {
        match self {
            LayerGrads::Lstm(g) => g.tensors().to_vec(),
            LayerGrads::Dense(g) => g.tensors().to_vec(),
        }
    }

    pub fn is_recurrent(&self) -> bool {
        matches!(self, LayerGrads::Lstm(_))
    }
}

impl LayerCache {
    pub fn is_recurrent(&self) -> bool {
        matches!(self, LayerCache::Lstm(_))
    }
}

/// Kind tag for mismatch errors: `expected` if it agrees on recurrence, else a
/// representative of the other family.
pub(crate) fn found_kind(expected: LayerKind, recurrent: bool) -> LayerKind {
    match (expected.is_recurrent(), recurrent) {
        (true, true) | (false, false) => expected,
        (_, true) => LayerKind::Lstm,
        (_, false) => LayerKind::Linear,
    }
}

/// All trainable parameters of a network, one record per layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterStore {
    specs: Vec<LayerSpec>,
    layers: Vec<LayerParams>,
}

impl ParameterStore {
    /// Initialize parameters for `specs`.
    ///
    /// `input_features` is the per-step (or per-row) feature count of the raw
    /// input and `hidden_units` the LSTM state width. The architecture must have
    /// been validated already.
    pub fn initialize<R: Rng + ?Sized>(
        specs: &[LayerSpec],
        input_features: usize,
        hidden_units: usize,
        rng: &mut R,
    ) -> Self {
        let mut layers = Vec::with_capacity(specs.len());
        let mut in_dim = input_features;
        for (idx, spec) in specs.iter().enumerate() {
            let params = match spec.kind {
                LayerKind::Lstm => LayerParams::Lstm(LstmParams::new_with_rng(
                    in_dim,
                    hidden_units,
                    spec.out_dim,
                    rng,
                )),
                LayerKind::Relu | LayerKind::Linear => LayerParams::Dense(
                    DenseParams::new_with_rng(in_dim, spec.out_dim, Init::for_kind(spec.kind), rng),
                ),
            };
            log::debug!(
                "layer {idx}: {} in_dim={in_dim} out_dim={}",
                spec.kind,
                spec.out_dim
            );
            layers.push(params);
            in_dim = spec.out_dim;
        }
        Self {
            specs: specs.to_vec(),
            layers,
        }
    }

    /// Assemble a store from existing records, checking that kinds and widths
    /// chain correctly.
    pub fn from_layers(specs: Vec<LayerSpec>, layers: Vec<LayerParams>) -> Result<Self> {
        if specs.len() != layers.len() {
            return Err(Error::InvalidData(format!(
                "{} layer specs but {} parameter records",
                specs.len(),
                layers.len()
            )));
        }
        for (idx, (spec, params)) in specs.iter().zip(&layers).enumerate() {
            if spec.kind.is_recurrent() != params.is_recurrent() {
                return Err(Error::CacheIndexMismatch {
                    layer: idx,
                    expected: spec.kind,
                    found: found_kind(spec.kind, params.is_recurrent()),
                });
            }
            if spec.out_dim != params.out_dim() {
                return Err(Error::ShapeMismatch(format!(
                    "layer {idx} spec out_dim {} does not match parameters out_dim {}",
                    spec.out_dim,
                    params.out_dim()
                )));
            }
            if idx > 0 {
                let prev_out = layers[idx - 1].out_dim();
                let in_dim = match params {
                    LayerParams::Lstm(p) => p.in_dim(),
                    LayerParams::Dense(p) => p.in_dim(),
                };
                if in_dim != prev_out {
                    return Err(Error::ShapeMismatch(format!(
                        "layer {idx} in_dim {in_dim} does not match previous out_dim {prev_out}"
                    )));
                }
            }
        }
        Ok(Self { specs, layers })
    }

    #[inline]
    pub fn specs(&self) -> &[LayerSpec] {
        &self.specs
    }

    #[inline]
    pub fn layers(&self) -> &[LayerParams] {
        &self.layers
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layer(&self, idx: usize) -> Option<&LayerParams> {
        self.layers.get(idx)
    }

    #[inline]
    pub fn layer_mut(&mut self, idx: usize) -> Option<&mut LayerParams> {
        self.layers.get_mut(idx)
    }

    /// Whether `other` has the same layer kinds and parameter shapes.
    pub fn same_layout(&self, other: &ParameterStore) -> bool {
        self.specs == other.specs
            && self.layers.iter().zip(&other.layers).all(|(a, b)| {
                a.names() == b.names()
                    && a.tensors()
                        .iter()
                        .zip(b.tensors())
                        .all(|(x, y)| x.shape() == y.shape())
            })
    }

    /// Total number of scalar parameters.
    pub fn num_parameters(&self) -> usize {
        self.layers
            .iter()
            .flat_map(|l| l.tensors())
            .map(|m| m.len())
            .sum()
    }
}
