//! Layer kinds and architecture validation.
//!
//! A network is an ordered list of [`LayerSpec`]s. The supported shape is a
//! contiguous block of LSTM layers followed by a contiguous block of dense layers,
//! and the final layer must be dense (it produces the `(batch, 1)` prediction).

use std::fmt;

use rand::Rng;
use rand::distributions::{Distribution, Uniform};

use crate::{Activation, Error, Matrix, Result};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Lstm,
    Relu,
    Linear,
}

impl LayerKind {
    #[inline]
    pub fn is_recurrent(self) -> bool {
        matches!(self, LayerKind::Lstm)
    }

    #[inline]
    pub fn is_dense(self) -> bool {
        !self.is_recurrent()
    }

    /// Output activation of a dense kind. `None` for LSTM.
    #[inline]
    pub fn dense_activation(self) -> Option<Activation> {
        match self {
            LayerKind::Lstm => None,
            LayerKind::Relu => Some(Activation::ReLU),
            LayerKind::Linear => Some(Activation::Identity),
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Lstm => f.write_str("LSTM"),
            LayerKind::Relu => f.write_str("Relu"),
            LayerKind::Linear => f.write_str("Linear"),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerSpec {
    pub kind: LayerKind,
    pub out_dim: usize,
}

impl LayerSpec {
    pub fn new(kind: LayerKind, out_dim: usize) -> Self {
        Self { kind, out_dim }
    }

    /// Zip parallel kind/dimension lists into specs.
    pub fn zip(kinds: &[LayerKind], out_dims: &[usize]) -> Result<Vec<LayerSpec>> {
        if kinds.len() != out_dims.len() {
            return Err(Error::InvalidConfig(format!(
                "layer kinds length {} does not match output dims length {}",
                kinds.len(),
                out_dims.len()
            )));
        }
        Ok(kinds
            .iter()
            .zip(out_dims)
            .map(|(&kind, &out_dim)| LayerSpec { kind, out_dim })
            .collect())
    }
}

/// Check the LSTM-prefix / dense-suffix shape of a network.
///
/// `sequence_input` is true when the network is fed `(batch, steps, features)`
/// tensors and false for `(batch, features)` matrices.
pub fn validate_architecture(specs: &[LayerSpec], sequence_input: bool) -> Result<()> {
    if specs.is_empty() {
        return Err(Error::InvalidLayerGraph("network must have at least one layer".to_owned()));
    }
    if let Some(i) = specs.iter().position(|s| s.out_dim == 0) {
        return Err(Error::InvalidLayerGraph(format!("layer {i} has out_dim 0")));
    }

    let first_dense = specs
        .iter()
        .position(|s| s.kind.is_dense())
        .ok_or_else(|| {
            Error::InvalidLayerGraph("the final layer must be Relu or Linear".to_owned())
        })?;
    if let Some(offset) = specs[first_dense..].iter().position(|s| s.kind.is_recurrent()) {
        return Err(Error::InvalidLayerGraph(format!(
            "LSTM layer {} follows dense layer {first_dense}; LSTM layers must form a prefix",
            first_dense + offset
        )));
    }

    if first_dense > 0 && !sequence_input {
        return Err(Error::InvalidLayerGraph(
            "LSTM layer 0 requires rank-3 (batch, steps, features) input, got a matrix".to_owned(),
        ));
    }
    if first_dense == 0 && sequence_input {
        return Err(Error::InvalidLayerGraph(
            "a network starting with a dense layer requires rank-2 input, got a sequence tensor"
                .to_owned(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Weight initialization scheme.
pub enum Init {
    /// Xavier/Glorot uniform.
    Xavier,
    /// He/Kaiming uniform.
    He,
}

impl Init {
    pub fn for_kind(kind: LayerKind) -> Init {
        match kind {
            LayerKind::Relu => Init::He,
            LayerKind::Lstm | LayerKind::Linear => Init::Xavier,
        }
    }

    /// A `(fan_in, fan_out)` weight matrix.
    pub fn weights<R: Rng + ?Sized>(self, fan_in: usize, fan_out: usize, rng: &mut R) -> Matrix {
        let limit = match self {
            Init::Xavier => (6.0 / (fan_in + fan_out) as f64).sqrt(),
            Init::He => (6.0 / fan_in as f64).sqrt(),
        };
        let dist = Uniform::new_inclusive(-limit, limit);
        let data = (0..fan_in * fan_out).map(|_| dist.sample(rng)).collect();
        Matrix::from_vec(fan_in, fan_out, data).expect("buffer sized from the same dims")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use LayerKind::{Linear, Lstm, Relu};

    fn specs(kinds: &[LayerKind]) -> Vec<LayerSpec> {
        kinds.iter().map(|&k| LayerSpec::new(k, 4)).collect()
    }

    #[test]
    fn accepts_lstm_prefix_dense_suffix() {
        assert!(validate_architecture(&specs(&[Lstm, Lstm, Relu, Linear]), true).is_ok());
        assert!(validate_architecture(&specs(&[Lstm, Linear]), true).is_ok());
        assert!(validate_architecture(&specs(&[Relu, Linear]), false).is_ok());
    }

    #[test]
    fn rejects_mixed_or_recurrent_tail() {
        let mixed = validate_architecture(&specs(&[Lstm, Relu, Lstm, Linear]), true);
        assert!(matches!(mixed, Err(Error::InvalidLayerGraph(_))));

        let tail = validate_architecture(&specs(&[Lstm, Lstm]), true);
        assert!(matches!(tail, Err(Error::InvalidLayerGraph(_))));
    }

    #[test]
    fn rejects_rank_mismatch_with_input() {
        let err = validate_architecture(&specs(&[Lstm, Linear]), false).unwrap_err();
        assert!(format!("{err}").contains("rank-3"));
        assert!(validate_architecture(&specs(&[Linear]), true).is_err());
    }

    #[test]
    fn zip_requires_equal_lengths() {
        assert!(LayerSpec::zip(&[Lstm, Linear], &[4]).is_err());
        let zipped = LayerSpec::zip(&[Lstm, Linear], &[4, 1]).unwrap();
        assert_eq!(zipped[1], LayerSpec::new(Linear, 1));
    }

    #[test]
    fn init_respects_limits() {
        let mut rng = StdRng::seed_from_u64(0);
        let w = Init::Xavier.weights(3, 5, &mut rng);
        let limit = (6.0_f64 / 8.0).sqrt();
        assert_eq!(w.shape(), (3, 5));
        assert!(w.as_slice().iter().all(|v| v.abs() <= limit));
    }
}
