//! Session builder.
//!
//! `SessionBuilder` is the recommended way to set up training. It records the
//! input shape, the hyperparameters and the layer list, validates the whole
//! architecture once, and then initializes parameters and optimizer state:
//!
//! - `LSTM`: Xavier/Glorot gate and projection weights
//! - `Relu`: He/Kaiming
//! - `Linear`: Xavier/Glorot
//!
//! All biases start at zero.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::InputShape;
use crate::layer::validate_architecture;
use crate::{
    Dataset, Error, LayerKind, LayerSpec, Optimizer, ParameterStore, Result, SequenceGrad,
    SessionConfig, TrainingSession,
};

#[derive(Debug, Clone, Default)]
/// Builder for a [`TrainingSession`].
///
/// Example:
///
/// ```rust
/// use rust_lstm_mlp::{Dataset, LayerKind, SessionBuilder};
///
/// # fn main() -> rust_lstm_mlp::Result<()> {
/// let xs = vec![vec![vec![0.0, 1.0]; 3]; 4];
/// let ys = vec![0.5; 4];
/// let data = Dataset::from_sequences(&xs, &ys)?;
///
/// let session = SessionBuilder::new()
///     .data(&data, 2)?
///     .hidden_units(8)?
///     .learning_rate(1e-3)?
///     .layers(&[LayerKind::Lstm, LayerKind::Relu, LayerKind::Linear], &[4, 4, 1])?
///     .build_with_seed(0)?;
/// assert_eq!(session.specs().len(), 3);
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    config: SessionConfig,
    input_shape: Option<InputShape>,
    specs: Vec<LayerSpec>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing config instead of the defaults.
    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Take the input shape from `data` and set the minibatch size.
    pub fn data(self, data: &Dataset, batch_size: usize) -> Result<Self> {
        self.input_shape(data.inputs().shape())?.batch_size(batch_size)
    }

    pub fn input_shape(mut self, shape: InputShape) -> Result<Self> {
        if shape.features == 0 {
            return Err(Error::InvalidConfig("input features must be > 0".to_owned()));
        }
        if shape.steps == Some(0) {
            return Err(Error::InvalidConfig("sequence length must be > 0".to_owned()));
        }
        self.input_shape = Some(shape);
        Ok(self)
    }

    pub fn batch_size(mut self, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        self.config.batch_size = batch_size;
        Ok(self)
    }

    /// LSTM state width, shared by every LSTM layer.
    pub fn hidden_units(mut self, hidden_units: usize) -> Result<Self> {
        if hidden_units == 0 {
            return Err(Error::InvalidConfig("hidden_units must be > 0".to_owned()));
        }
        self.config.hidden_units = hidden_units;
        Ok(self)
    }

    pub fn learning_rate(mut self, lr: f64) -> Result<Self> {
        if !(lr.is_finite() && lr > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be finite and > 0, got {lr}"
            )));
        }
        self.config.learning_rate = lr;
        Ok(self)
    }

    pub fn optimizer(mut self, optimizer: Optimizer) -> Result<Self> {
        optimizer.validate()?;
        self.config.optimizer = optimizer;
        Ok(self)
    }

    pub fn sequence_grad(mut self, mode: SequenceGrad) -> Self {
        self.config.sequence_grad = mode;
        self
    }

    /// Replace the layer list with `kinds` paired with `out_dims`.
    pub fn layers(mut self, kinds: &[LayerKind], out_dims: &[usize]) -> Result<Self> {
        self.specs = LayerSpec::zip(kinds, out_dims)?;
        Ok(self)
    }

    /// Append one layer.
    pub fn add_layer(mut self, kind: LayerKind, out_dim: usize) -> Result<Self> {
        if out_dim == 0 {
            return Err(Error::InvalidConfig("layer out_dim must be > 0".to_owned()));
        }
        self.specs.push(LayerSpec::new(kind, out_dim));
        Ok(self)
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed(self, seed: u64) -> Result<TrainingSession> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_with_rng(&mut rng)
    }

    /// Build using the provided RNG.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<TrainingSession> {
        let shape = self.input_shape.ok_or_else(|| {
            Error::InvalidConfig("input shape must be set before building".to_owned())
        })?;
        self.config.validate()?;
        validate_architecture(&self.specs, shape.is_sequence())?;

        let params =
            ParameterStore::initialize(&self.specs, shape.features, self.config.hidden_units, rng);
        TrainingSession::new(self.config, shape, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Inputs, Matrix, Tensor3};

    use LayerKind::{Linear, Lstm, Relu};

    fn sequence_shape() -> InputShape {
        InputShape::sequence(2, 3)
    }

    #[test]
    fn builds_lstm_mlp_stack() {
        let session = SessionBuilder::new()
            .input_shape(sequence_shape())
            .unwrap()
            .hidden_units(4)
            .unwrap()
            .layers(&[Lstm, Relu, Linear], &[5, 3, 1])
            .unwrap()
            .build_with_seed(0)
            .unwrap();

        assert_eq!(session.parameters().num_layers(), 3);
        assert_eq!(session.config().learning_rate, 3e-4);
        assert_eq!(session.optimizer_state().step_count(), 0);
    }

    #[test]
    fn missing_input_shape_is_config_error() {
        let err = SessionBuilder::new()
            .layers(&[Linear], &[1])
            .unwrap()
            .build_with_seed(0)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn invalid_graphs_are_rejected() {
        let cases: [(&[LayerKind], &[usize], InputShape); 4] = [
            (&[], &[], sequence_shape()),
            (&[Lstm, Lstm], &[3, 1], sequence_shape()),
            (&[Relu, Lstm, Linear], &[3, 3, 1], InputShape::rows(3)),
            (&[Lstm, Linear], &[3, 1], InputShape::rows(3)),
        ];
        for (kinds, dims, shape) in cases {
            let err = SessionBuilder::new()
                .input_shape(shape)
                .unwrap()
                .layers(kinds, dims)
                .unwrap()
                .build_with_seed(0)
                .unwrap_err();
            assert!(
                matches!(err, Error::InvalidLayerGraph(_)),
                "{kinds:?}: unexpected {err:?}"
            );
        }
    }

    #[test]
    fn mismatched_layer_lists_are_rejected() {
        assert!(SessionBuilder::new().layers(&[Lstm, Linear], &[3]).is_err());
        assert!(SessionBuilder::new().add_layer(Linear, 0).is_err());
        assert!(SessionBuilder::new().hidden_units(0).is_err());
        assert!(SessionBuilder::new().learning_rate(f64::NAN).is_err());
        assert!(SessionBuilder::new().batch_size(0).is_err());
    }

    #[test]
    fn dense_only_network_takes_rows() {
        let mut session = SessionBuilder::new()
            .input_shape(InputShape::rows(2))
            .unwrap()
            .add_layer(Relu, 4)
            .unwrap()
            .add_layer(Linear, 1)
            .unwrap()
            .build_with_seed(1)
            .unwrap();

        let pred = session
            .forward(&Inputs::Rows(Matrix::zeros(3, 2)))
            .unwrap();
        assert_eq!(pred.shape(), (3, 1));
        assert!(
            session
                .forward(&Inputs::Sequence(Tensor3::zeros(3, 2, 2)))
                .is_err()
        );
    }

    #[test]
    fn same_seed_same_parameters() {
        let build = |seed| {
            SessionBuilder::new()
                .input_shape(sequence_shape())
                .unwrap()
                .hidden_units(3)
                .unwrap()
                .layers(&[Lstm, Linear], &[2, 1])
                .unwrap()
                .build_with_seed(seed)
                .unwrap()
        };
        assert_eq!(build(7).parameters(), build(7).parameters());
        assert_ne!(build(7).parameters(), build(8).parameters());
    }
}
