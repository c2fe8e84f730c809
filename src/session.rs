//! The training session: owns parameters, caches, gradients and optimizer state,
//! and sequences the layers for every step.
//!
//! One training step on a minibatch is strictly:
//!
//! 1. [`TrainingSession::forward`] fills the per-layer caches and the prediction
//! 2. [`TrainingSession::compute_loss`] records the targets and accumulates the loss
//! 3. [`TrainingSession::backward`] rebuilds the gradient store from the caches
//! 4. [`TrainingSession::optimize_step`] applies the optimizer to every parameter
//!
//! Calling these out of order returns [`Error::InvalidState`].

use crate::bridge::{broadcast_to_sequence, collapse_to_last_step, scatter_to_last_step};
use crate::data::InputShape;
use crate::params::found_kind;
use crate::{
    Error, Inputs, LayerCache, LayerGrads, LayerKind, LayerParams, LayerSpec, Matrix, Optimizer,
    OptimizerState, ParameterStore, Result, dense, loss, lstm,
};

/// How a dense-layer gradient re-enters the LSTM layer feeding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceGrad {
    /// Replicate the gradient across every timestep.
    #[default]
    Broadcast,
    /// Put the gradient on the final timestep only (the exact adjoint of taking
    /// the last step).
    LastStep,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    /// LSTM state width shared by every LSTM layer.
    pub hidden_units: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub optimizer: Optimizer,
    pub sequence_grad: SequenceGrad,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hidden_units: 64,
            learning_rate: 3e-4,
            batch_size: 32,
            optimizer: Optimizer::default(),
            sequence_grad: SequenceGrad::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.hidden_units == 0 {
            return Err(Error::InvalidConfig("hidden_units must be > 0".to_owned()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be finite and > 0, got {}",
                self.learning_rate
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        self.optimizer.validate()
    }
}

/// Single owner of all mutable training state for one network.
#[derive(Debug, Clone)]
pub struct TrainingSession {
    config: SessionConfig,
    input_shape: InputShape,
    params: ParameterStore,
    caches: Vec<LayerCache>,
    prediction: Option<Matrix>,
    targets: Option<Matrix>,
    grads: Option<Vec<LayerGrads>>,
    /// Set by `backward`, cleared once `optimize_step` has applied the gradients.
    grads_pending: bool,
    optimizer: OptimizerState,
    accumulated_loss: f64,
    examples_seen: usize,
}

impl TrainingSession {
    /// Wrap an initialized parameter store. Prefer [`crate::SessionBuilder`].
    pub fn new(
        config: SessionConfig,
        input_shape: InputShape,
        params: ParameterStore,
    ) -> Result<Self> {
        config.validate()?;
        crate::layer::validate_architecture(params.specs(), input_shape.is_sequence())?;
        let optimizer = config.optimizer.state(&params)?;

        log::info!(
            "session ready: {} layers, {} parameters, optimizer {:?}",
            params.num_layers(),
            params.num_parameters(),
            config.optimizer
        );

        Ok(Self {
            config,
            input_shape,
            params,
            caches: Vec::new(),
            prediction: None,
            targets: None,
            grads: None,
            grads_pending: false,
            optimizer,
            accumulated_loss: 0.0,
            examples_seen: 0,
        })
    }

    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[inline]
    pub fn input_shape(&self) -> InputShape {
        self.input_shape
    }

    #[inline]
    pub fn specs(&self) -> &[LayerSpec] {
        self.params.specs()
    }

    #[inline]
    pub fn parameters(&self) -> &ParameterStore {
        &self.params
    }

    #[inline]
    pub fn parameters_mut(&mut self) -> &mut ParameterStore {
        &mut self.params
    }

    /// Swap in a parameter store with the same layout and reset the optimizer.
    pub fn replace_parameters(&mut self, params: ParameterStore) -> Result<()> {
        if !self.params.same_layout(&params) {
            return Err(Error::ShapeMismatch(
                "replacement parameters do not match the session's layer layout".to_owned(),
            ));
        }
        self.params = params;
        self.init_optimizer()
    }

    /// (Re)allocate zeroed optimizer state and reset the step counter.
    pub fn init_optimizer(&mut self) -> Result<()> {
        self.optimizer = self.config.optimizer.state(&self.params)?;
        log::debug!("optimizer state reset: {:?}", self.config.optimizer);
        Ok(())
    }

    #[inline]
    pub fn optimizer_state(&self) -> &OptimizerState {
        &self.optimizer
    }

    /// Prediction of the most recent [`TrainingSession::forward`].
    #[inline]
    pub fn prediction(&self) -> Option<&Matrix> {
        self.prediction.as_ref()
    }

    /// Caches of the most recent forward pass, one per layer.
    #[inline]
    pub fn caches(&self) -> &[LayerCache] {
        &self.caches
    }

    /// Gradients of the most recent [`TrainingSession::backward`].
    #[inline]
    pub fn gradients(&self) -> Option<&[LayerGrads]> {
        self.grads.as_deref()
    }

    /// Forward pass on one batch. Overwrites the caches and the prediction.
    pub fn forward(&mut self, input: &Inputs) -> Result<&Matrix> {
        let (prediction, caches) = self.run_forward(input)?;
        self.caches = caches;
        self.targets = None;
        self.grads = None;
        self.grads_pending = false;
        Ok(&*self.prediction.insert(prediction))
    }

    /// Forward pass that leaves the session state untouched.
    pub fn predict(&self, input: &Inputs) -> Result<Matrix> {
        self.run_forward(input).map(|(prediction, _)| prediction)
    }

    fn check_input(&self, input: &Inputs) -> Result<()> {
        let shape = self.input_shape;
        if input.is_sequence() != shape.is_sequence() {
            return Err(Error::ShapeMismatch(format!(
                "network expects {} input, got {}",
                shape.rank_name(),
                input.shape().rank_name()
            )));
        }
        if input.features() != shape.features {
            return Err(Error::ShapeMismatch(format!(
                "input has {} features, network expects {}",
                input.features(),
                shape.features
            )));
        }
        if input.is_empty() {
            return Err(Error::InvalidData("input batch must not be empty".to_owned()));
        }
        Ok(())
    }

    fn run_forward(&self, input: &Inputs) -> Result<(Matrix, Vec<LayerCache>)> {
        self.check_input(input)?;

        let batch = input.len();
        let mut caches = Vec::with_capacity(self.params.num_layers());
        let mut current = input.clone();

        for (idx, (spec, params)) in self.params.specs().iter().zip(self.params.layers()).enumerate()
        {
            match (spec.kind, params) {
                (LayerKind::Lstm, LayerParams::Lstm(p)) => {
                    let Inputs::Sequence(x) = &current else {
                        return Err(Error::InvalidLayerGraph(format!(
                            "LSTM layer {idx} received a matrix; LSTM layers must form a prefix"
                        )));
                    };
                    let a0 = Matrix::zeros(batch, p.hidden());
                    let (y, cache) = lstm::forward(p, x, &a0)?;
                    caches.push(LayerCache::Lstm(cache));
                    current = Inputs::Sequence(y);
                }
                (kind @ (LayerKind::Relu | LayerKind::Linear), LayerParams::Dense(p)) => {
                    let activation = kind
                        .dense_activation()
                        .expect("dense kinds always carry an activation");
                    let (x, after_recurrent) = match &current {
                        Inputs::Sequence(seq) => (collapse_to_last_step(seq)?, true),
                        Inputs::Rows(m) => (m.clone(), false),
                    };
                    let (a, cache) = dense::forward(p, &x, activation, after_recurrent)?;
                    caches.push(LayerCache::Dense(cache));
                    current = Inputs::Rows(a);
                }
                (expected, params) => {
                    return Err(Error::CacheIndexMismatch {
                        layer: idx,
                        expected,
                        found: found_kind(expected, matches!(params, LayerParams::Lstm(_))),
                    });
                }
            }
        }

        match current {
            Inputs::Rows(prediction) => Ok((prediction, caches)),
            Inputs::Sequence(_) => Err(Error::InvalidLayerGraph(
                "the final layer must be dense".to_owned(),
            )),
        }
    }

    /// Mean squared error of the current prediction against `targets`.
    ///
    /// A `(1, batch)` target row, with `batch` the number of predicted examples,
    /// is turned into a `(batch, 1)` column. The batch loss is added to the
    /// running total (weighted by batch size) and the targets are kept for
    /// [`TrainingSession::backward`].
    pub fn compute_loss(&mut self, targets: &Matrix) -> Result<f64> {
        let prediction = self.prediction.as_ref().ok_or_else(|| {
            Error::InvalidState("compute_loss called before forward".to_owned())
        })?;
        let n = prediction.rows();
        let targets = loss::to_column(targets, n);

        let batch_loss = loss::mse(prediction.as_slice(), targets.as_slice())?;
        if prediction.shape() != targets.shape() {
            return Err(Error::ShapeMismatch(format!(
                "prediction shape {:?} does not match target shape {:?}",
                prediction.shape(),
                targets.shape()
            )));
        }

        self.accumulated_loss += batch_loss * n as f64;
        self.examples_seen += n;
        self.targets = Some(targets);

        log::trace!("batch loss {batch_loss:.6} over {n} examples");
        Ok(batch_loss)
    }

    /// Mean per-example loss since the last [`TrainingSession::reset_loss`].
    pub fn average_loss(&self) -> f64 {
        if self.examples_seen == 0 {
            return 0.0;
        }
        self.accumulated_loss / self.examples_seen as f64
    }

    /// Examples counted by [`TrainingSession::average_loss`].
    #[inline]
    pub fn examples_seen(&self) -> usize {
        self.examples_seen
    }

    pub fn reset_loss(&mut self) {
        self.accumulated_loss = 0.0;
        self.examples_seen = 0;
    }

    /// Backward pass for the batch of the latest forward/compute_loss pair.
    ///
    /// The output gradient is seeded from the MSE residual and then every layer,
    /// the output layer included, runs its own backward rule from last to first.
    pub fn backward(&mut self) -> Result<()> {
        let targets = self.targets.as_ref().ok_or_else(|| {
            Error::InvalidState("backward requires compute_loss after forward".to_owned())
        })?;
        let prediction = self
            .prediction
            .as_ref()
            .ok_or_else(|| Error::InvalidState("backward called before forward".to_owned()))?;
        let num_layers = self.params.num_layers();
        if self.caches.len() != num_layers {
            return Err(Error::InvalidState(format!(
                "{} cache entries for {num_layers} layers",
                self.caches.len()
            )));
        }

        let mut upstream = Inputs::Rows(loss::mse_backward(prediction, targets)?);
        let mut grads: Vec<Option<LayerGrads>> = vec![None; num_layers];

        for idx in (0..num_layers).rev() {
            let spec = self.params.specs()[idx];
            let params = &self.params.layers()[idx];
            let cache = &self.caches[idx];

            match (params, cache) {
                (LayerParams::Dense(p), LayerCache::Dense(c)) if spec.kind.is_dense() => {
                    let Inputs::Rows(d_out) = &upstream else {
                        return Err(Error::InvalidLayerGraph(format!(
                            "dense layer {idx} received a sequence gradient"
                        )));
                    };
                    let (g, d_in) = dense::backward(p, c, d_out)?;
                    grads[idx] = Some(LayerGrads::Dense(g));
                    upstream = Inputs::Rows(d_in);
                }
                (LayerParams::Lstm(p), LayerCache::Lstm(c)) if spec.kind.is_recurrent() => {
                    let d_out = match upstream {
                        Inputs::Sequence(seq) => seq,
                        Inputs::Rows(m) => {
                            self.check_bridge_source(idx)?;
                            let steps = c.input.steps();
                            match self.config.sequence_grad {
                                SequenceGrad::Broadcast => broadcast_to_sequence(&m, steps),
                                SequenceGrad::LastStep => scatter_to_last_step(&m, steps),
                            }
                        }
                    };
                    let (g, d_in) = lstm::backward(p, c, &d_out)?;
                    grads[idx] = Some(LayerGrads::Lstm(g));
                    upstream = Inputs::Sequence(d_in);
                }
                (_, cache) => {
                    return Err(Error::CacheIndexMismatch {
                        layer: idx,
                        expected: spec.kind,
                        found: found_kind(spec.kind, cache.is_recurrent()),
                    });
                }
            }
        }

        let grads = grads
            .into_iter()
            .enumerate()
            .map(|(idx, g)| {
                g.ok_or_else(|| Error::InvalidState(format!("no gradient produced for layer {idx}")))
            })
            .collect::<Result<Vec<_>>>()?;
        self.grads = Some(grads);
        self.grads_pending = true;
        Ok(())
    }

    /// A matrix gradient may only enter LSTM layer `idx` from a dense layer that
    /// consumed that LSTM's collapsed output.
    fn check_bridge_source(&self, idx: usize) -> Result<()> {
        match self.caches.get(idx + 1) {
            Some(LayerCache::Dense(next)) if next.after_recurrent => Ok(()),
            Some(next) => Err(Error::CacheIndexMismatch {
                layer: idx + 1,
                expected: LayerKind::Linear,
                found: found_kind(LayerKind::Linear, next.is_recurrent()),
            }),
            None => Err(Error::InvalidLayerGraph(format!(
                "LSTM layer {idx} is the output layer"
            ))),
        }
    }

    /// Apply one optimizer step with the gradients of the latest backward pass.
    ///
    /// Each backward pass feeds exactly one step; the gradients stay readable
    /// through [`TrainingSession::gradients`] until the next forward pass.
    pub fn optimize_step(&mut self) -> Result<()> {
        let grads = match self.grads.as_deref() {
            Some(grads) if self.grads_pending => grads,
            Some(_) => {
                return Err(Error::InvalidState(
                    "gradients were already applied; run backward again first".to_owned(),
                ));
            }
            None => {
                return Err(Error::InvalidState(
                    "optimize_step called before backward".to_owned(),
                ));
            }
        };
        self.optimizer
            .step(&mut self.params, grads, self.config.learning_rate)?;
        self.grads_pending = false;
        Ok(())
    }

    /// One full step on a batch: forward, loss, backward, optimize.
    ///
    /// Returns the batch loss measured before the update.
    pub fn train_batch(&mut self, inputs: &Inputs, targets: &Matrix) -> Result<f64> {
        self.forward(inputs)?;
        let batch_loss = self.compute_loss(targets)?;
        self.backward()?;
        self.optimize_step()?;
        Ok(batch_loss)
    }
}
