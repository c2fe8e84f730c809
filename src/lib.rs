//! A stacked LSTM encoder with an MLP head, trained for sequence regression.
//!
//! `rust-lstm-mlp` is a small from-scratch implementation of a sequence-to-scalar
//! regressor. A network is a prefix of LSTM layers followed by a suffix of dense
//! layers (`Relu` or `Linear`), trained with mean squared error and minibatch Adam.
//!
//! # Training lifecycle
//!
//! A [`TrainingSession`] owns every piece of mutable state (parameters, per-layer
//! caches, gradients, optimizer moments and the running loss). One step is:
//!
//! 1. [`TrainingSession::forward`]
//! 2. [`TrainingSession::compute_loss`]
//! 3. [`TrainingSession::backward`]
//! 4. [`TrainingSession::optimize_step`]
//!
//! [`TrainingSession::fit`] drives that loop over shuffled minibatches.
//!
//! # Data layout and shapes
//!
//! - Scalars are `f64`.
//! - Sequences are [`Tensor3`] `(batch, steps, features)`; dense activations are
//!   [`Matrix`] `(batch, features)`. Both are contiguous and row-major.
//! - Weights are `(fan_in, fan_out)`, so a dense layer computes `X·W + b`.
//! - Every LSTM layer shares the same hidden width and projects its hidden state
//!   to `out_dim` features per step. The first dense layer after the LSTM stack
//!   reads the final timestep only.
//! - Targets are a single `(batch, 1)` column.
//!
//! # Quick start
//!
//! ```rust
//! use rust_lstm_mlp::{Dataset, FitConfig, LayerKind, SessionBuilder};
//!
//! # fn main() -> rust_lstm_mlp::Result<()> {
//! // Four sequences of two steps with three features each.
//! let xs: Vec<Vec<Vec<f64>>> = (0..4)
//!     .map(|i| vec![vec![i as f64 * 0.1; 3]; 2])
//!     .collect();
//! let ys = vec![0.0, 0.1, 0.2, 0.3];
//! let train = Dataset::from_sequences(&xs, &ys)?;
//!
//! let mut session = SessionBuilder::new()
//!     .data(&train, 2)?
//!     .hidden_units(4)?
//!     .learning_rate(1e-2)?
//!     .layers(&[LayerKind::Lstm, LayerKind::Relu, LayerKind::Linear], &[4, 4, 1])?
//!     .build_with_seed(0)?;
//!
//! let report = session.fit(&train, FitConfig { epochs: 5, seed: 0 })?;
//! assert_eq!(report.epoch_losses.len(), 5);
//! # Ok(())
//! # }
//! ```
//!
//! # Driving the steps yourself
//!
//! ```rust
//! use rust_lstm_mlp::{Dataset, LayerKind, SessionBuilder};
//!
//! # fn main() -> rust_lstm_mlp::Result<()> {
//! let xs = vec![vec![vec![0.5, -0.5]; 3]; 6];
//! let ys = vec![1.0; 6];
//! let data = Dataset::from_sequences(&xs, &ys)?;
//!
//! let mut session = SessionBuilder::new()
//!     .data(&data, 3)?
//!     .hidden_units(5)?
//!     .layers(&[LayerKind::Lstm, LayerKind::Linear], &[2, 1])?
//!     .build_with_seed(0)?;
//!
//! for batch in data.minibatches(3, 42)? {
//!     session.forward(batch.inputs())?;
//!     session.compute_loss(batch.targets())?;
//!     session.backward()?;
//!     session.optimize_step()?;
//! }
//! assert_eq!(session.optimizer_state().step_count(), 2);
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod bridge;
pub mod builder;
pub mod data;
pub mod dense;
pub mod error;
pub mod layer;
pub mod loss;
pub mod lstm;
pub(crate) mod matmul;
pub mod optim;
pub mod params;
pub mod session;
pub mod tensor;
pub mod train;

#[cfg(feature = "serde")]
pub mod serde_model;

pub use activation::Activation;
pub use builder::SessionBuilder;
pub use data::{Dataset, InputShape, Inputs, Minibatch, generate_minibatches};
pub use error::{Error, Result};
pub use layer::{Init, LayerKind, LayerSpec};
pub use optim::{Optimizer, OptimizerState};
pub use params::{LayerCache, LayerGrads, LayerParams, ParameterStore};
pub use session::{SequenceGrad, SessionConfig, TrainingSession};
pub use tensor::{Matrix, Tensor3};
pub use train::{FitConfig, FitReport};
