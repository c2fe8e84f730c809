use crate::{Dataset, Error, Result, TrainingSession, loss};

#[derive(Debug, Clone, Copy)]
pub struct FitConfig {
    pub epochs: usize,
    /// Base seed; epoch `e` shuffles with `seed + e + 1`.
    pub seed: u64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FitReport {
    /// Average per-example loss of each epoch, measured before each update.
    pub epoch_losses: Vec<f64>,
    pub final_loss: f64,
}

impl TrainingSession {
    /// Train on `train` for `cfg.epochs` epochs of shuffled minibatches.
    ///
    /// The running loss is reset at the start of every epoch.
    pub fn fit(&mut self, train: &Dataset, cfg: FitConfig) -> Result<FitReport> {
        if train.is_empty() {
            return Err(Error::InvalidData("train dataset must not be empty".to_owned()));
        }
        if train.inputs().shape() != self.input_shape() {
            return Err(Error::InvalidData(format!(
                "train input shape {:?} does not match session input shape {:?}",
                train.inputs().shape(),
                self.input_shape()
            )));
        }
        if cfg.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be > 0".to_owned()));
        }

        let batch_size = self.config().batch_size;
        let mut epoch_losses = Vec::with_capacity(cfg.epochs);

        for epoch in 0..cfg.epochs {
            self.reset_loss();
            let seed = cfg.seed.wrapping_add(epoch as u64).wrapping_add(1);
            let batches = train.minibatches(batch_size, seed)?;

            for (idx, batch) in batches.iter().enumerate() {
                let batch_loss = self.train_batch(batch.inputs(), batch.targets())?;
                log::trace!("epoch {epoch} batch {idx}: loss {batch_loss:.6}");
            }

            let epoch_loss = self.average_loss();
            if !epoch_loss.is_finite() {
                log::warn!("epoch {epoch}: non-finite loss, stopping");
                return Err(Error::InvalidState(format!(
                    "loss diverged to {epoch_loss} in epoch {epoch}"
                )));
            }
            log::info!(
                "epoch {}/{}: loss {epoch_loss:.6} ({} batches)",
                epoch + 1,
                cfg.epochs,
                batches.len()
            );
            epoch_losses.push(epoch_loss);
        }

        let final_loss = epoch_losses.last().copied().unwrap_or_default();
        Ok(FitReport {
            epoch_losses,
            final_loss,
        })
    }

    /// Mean squared error (`sum / 2N`) over a whole dataset, without training.
    pub fn evaluate_mse(&self, data: &Dataset) -> Result<f64> {
        if data.is_empty() {
            return Err(Error::InvalidData("dataset must not be empty".to_owned()));
        }
        let pred = self.predict(data.inputs())?;
        loss::mse(pred.as_slice(), data.targets().as_slice())
    }
}
