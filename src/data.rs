//! Datasets and minibatching.
//!
//! Inputs are either sequences `(m, steps, features)` for networks that start with
//! an LSTM layer, or plain rows `(m, features)` for dense-only networks. Targets are
//! always a `(m, 1)` column.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::{Error, Matrix, Result, Tensor3};

/// Model inputs (X).
#[derive(Debug, Clone, PartialEq)]
pub enum Inputs {
    /// Rank-3 `(batch, steps, features)`.
    Sequence(Tensor3),
    /// Rank-2 `(batch, features)`.
    Rows(Matrix),
}

impl Inputs {
    /// Returns the number of examples.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Inputs::Sequence(t) => t.batch(),
            Inputs::Rows(m) => m.rows(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-step (or per-row) feature count.
    #[inline]
    pub fn features(&self) -> usize {
        match self {
            Inputs::Sequence(t) => t.features(),
            Inputs::Rows(m) => m.cols(),
        }
    }

    /// Sequence length, or `None` for row inputs.
    #[inline]
    pub fn steps(&self) -> Option<usize> {
        match self {
            Inputs::Sequence(t) => Some(t.steps()),
            Inputs::Rows(_) => None,
        }
    }

    #[inline]
    pub fn is_sequence(&self) -> bool {
        matches!(self, Inputs::Sequence(_))
    }

    /// Per-example shape, without the batch dimension.
    #[inline]
    pub fn shape(&self) -> InputShape {
        InputShape {
            features: self.features(),
            steps: self.steps(),
        }
    }

    /// Gather examples in the given order.
    pub fn select(&self, indices: &[usize]) -> Inputs {
        match self {
            Inputs::Sequence(t) => Inputs::Sequence(t.select_examples(indices)),
            Inputs::Rows(m) => Inputs::Rows(m.select_rows(indices)),
        }
    }
}

/// Shape of one input example: `features` per step, and the sequence length for
/// rank-3 inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
    pub features: usize,
    pub steps: Option<usize>,
}

impl InputShape {
    pub fn rows(features: usize) -> Self {
        Self {
            features,
            steps: None,
        }
    }

    pub fn sequence(steps: usize, features: usize) -> Self {
        Self {
            features,
            steps: Some(steps),
        }
    }

    #[inline]
    pub fn is_sequence(&self) -> bool {
        self.steps.is_some()
    }

    pub(crate) fn rank_name(&self) -> &'static str {
        if self.is_sequence() {
            "rank-3 sequence"
        } else {
            "rank-2 row"
        }
    }
}

impl From<Tensor3> for Inputs {
    fn from(value: Tensor3) -> Self {
        Inputs::Sequence(value)
    }
}

impl From<Matrix> for Inputs {
    fn from(value: Matrix) -> Self {
        Inputs::Rows(value)
    }
}

/// A supervised dataset: inputs (X) and a `(m, 1)` target column (Y).
#[derive(Debug, Clone)]
pub struct Dataset {
    inputs: Inputs,
    targets: Matrix,
}

impl Dataset {
    pub fn new(inputs: impl Into<Inputs>, targets: Matrix) -> Result<Self> {
        let inputs = inputs.into();
        if inputs.is_empty() {
            return Err(Error::InvalidData("inputs must not be empty".to_owned()));
        }
        if inputs.features() == 0 {
            return Err(Error::InvalidData("input features must be > 0".to_owned()));
        }
        if targets.cols() != 1 {
            return Err(Error::InvalidData(format!(
                "targets must be a single column, got {} columns",
                targets.cols()
            )));
        }
        if inputs.len() != targets.rows() {
            return Err(Error::ShapeMismatch(format!(
                "inputs/targets length mismatch: {} vs {}",
                inputs.len(),
                targets.rows()
            )));
        }
        Ok(Self { inputs, targets })
    }

    /// Build a sequence dataset from nested `[example][step][feature]` rows and
    /// scalar targets.
    pub fn from_sequences(inputs: &[Vec<Vec<f64>>], targets: &[f64]) -> Result<Self> {
        Self::new(Tensor3::from_nested(inputs)?, Matrix::column(targets))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    #[inline]
    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    #[inline]
    pub fn targets(&self) -> &Matrix {
        &self.targets
    }

    /// Shuffle with `seed` and split into batches of at most `batch_size`.
    pub fn minibatches(&self, batch_size: usize, seed: u64) -> Result<Vec<Minibatch>> {
        generate_minibatches(&self.inputs, &self.targets, batch_size, seed)
    }
}

/// One batch of examples with matching inputs and targets.
#[derive(Debug, Clone)]
pub struct Minibatch {
    inputs: Inputs,
    targets: Matrix,
}

impl Minibatch {
    #[inline]
    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    #[inline]
    pub fn targets(&self) -> &Matrix {
        &self.targets
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.targets.rows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.targets.rows() == 0
    }
}

/// Deterministic permutation of `0..len` for `seed`.
pub fn shuffled_indices(len: usize, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    order
}

/// Shuffle `x` and `y` with the same seeded permutation, then partition them into
/// consecutive batches of `batch_size` (the last batch may be smaller).
///
/// Every example appears in exactly one batch. The same `seed` always produces the
/// same batches.
pub fn generate_minibatches(
    x: &Inputs,
    y: &Matrix,
    batch_size: usize,
    seed: u64,
) -> Result<Vec<Minibatch>> {
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
    }
    if x.len() != y.rows() {
        return Err(Error::ShapeMismatch(format!(
            "inputs/targets length mismatch: {} vs {}",
            x.len(),
            y.rows()
        )));
    }

    let order = shuffled_indices(x.len(), seed);
    Ok(order
        .chunks(batch_size)
        .map(|idx| Minibatch {
            inputs: x.select(idx),
            targets: y.select_rows(idx),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(m: usize) -> Dataset {
        // Example i holds the value i everywhere, so batches reveal their indices.
        let xs: Vec<Vec<Vec<f64>>> = (0..m).map(|i| vec![vec![i as f64; 3]; 2]).collect();
        let ys: Vec<f64> = (0..m).map(|i| i as f64).collect();
        Dataset::from_sequences(&xs, &ys).unwrap()
    }

    fn batch_ids(batch: &Minibatch) -> Vec<usize> {
        batch.targets().as_slice().iter().map(|&v| v as usize).collect()
    }

    #[test]
    fn batches_partition_every_example_once() {
        for (m, b) in [(10, 3), (4, 2), (7, 7), (5, 10), (1, 1)] {
            let data = dataset(m);
            let batches = data.minibatches(b, 42).unwrap();

            assert_eq!(batches.len(), m.div_ceil(b));
            let total: usize = batches.iter().map(Minibatch::len).sum();
            assert_eq!(total, m);
            if m % b != 0 {
                assert_eq!(batches.last().unwrap().len(), m % b);
            }

            let mut seen: Vec<usize> = batches.iter().flat_map(batch_ids).collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..m).collect::<Vec<_>>());
        }
    }

    #[test]
    fn inputs_and_targets_stay_aligned() {
        let data = dataset(9);
        for batch in data.minibatches(4, 1).unwrap() {
            let Inputs::Sequence(x) = batch.inputs() else {
                panic!("sequence dataset must yield sequence batches");
            };
            for (row, id) in batch_ids(&batch).into_iter().enumerate() {
                assert!(x.example(row).iter().all(|&v| v == id as f64));
            }
        }
    }

    #[test]
    fn same_seed_same_batches() {
        let data = dataset(16);
        let a: Vec<Vec<usize>> = data.minibatches(5, 11).unwrap().iter().map(batch_ids).collect();
        let b: Vec<Vec<usize>> = data.minibatches(5, 11).unwrap().iter().map(batch_ids).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_length_mismatch_and_zero_batch() {
        let x = Inputs::Rows(Matrix::zeros(3, 2));
        let y = Matrix::zeros(2, 1);
        let err = generate_minibatches(&x, &y, 2, 0).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));

        let y = Matrix::zeros(3, 1);
        assert!(generate_minibatches(&x, &y, 0, 0).is_err());
    }

    #[test]
    fn dataset_validates_targets() {
        assert!(Dataset::new(Matrix::zeros(3, 2), Matrix::zeros(3, 2)).is_err());
        assert!(Dataset::new(Matrix::zeros(3, 2), Matrix::zeros(2, 1)).is_err());
        assert!(Dataset::new(Matrix::zeros(3, 2), Matrix::zeros(3, 1)).is_ok());
    }
}
