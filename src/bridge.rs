//! Rank bridge between recurrent sequences and dense matrices.
//!
//! Recurrent layers produce `(batch, steps, features)` tensors while dense layers
//! consume `(batch, features)` matrices. These functions are the only places the
//! rank changes, and they are applied exactly at LSTM/Dense boundaries:
//!
//! - forward, LSTM -> Dense: [`collapse_to_last_step`]
//! - backward, Dense -> LSTM: [`broadcast_to_sequence`] or [`scatter_to_last_step`]

use crate::{Error, Matrix, Result, Tensor3};

/// Select the final timestep of every example: `(b, t, f) -> (b, f)`.
///
/// Fails with `ShapeMismatch` if the sequence has no timesteps.
pub fn collapse_to_last_step(seq: &Tensor3) -> Result<Matrix> {
    if seq.steps() == 0 {
        return Err(Error::ShapeMismatch(
            "cannot take the last timestep of an empty sequence".to_owned(),
        ));
    }
    Ok(seq.step(seq.steps() - 1))
}

/// Replicate each row across `steps` timesteps: `(b, f) -> (b, steps, f)`.
pub fn broadcast_to_sequence(values: &Matrix, steps: usize) -> Tensor3 {
    let mut out = Tensor3::zeros(values.rows(), steps, values.cols());
    for b in 0..values.rows() {
        for t in 0..steps {
            out.step_row_mut(b, t).copy_from_slice(values.row(b));
        }
    }
    out
}

/// Place each row at the final timestep and zero elsewhere.
///
/// This is the adjoint of [`collapse_to_last_step`].
pub fn scatter_to_last_step(values: &Matrix, steps: usize) -> Tensor3 {
    let mut out = Tensor3::zeros(values.rows(), steps, values.cols());
    if steps > 0 {
        out.set_step(steps - 1, values);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Matrix {
        Matrix::from_rows(&[vec![1.0, -2.0, 0.5], vec![3.0, 0.0, 4.0]]).unwrap()
    }

    #[test]
    fn collapse_of_broadcast_is_identity() {
        let m = sample();
        for steps in 1..4 {
            let seq = broadcast_to_sequence(&m, steps);
            assert_eq!(seq.shape(), (2, steps, 3));
            assert_eq!(collapse_to_last_step(&seq).unwrap(), m);
        }
    }

    #[test]
    fn broadcast_copies_every_step() {
        let seq = broadcast_to_sequence(&sample(), 3);
        for t in 0..3 {
            assert_eq!(seq.step(t), sample());
        }
    }

    #[test]
    fn scatter_only_fills_final_step() {
        let seq = scatter_to_last_step(&sample(), 3);
        assert_eq!(seq.step(2), sample());
        assert!(seq.step(0).as_slice().iter().all(|&v| v == 0.0));
        assert_eq!(collapse_to_last_step(&seq).unwrap(), sample());
    }

    #[test]
    fn collapse_rejects_empty_sequences() {
        let seq = Tensor3::zeros(2, 0, 3);
        let err = collapse_to_last_step(&seq).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }
}
