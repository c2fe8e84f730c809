//! Mean squared error.
//!
//! Used like:
//!
//! - run `session.forward(...)`
//! - `session.compute_loss(...)` evaluates [`mse`] on the prediction
//! - `session.backward()` seeds the output gradient with [`mse_backward`]
//! - `session.optimize_step()` updates parameters

use crate::{Error, Matrix, Result};

/// Mean squared error (MSE) loss.
///
/// Returns `sum((pred - target)^2) / (2 * N)`.
pub fn mse(pred: &[f64], target: &[f64]) -> Result<f64> {
    if pred.len() != target.len() {
        return Err(Error::ShapeMismatch(format!(
            "prediction length {} does not match target length {}",
            pred.len(),
            target.len()
        )));
    }

    if pred.is_empty() {
        return Ok(0.0);
    }

    let mut sum_sq = 0.0_f64;
    for (&p, &t) in pred.iter().zip(target) {
        let diff = p - t;
        sum_sq = diff.mul_add(diff, sum_sq);
    }
    Ok(sum_sq / (2.0 * pred.len() as f64))
}

/// Gradient of [`mse`] w.r.t. `pred`: `(pred - target) / N`.
///
/// `pred` and `target` must both be `(N, 1)`.
pub fn mse_backward(pred: &Matrix, target: &Matrix) -> Result<Matrix> {
    if pred.shape() != target.shape() {
        return Err(Error::ShapeMismatch(format!(
            "prediction shape {:?} does not match target shape {:?}",
            pred.shape(),
            target.shape()
        )));
    }
    let n = pred.rows().max(1) as f64;
    Ok(pred.zip_map(target, |p, t| (p - t) / n))
}

/// Turn a `(1, batch)` row into a `(batch, 1)` column.
///
/// Only a row whose length equals `batch` is transposed; anything else is
/// returned as is and left to the shape checks of the caller.
pub fn to_column(m: &Matrix, batch: usize) -> Matrix {
    if batch > 1 && m.shape() == (1, batch) {
        m.transpose()
    } else {
        m.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mse_is_zero_for_exact_predictions() {
        let v = [0.3, -1.2, 4.0];
        assert_eq!(mse(&v, &v).unwrap(), 0.0);
    }

    #[test]
    fn mse_uses_half_mean() {
        // (1^2 + 3^2) / (2 * 2) = 2.5
        let loss = mse(&[1.0, 3.0], &[0.0, 0.0]).unwrap();
        assert!((loss - 2.5).abs() < 1e-12);
    }

    #[test]
    fn scaling_errors_scales_loss_quadratically() {
        let pred = [0.5, -0.25, 2.0];
        let target = [0.0, 0.5, 1.0];
        let base = mse(&pred, &target).unwrap();

        let k = 3.0;
        let scaled_pred: Vec<f64> = pred.iter().map(|p| p * k).collect();
        let scaled_target: Vec<f64> = target.iter().map(|t| t * k).collect();
        let scaled = mse(&scaled_pred, &scaled_target).unwrap();
        assert!((scaled - k * k * base).abs() < 1e-12);
    }

    #[test]
    fn mse_rejects_length_mismatch() {
        let err = mse(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }

    #[test]
    fn gradient_is_residual_over_batch() {
        let pred = Matrix::column(&[1.0, 2.0]);
        let target = Matrix::column(&[0.0, 4.0]);
        let grad = mse_backward(&pred, &target).unwrap();
        assert_eq!(grad.as_slice(), &[0.5, -1.0]);
    }

    #[test]
    fn rows_of_batch_length_become_columns() {
        let row = Matrix::from_rows(&[vec![1.0, 2.0, 3.0]]).unwrap();
        assert_eq!(to_column(&row, 3).shape(), (3, 1));
        // A row of a different length is not the batch laid out sideways.
        assert_eq!(to_column(&row, 2).shape(), (1, 3));
        let col = Matrix::column(&[1.0, 2.0]);
        assert_eq!(to_column(&col, 2), col);
    }
}
