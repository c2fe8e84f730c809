//! LSTM layer with an output projection.
//!
//! Per timestep, with `concat = [a_prev, x_t]` of shape `(batch, hidden + in_dim)`:
//!
//! ```text
//! f_t = sigmoid(concat Wf + bf)        forget gate
//! i_t = sigmoid(concat Wi + bi)        input gate
//! c~_t = tanh(concat Wc + bc)          candidate
//! o_t = sigmoid(concat Wo + bo)        output gate
//! c_t = f_t * c_prev + i_t * c~_t
//! a_t = o_t * tanh(c_t)
//! y_t = a_t Wy + by
//! ```
//!
//! Gate weights are `(hidden + in_dim, hidden)`, gate biases `(1, hidden)`,
//! `Wy` is `(hidden, out_dim)` and `by` is `(1, out_dim)`. The layer output is the
//! projected sequence `y` with shape `(batch, steps, out_dim)`.

use rand::Rng;

use crate::layer::Init;
use crate::{Activation, Error, Matrix, Result, Tensor3};

/// Names of the ten parameter groups, in [`LstmParams::tensors`] order.
pub const LSTM_PARAM_NAMES: [&str; 10] = [
    "w_forget",
    "b_forget",
    "w_input",
    "b_input",
    "w_candidate",
    "b_candidate",
    "w_output",
    "b_output",
    "w_proj",
    "b_proj",
];

#[derive(Debug, Clone, PartialEq)]
pub struct LstmParams {
    pub wf: Matrix,
    pub bf: Matrix,
    pub wi: Matrix,
    pub bi: Matrix,
    pub wc: Matrix,
    pub bc: Matrix,
    pub wo: Matrix,
    pub bo: Matrix,
    pub wy: Matrix,
    pub by: Matrix,
}

/// Gradients for every [`LstmParams`] field plus the initial hidden state.
#[derive(Debug, Clone, PartialEq)]
pub struct LstmGrads {
    pub d_wf: Matrix,
    pub d_bf: Matrix,
    pub d_wi: Matrix,
    pub d_bi: Matrix,
    pub d_wc: Matrix,
    pub d_bc: Matrix,
    pub d_wo: Matrix,
    pub d_bo: Matrix,
    pub d_wy: Matrix,
    pub d_by: Matrix,
    /// `dL/d(a0)`, shape `(batch, hidden)`.
    pub d_a0: Matrix,
}

/// Forward values for one timestep.
#[derive(Debug, Clone)]
pub struct StepCache {
    pub concat: Matrix,
    pub forget: Matrix,
    pub input: Matrix,
    pub candidate: Matrix,
    pub output: Matrix,
    pub c_prev: Matrix,
    pub tanh_c: Matrix,
    pub a: Matrix,
}

/// Everything [`backward`] needs from one full-sequence [`forward`].
#[derive(Debug, Clone)]
pub struct LstmCache {
    pub steps: Vec<StepCache>,
    pub input: Tensor3,
    /// Hidden states `a_t`, shape `(batch, steps, hidden)`.
    pub hidden: Tensor3,
    /// Cell states `c_t`, shape `(batch, steps, hidden)`.
    pub cell: Tensor3,
    /// Projected outputs `y_t`, shape `(batch, steps, out_dim)`.
    pub output: Tensor3,
}

impl LstmParams {
    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        hidden: usize,
        out_dim: usize,
        rng: &mut R,
    ) -> Self {
        let fan_in = hidden + in_dim;
        let gate_weights = |rng: &mut R| Init::Xavier.weights(fan_in, hidden, rng);
        let wf = gate_weights(rng);
        let wi = gate_weights(rng);
        let wc = gate_weights(rng);
        let wo = gate_weights(rng);
        Self {
            wf,
            bf: Matrix::zeros(1, hidden),
            wi,
            bi: Matrix::zeros(1, hidden),
            wc,
            bc: Matrix::zeros(1, hidden),
            wo,
            bo: Matrix::zeros(1, hidden),
            wy: Init::Xavier.weights(hidden, out_dim, rng),
            by: Matrix::zeros(1, out_dim),
        }
    }

    /// Hidden units, read from the projection weight's first dimension.
    #[inline]
    pub fn hidden(&self) -> usize {
        self.wy.rows()
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.wf.rows() - self.hidden()
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.wy.cols()
    }

    pub fn tensors(&self) -> [&Matrix; 10] {
        [
            &self.wf, &self.bf, &self.wi, &self.bi, &self.wc, &self.bc, &self.wo, &self.bo,
            &self.wy, &self.by,
        ]
    }

    pub fn tensors_mut(&mut self) -> [&mut Matrix; 10] {
        [
            &mut self.wf,
            &mut self.bf,
            &mut self.wi,
            &mut self.bi,
            &mut self.wc,
            &mut self.bc,
            &mut self.wo,
            &mut self.bo,
            &mut self.wy,
            &mut self.by,
        ]
    }

    /// Rebuild from tensors in [`LSTM_PARAM_NAMES`] order, validating shapes.
    pub fn from_tensors(tensors: Vec<Matrix>) -> Result<Self> {
        let [wf, bf, wi, bi, wc, bc, wo, bo, wy, by]: [Matrix; 10] =
            tensors.try_into().map_err(|v: Vec<Matrix>| {
                Error::InvalidData(format!("LSTM layer needs 10 tensors, got {}", v.len()))
            })?;
        let params = Self {
            wf,
            bf,
            wi,
            bi,
            wc,
            bc,
            wo,
            bo,
            wy,
            by,
        };
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<()> {
        let hidden = self.hidden();
        let fan_in = self.wf.rows();
        if fan_in < hidden {
            return Err(Error::ShapeMismatch(format!(
                "LSTM gate fan-in {fan_in} is smaller than hidden units {hidden}"
            )));
        }
        for (name, m) in LSTM_PARAM_NAMES.iter().zip(self.tensors()) {
            let expected = match *name {
                "w_proj" => m.shape(),
                "b_proj" => (1, self.out_dim()),
                n if n.starts_with("w_") => (fan_in, hidden),
                _ => (1, hidden),
            };
            if m.shape() != expected {
                return Err(Error::ShapeMismatch(format!(
                    "LSTM {name} has shape {:?}, expected {expected:?}",
                    m.shape()
                )));
            }
        }
        Ok(())
    }
}

impl LstmGrads {
    /// Parameter gradients in [`LstmParams::tensors`] order (excludes `d_a0`).
    pub fn tensors(&self) -> [&Matrix; 10] {
        [
            &self.d_wf, &self.d_bf, &self.d_wi, &self.d_bi, &self.d_wc, &self.d_bc, &self.d_wo,
            &self.d_bo, &self.d_wy, &self.d_by,
        ]
    }
}

fn gate(concat: &Matrix, w: &Matrix, b: &Matrix, act: Activation) -> Matrix {
    let mut z = concat.matmul(w);
    z.add_row_broadcast(b);
    act.apply(&z)
}

/// Run the layer over the whole sequence starting from hidden state `a0`.
///
/// The initial cell state is zero. Returns the projected output sequence
/// (also stored in the cache).
pub fn forward(params: &LstmParams, x: &Tensor3, a0: &Matrix) -> Result<(Tensor3, LstmCache)> {
    let (batch, steps, features) = x.shape();
    let hidden = params.hidden();
    if features != params.in_dim() {
        return Err(Error::ShapeMismatch(format!(
            "LSTM input has {features} features, layer expects {}",
            params.in_dim()
        )));
    }
    if a0.shape() != (batch, hidden) {
        return Err(Error::ShapeMismatch(format!(
            "initial hidden state shape {:?} does not match ({batch}, {hidden})",
            a0.shape()
        )));
    }

    let mut hidden_seq = Tensor3::zeros(batch, steps, hidden);
    let mut cell_seq = Tensor3::zeros(batch, steps, hidden);
    let mut output_seq = Tensor3::zeros(batch, steps, params.out_dim());
    let mut step_caches = Vec::with_capacity(steps);

    let mut a_prev = a0.clone();
    let mut c_prev = Matrix::zeros(batch, hidden);

    for t in 0..steps {
        let concat = a_prev.hstack(&x.step(t));

        let forget = gate(&concat, &params.wf, &params.bf, Activation::Sigmoid);
        let input = gate(&concat, &params.wi, &params.bi, Activation::Sigmoid);
        let candidate = gate(&concat, &params.wc, &params.bc, Activation::Tanh);
        let output = gate(&concat, &params.wo, &params.bo, Activation::Sigmoid);

        let mut c = forget.zip_map(&c_prev, |f, c| f * c);
        c.add_assign(&input.zip_map(&candidate, |i, g| i * g));
        let tanh_c = c.map(f64::tanh);
        let a = output.zip_map(&tanh_c, |o, tc| o * tc);

        let mut y = a.matmul(&params.wy);
        y.add_row_broadcast(&params.by);

        hidden_seq.set_step(t, &a);
        cell_seq.set_step(t, &c);
        output_seq.set_step(t, &y);

        step_caches.push(StepCache {
            concat,
            forget,
            input,
            candidate,
            output,
            c_prev,
            tanh_c,
            a: a.clone(),
        });

        a_prev = a;
        c_prev = c;
    }

    let cache = LstmCache {
        steps: step_caches,
        input: x.clone(),
        hidden: hidden_seq,
        cell: cell_seq,
        output: output_seq.clone(),
    };
    Ok((output_seq, cache))
}

/// Backpropagation through time.
///
/// `d_output` is `dL/dy` for every timestep, shape `(batch, steps, out_dim)`.
/// Returns the parameter gradients (with `d_a0`) and `dL/dx` for the input
/// sequence.
pub fn backward(
    params: &LstmParams,
    cache: &LstmCache,
    d_output: &Tensor3,
) -> Result<(LstmGrads, Tensor3)> {
    if d_output.shape() != cache.output.shape() {
        return Err(Error::ShapeMismatch(format!(
            "LSTM upstream gradient shape {:?} does not match output shape {:?}",
            d_output.shape(),
            cache.output.shape()
        )));
    }

    let (batch, steps, features) = cache.input.shape();
    let hidden = params.hidden();

    let mut grads = LstmGrads {
        d_wf: Matrix::zeros(params.wf.rows(), hidden),
        d_bf: Matrix::zeros(1, hidden),
        d_wi: Matrix::zeros(params.wi.rows(), hidden),
        d_bi: Matrix::zeros(1, hidden),
        d_wc: Matrix::zeros(params.wc.rows(), hidden),
        d_bc: Matrix::zeros(1, hidden),
        d_wo: Matrix::zeros(params.wo.rows(), hidden),
        d_bo: Matrix::zeros(1, hidden),
        d_wy: Matrix::zeros(hidden, params.out_dim()),
        d_by: Matrix::zeros(1, params.out_dim()),
        d_a0: Matrix::zeros(batch, hidden),
    };
    let mut d_input = Tensor3::zeros(batch, steps, features);

    let mut da_next = Matrix::zeros(batch, hidden);
    let mut dc_next = Matrix::zeros(batch, hidden);

    for (t, step) in cache.steps.iter().enumerate().rev() {
        let dy = d_output.step(t);
        grads.d_wy.add_assign(&step.a.t_matmul(&dy));
        grads.d_by.add_assign(&dy.sum_rows());

        let mut da = dy.matmul_t(&params.wy);
        da.add_assign(&da_next);

        // Pre-activation gradients of the four gates.
        let d_o = da
            .zip_map(&step.tanh_c, |d, tc| d * tc)
            .zip_map(&step.output, |d, o| d * o * (1.0 - o));
        let mut dc = da
            .zip_map(&step.output, |d, o| d * o)
            .zip_map(&step.tanh_c, |d, tc| d * (1.0 - tc * tc));
        dc.add_assign(&dc_next);
        let d_f = dc
            .zip_map(&step.c_prev, |d, c| d * c)
            .zip_map(&step.forget, |d, f| d * f * (1.0 - f));
        let d_i = dc
            .zip_map(&step.candidate, |d, g| d * g)
            .zip_map(&step.input, |d, i| d * i * (1.0 - i));
        let d_g = dc
            .zip_map(&step.input, |d, i| d * i)
            .zip_map(&step.candidate, |d, g| d * (1.0 - g * g));

        grads.d_wf.add_assign(&step.concat.t_matmul(&d_f));
        grads.d_bf.add_assign(&d_f.sum_rows());
        grads.d_wi.add_assign(&step.concat.t_matmul(&d_i));
        grads.d_bi.add_assign(&d_i.sum_rows());
        grads.d_wc.add_assign(&step.concat.t_matmul(&d_g));
        grads.d_bc.add_assign(&d_g.sum_rows());
        grads.d_wo.add_assign(&step.concat.t_matmul(&d_o));
        grads.d_bo.add_assign(&d_o.sum_rows());

        let mut d_concat = d_f.matmul_t(&params.wf);
        d_concat.add_assign(&d_i.matmul_t(&params.wi));
        d_concat.add_assign(&d_g.matmul_t(&params.wc));
        d_concat.add_assign(&d_o.matmul_t(&params.wo));

        let (d_a_prev, d_x) = d_concat.split_cols(hidden);
        d_input.set_step(t, &d_x);
        da_next = d_a_prev;
        dc_next = dc.zip_map(&step.forget, |d, f| d * f);
    }

    grads.d_a0 = da_next;
    Ok((grads, d_input))
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sample_input() -> Tensor3 {
        Tensor3::from_nested(&[
            vec![vec![0.5, -0.3], vec![0.1, 0.8], vec![-0.6, 0.2]],
            vec![vec![-0.2, 0.4], vec![0.9, -0.7], vec![0.3, 0.3]],
        ])
        .unwrap()
    }

    // 0.5 * sum(y^2), so dL/dy = y.
    fn loss(params: &LstmParams, x: &Tensor3, a0: &Matrix) -> f64 {
        let (y, _) = forward(params, x, a0).unwrap();
        0.5 * y.as_slice().iter().map(|v| v * v).sum::<f64>()
    }

    #[test]
    fn forward_shapes_follow_projection() {
        let mut rng = StdRng::seed_from_u64(0);
        let params = LstmParams::new_with_rng(2, 4, 3, &mut rng);
        assert_eq!(params.hidden(), 4);
        assert_eq!(params.in_dim(), 2);

        let x = sample_input();
        let (y, cache) = forward(&params, &x, &Matrix::zeros(2, 4)).unwrap();
        assert_eq!(y.shape(), (2, 3, 3));
        assert_eq!(cache.hidden.shape(), (2, 3, 4));
        assert_eq!(cache.steps.len(), 3);
    }

    #[test]
    fn backward_matches_numeric_gradients() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut params = LstmParams::new_with_rng(2, 3, 2, &mut rng);
        // Non-zero biases so every gate path is exercised.
        for (k, b) in [&mut params.bf, &mut params.bi, &mut params.bc, &mut params.bo]
            .into_iter()
            .enumerate()
        {
            for (j, v) in b.as_mut_slice().iter_mut().enumerate() {
                *v = 0.1 * (k as f64 + 1.0) - 0.05 * j as f64;
            }
        }

        let x = sample_input();
        let a0 = Matrix::from_rows(&[vec![0.1, -0.2, 0.05], vec![0.0, 0.3, -0.1]]).unwrap();
        let (y, cache) = forward(&params, &x, &a0).unwrap();
        let (grads, d_x) = backward(&params, &cache, &y).unwrap();

        let eps = 1e-6;
        let tol = 1e-6;
        for p in 0..10 {
            let analytic = grads.tensors()[p].clone();
            for i in 0..analytic.len() {
                let mut plus = params.clone();
                plus.tensors_mut()[p].as_mut_slice()[i] += eps;
                let mut minus = params.clone();
                minus.tensors_mut()[p].as_mut_slice()[i] -= eps;
                let numeric = (loss(&plus, &x, &a0) - loss(&minus, &x, &a0)) / (2.0 * eps);
                let a = analytic.as_slice()[i];
                assert!(
                    (numeric - a).abs() < tol,
                    "{}[{i}]: numeric={numeric} analytic={a}",
                    LSTM_PARAM_NAMES[p]
                );
            }
        }

        for i in 0..a0.len() {
            let mut plus = a0.clone();
            plus.as_mut_slice()[i] += eps;
            let mut minus = a0.clone();
            minus.as_mut_slice()[i] -= eps;
            let numeric = (loss(&params, &x, &plus) - loss(&params, &x, &minus)) / (2.0 * eps);
            assert!((numeric - grads.d_a0.as_slice()[i]).abs() < tol);
        }

        let (b, t, f) = x.shape();
        for bi in 0..b {
            for ti in 0..t {
                for fi in 0..f {
                    let mut plus = x.clone();
                    plus.step_row_mut(bi, ti)[fi] += eps;
                    let mut minus = x.clone();
                    minus.step_row_mut(bi, ti)[fi] -= eps;
                    let numeric =
                        (loss(&params, &plus, &a0) - loss(&params, &minus, &a0)) / (2.0 * eps);
                    assert!((numeric - d_x.get(bi, ti, fi)).abs() < tol);
                }
            }
        }
    }

    #[test]
    fn from_tensors_validates_count_and_shapes() {
        let mut rng = StdRng::seed_from_u64(1);
        let params = LstmParams::new_with_rng(2, 3, 1, &mut rng);
        let tensors: Vec<Matrix> = params.tensors().into_iter().cloned().collect();
        assert_eq!(LstmParams::from_tensors(tensors.clone()).unwrap(), params);

        assert!(LstmParams::from_tensors(tensors[..9].to_vec()).is_err());

        let mut bad = tensors;
        bad[1] = Matrix::zeros(1, 5);
        assert!(LstmParams::from_tensors(bad).is_err());
    }

    #[test]
    fn rejects_mismatched_initial_state() {
        let mut rng = StdRng::seed_from_u64(0);
        let params = LstmParams::new_with_rng(2, 4, 1, &mut rng);
        let err = forward(&params, &sample_input(), &Matrix::zeros(2, 3)).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }
}
