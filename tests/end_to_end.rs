use rust_lstm_mlp::{
    Dataset, Error, FitConfig, Inputs, LayerKind, Matrix, Optimizer, SequenceGrad, SessionBuilder,
    Tensor3, TrainingSession, generate_minibatches,
};

use LayerKind::{Linear, Lstm, Relu};

/// Example `i` carries the value `i` in every slot so batches reveal their indices.
fn tagged_sequences(m: usize, steps: usize, features: usize) -> Dataset {
    let xs: Vec<Vec<Vec<f64>>> = (0..m)
        .map(|i| vec![vec![i as f64; features]; steps])
        .collect();
    let ys: Vec<f64> = (0..m).map(|i| i as f64).collect();
    Dataset::from_sequences(&xs, &ys).unwrap()
}

fn sequence_session(data: &Dataset, kinds: &[LayerKind], dims: &[usize]) -> TrainingSession {
    SessionBuilder::new()
        .data(data, 2)
        .unwrap()
        .hidden_units(4)
        .unwrap()
        .learning_rate(1e-2)
        .unwrap()
        .layers(kinds, dims)
        .unwrap()
        .build_with_seed(0)
        .unwrap()
}

#[test]
fn four_examples_two_batches_one_prediction_column() {
    let data = tagged_sequences(4, 2, 3);

    let batches = generate_minibatches(data.inputs(), data.targets(), 2, 10).unwrap();
    assert_eq!(batches.len(), 2);
    assert!(batches.iter().all(|b| b.len() == 2));

    let mut seen: Vec<usize> = batches
        .iter()
        .flat_map(|b| b.targets().as_slice().iter().map(|&v| v as usize))
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3]);

    let mut session = sequence_session(&data, &[Lstm, Linear], &[3, 1]);
    let pred = session.forward(batches[0].inputs()).unwrap();
    assert_eq!(pred.shape(), (2, 1));
}

#[test]
fn one_full_step_updates_every_layer() {
    let data = tagged_sequences(4, 2, 3);
    let mut session = sequence_session(&data, &[Lstm, Lstm, Linear, Linear], &[3, 3, 4, 1]);
    let before = session.parameters().clone();

    let batch = &data.minibatches(2, 0).unwrap()[0];
    session.forward(batch.inputs()).unwrap();
    let loss = session.compute_loss(batch.targets()).unwrap();
    session.backward().unwrap();
    session.optimize_step().unwrap();

    assert!(loss.is_finite() && loss > 0.0);
    assert_eq!(session.optimizer_state().step_count(), 1);
    for (idx, (a, b)) in before
        .layers()
        .iter()
        .zip(session.parameters().layers())
        .enumerate()
    {
        assert_ne!(a, b, "layer {idx} was not updated");
    }

    let grads = session.gradients().unwrap();
    assert_eq!(grads.len(), 4);
    assert!(grads[0].is_recurrent() && grads[1].is_recurrent());
    assert!(!grads[2].is_recurrent() && !grads[3].is_recurrent());
}

#[test]
fn training_reduces_sequence_loss() {
    // Target is the mean of the first feature over the window.
    let xs: Vec<Vec<Vec<f64>>> = (0..32)
        .map(|i| {
            (0..4)
                .map(|t| vec![((i * 7 + t * 3) % 11) as f64 / 11.0 - 0.5, 0.1])
                .collect()
        })
        .collect();
    let ys: Vec<f64> = xs
        .iter()
        .map(|seq| seq.iter().map(|step| step[0]).sum::<f64>() / seq.len() as f64)
        .collect();
    let data = Dataset::from_sequences(&xs, &ys).unwrap();

    let mut session = SessionBuilder::new()
        .data(&data, 8)
        .unwrap()
        .hidden_units(8)
        .unwrap()
        .learning_rate(1e-2)
        .unwrap()
        .layers(&[Lstm, Relu, Linear], &[6, 6, 1])
        .unwrap()
        .build_with_seed(3)
        .unwrap();

    let before = session.evaluate_mse(&data).unwrap();
    let report = session
        .fit(&data, FitConfig { epochs: 150, seed: 1 })
        .unwrap();
    let after = session.evaluate_mse(&data).unwrap();

    assert!(report.final_loss.is_finite());
    assert!(after < before, "before={before} after={after}");
}

#[test]
fn average_loss_is_per_example_and_resets_per_epoch() {
    let data = tagged_sequences(5, 2, 2);
    let mut session = SessionBuilder::new()
        .data(&data, 2)
        .unwrap()
        .hidden_units(3)
        .unwrap()
        .learning_rate(1e-6)
        .unwrap()
        .layers(&[Lstm, Linear], &[2, 1])
        .unwrap()
        .build_with_seed(0)
        .unwrap();

    let mut weighted = 0.0;
    for batch in data.minibatches(2, 4).unwrap() {
        session.forward(batch.inputs()).unwrap();
        weighted += session.compute_loss(batch.targets()).unwrap() * batch.len() as f64;
    }
    assert_eq!(session.examples_seen(), 5);
    assert!((session.average_loss() - weighted / 5.0).abs() < 1e-12);

    let report = session.fit(&data, FitConfig { epochs: 2, seed: 0 }).unwrap();
    assert_eq!(session.examples_seen(), 5);
    assert_eq!(report.epoch_losses.len(), 2);
}

#[test]
fn broadcast_and_last_step_share_the_forward_pass() {
    let data = tagged_sequences(4, 3, 2);
    let build = |mode| {
        SessionBuilder::new()
            .data(&data, 4)
            .unwrap()
            .hidden_units(3)
            .unwrap()
            .sequence_grad(mode)
            .layers(&[Lstm, Linear], &[2, 1])
            .unwrap()
            .build_with_seed(0)
            .unwrap()
    };
    let mut broadcast = build(SequenceGrad::Broadcast);
    let mut last = build(SequenceGrad::LastStep);

    let a = broadcast.forward(data.inputs()).unwrap().clone();
    let b = last.forward(data.inputs()).unwrap().clone();
    assert_eq!(a, b);
}

#[test]
fn sgd_and_adam_both_step() {
    let data = tagged_sequences(4, 2, 2);
    for optimizer in [Optimizer::Sgd, Optimizer::default()] {
        let mut session = SessionBuilder::new()
            .data(&data, 4)
            .unwrap()
            .hidden_units(2)
            .unwrap()
            .optimizer(optimizer)
            .unwrap()
            .layers(&[Lstm, Linear], &[2, 1])
            .unwrap()
            .build_with_seed(0)
            .unwrap();
        session.train_batch(data.inputs(), data.targets()).unwrap();
        assert_eq!(session.optimizer_state().step_count(), 1);
    }
}

#[test]
fn unsupported_architectures_fail_before_training() {
    let data = tagged_sequences(4, 2, 3);
    let cases: [(&[LayerKind], &[usize]); 4] = [
        (&[Relu, Linear], &[3, 1]),
        (&[Lstm], &[1]),
        (&[Lstm, Relu, Lstm, Linear], &[2, 2, 2, 1]),
        (&[Lstm, Linear], &[0, 1]),
    ];
    for (kinds, dims) in cases {
        let err = SessionBuilder::new()
            .data(&data, 2)
            .unwrap()
            .layers(kinds, dims)
            .unwrap()
            .build_with_seed(0)
            .unwrap_err();
        assert!(
            matches!(err, Error::InvalidLayerGraph(_)),
            "{kinds:?} {dims:?}: {err}"
        );
    }
}

#[test]
fn sessions_are_independent() {
    let data = tagged_sequences(4, 2, 3);
    let mut a = sequence_session(&data, &[Lstm, Linear], &[3, 1]);
    let b = sequence_session(&data, &[Lstm, Linear], &[3, 1]);

    a.train_batch(data.inputs(), data.targets()).unwrap();
    assert_ne!(a.parameters(), b.parameters());
    assert_eq!(b.optimizer_state().step_count(), 0);
}

#[test]
fn wrong_rank_input_is_rejected_at_forward() {
    let data = tagged_sequences(4, 2, 3);
    let mut session = sequence_session(&data, &[Lstm, Linear], &[3, 1]);
    assert!(session.forward(&Inputs::Rows(Matrix::zeros(4, 3))).is_err());
    assert!(session.forward(&Inputs::Sequence(Tensor3::zeros(4, 2, 3))).is_ok());
}
