use rand::SeedableRng;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;

use rust_lstm_mlp::{Dataset, FitConfig, LayerKind, SessionBuilder};

const STEPS: usize = 8;

/// Windows of a noisy sine wave; each target is the value one step after the window.
fn sine_windows(count: usize, rng: &mut StdRng) -> rust_lstm_mlp::Result<Dataset> {
    let phase = Uniform::new(0.0_f64, std::f64::consts::TAU);
    let noise = Uniform::new(-0.05_f64, 0.05);

    let mut xs = Vec::with_capacity(count);
    let mut ys = Vec::with_capacity(count);
    for _ in 0..count {
        let start = phase.sample(rng);
        let value = |t: usize| (start + 0.3 * t as f64).sin();
        xs.push(
            (0..STEPS)
                .map(|t| vec![value(t) + noise.sample(rng)])
                .collect::<Vec<_>>(),
        );
        ys.push(value(STEPS));
    }
    Dataset::from_sequences(&xs, &ys)
}

fn main() -> rust_lstm_mlp::Result<()> {
    env_logger::init();

    let mut rng = StdRng::seed_from_u64(1);
    let train = sine_windows(256, &mut rng)?;
    let test = sine_windows(64, &mut rng)?;

    let mut session = SessionBuilder::new()
        .data(&train, 32)?
        .hidden_units(16)?
        .learning_rate(1e-2)?
        .layers(
            &[LayerKind::Lstm, LayerKind::Relu, LayerKind::Linear],
            &[8, 8, 1],
        )?
        .build_with_seed(0)?;

    let report = session.fit(&train, FitConfig { epochs: 30, seed: 0 })?;
    for (epoch, loss) in report.epoch_losses.iter().enumerate() {
        println!("epoch {:>3}: loss={loss:.6}", epoch + 1);
    }

    let test_mse = session.evaluate_mse(&test)?;
    println!("train_loss={:.6} test_mse={test_mse:.6}", report.final_loss);
    Ok(())
}
