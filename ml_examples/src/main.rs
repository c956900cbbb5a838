// ml_examples/src/main.rs
use std::path::Path;

use anyhow::Result;
use shift_snn::{load_mnist, print_model_summary, print_summary_table, Evaluator, Trainer, TrainingConfig, Variant};
use tracing::info;

const TRAIN_SAMPLES: usize = 60000;
const TEST_SAMPLES: usize = 10000;

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    #[cfg(not(feature = "mly"))]
    let variant = Variant::two_layer();
    #[cfg(feature = "mly")]
    let variant = Variant::three_layer();

    let config = TrainingConfig::with_variant(variant);
    let train = load_mnist(Path::new("data"), true)?;
    let mut test = load_mnist(Path::new("data"), false)?;
    test.truncate(TEST_SAMPLES);
    info!("MNIST: {} training / {} test samples", train.len(), test.len());

    let mut trainer = Trainer::new(config.clone())?;
    print_model_summary(trainer.network());
    let summary = trainer.run(&train, TRAIN_SAMPLES, &test)?;
    print_summary_table(&summary);

    let report = Evaluator::new(config, trainer.device()).run(&test)?;
    println!("Accuracy: {}", report);
    Ok(())
}
