//! End-to-end training and evaluation runs on synthetic digits.

use shift_snn::trainer::Phase;
use shift_snn::{
    synthetic_digits, CheckpointStore, Device, Evaluator, SnnError, Trainer, TrainingConfig, Variant,
};
use tempfile::TempDir;

fn config_in(tmp: &TempDir, variant: Variant) -> TrainingConfig {
    TrainingConfig {
        checkpoint_dir: tmp.path().join("parameters_record"),
        ..TrainingConfig::with_variant(variant)
    }
}

/// 784 → 800 → 10 for one epoch over 128 samples: every logged loss is
/// non-negative and exactly four parameter files are written.
#[test]
fn two_layer_epoch_writes_four_parameter_files() {
    let tmp = TempDir::new().expect("TempDir must be created");
    let config = TrainingConfig {
        epochs: 1,
        ..config_in(&tmp, Variant::two_layer())
    };
    let train = synthetic_digits(128, 7);
    let held_out = synthetic_digits(20, 8);

    let mut trainer = Trainer::new(config.clone()).unwrap();
    let summary = trainer.run(&train, 128, &held_out).unwrap();

    assert_eq!(trainer.phase(), Phase::Completed);
    assert!(!summary.loss_history.is_empty());
    assert!(summary.loss_history.iter().all(|&l| l >= 0.0 && l.is_finite()));
    assert_eq!(summary.epochs.len(), 1);
    assert_eq!(summary.epochs[0].accuracy.total, 20);

    let mut files: Vec<_> = std::fs::read_dir(&config.checkpoint_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    files.sort();
    let mut expected = CheckpointStore::new(&config.checkpoint_dir).files_for("SL_mnist", 2);
    expected.sort();
    assert_eq!(files, expected);
}

#[test]
fn progress_records_follow_batch_schedule() {
    let tmp = TempDir::new().expect("TempDir must be created");
    let config = TrainingConfig {
        epochs: 2,
        batch_size: 16,
        eval_batch_size: 7,
        log_every: 1,
        ..config_in(&tmp, Variant::new("tiny", vec![784, 16, 10]))
    };
    let train = synthetic_digits(50, 1);
    let held_out = synthetic_digits(15, 2);

    let mut trainer = Trainer::new(config.clone()).unwrap();
    let summary = trainer.run(&train, 40, &held_out).unwrap();

    // 40 samples in batches of 16: 16, 16, 8
    assert_eq!(summary.progress.len(), 6);
    let seen: Vec<usize> = summary.progress.iter().map(|p| p.samples_seen).collect();
    assert_eq!(seen, vec![0, 16, 32, 0, 16, 32]);
    assert!(summary.progress.iter().all(|p| p.total_samples == 40));
    assert_eq!(summary.progress[3].epoch, 2);
    assert_eq!(summary.loss_history.len(), 6);

    assert!((summary.epochs[0].lr_shift - 1e-4).abs() < 1e-18);
    assert!((summary.epochs[1].lr_shift - 1e-5).abs() < 1e-15);

    let evaluator = Evaluator::new(config, Device::Cpu);
    let report = evaluator.run(&held_out).unwrap();
    assert_eq!(report, summary.epochs[1].accuracy);

    let cm = evaluator.confusion(&held_out).unwrap();
    assert_eq!(cm.len(), 10);
    assert_eq!(cm.iter().flatten().sum::<usize>(), 15);
    let diagonal: usize = (0..10).map(|c| cm[c][c]).sum();
    assert_eq!(diagonal, report.correct);
}

#[test]
fn three_layer_variant_writes_six_files() {
    let tmp = TempDir::new().expect("TempDir must be created");
    let config = TrainingConfig {
        epochs: 1,
        batch_size: 10,
        ..config_in(&tmp, Variant::new("SL_mly_tiny", vec![784, 12, 12, 10]))
    };
    let data = synthetic_digits(20, 4);
    Trainer::new(config.clone()).unwrap().run(&data, 20, &data).unwrap();
    let files = std::fs::read_dir(&config.checkpoint_dir).unwrap().count();
    assert_eq!(files, 6);
}

#[test]
fn accelerator_request_falls_back_to_cpu() {
    let tmp = TempDir::new().expect("TempDir must be created");
    let config = TrainingConfig {
        device: Device::Accelerator(3),
        ..config_in(&tmp, Variant::new("tiny", vec![784, 4, 10]))
    };
    let trainer = Trainer::new(config).unwrap();
    assert_eq!(trainer.device(), Device::Cpu);
    assert_eq!(trainer.phase(), Phase::Initializing);
}

#[test]
fn empty_training_set_is_rejected() {
    let tmp = TempDir::new().expect("TempDir must be created");
    let mut trainer = Trainer::new(config_in(&tmp, Variant::new("tiny", vec![784, 4, 10]))).unwrap();
    let empty = synthetic_digits(0, 0);
    assert!(matches!(
        trainer.run(&empty, 100, &empty),
        Err(SnnError::EmptyDataset)
    ));
}

/// Labels outside the class range abort with the one-based epoch and batch
/// named: sample 6 sits in the second batch of four.
#[test]
fn bad_label_reports_epoch_and_batch() {
    let tmp = TempDir::new().expect("TempDir must be created");
    let config = TrainingConfig {
        batch_size: 4,
        ..config_in(&tmp, Variant::new("tiny", vec![784, 4, 10]))
    };
    let mut train = synthetic_digits(8, 3);
    train.labels[6] = 12;
    let mut trainer = Trainer::new(config).unwrap();
    match trainer.run(&train, 8, &train) {
        Err(SnnError::Step { epoch, batch, source }) => {
            assert_eq!((epoch, batch), (1, 2));
            assert!(matches!(*source, SnnError::InvalidLabel { label: 12, classes: 10 }));
        }
        other => panic!("expected a step error, got {:?}", other.map(|_| ())),
    }
}

/// A checkpoint directory that cannot be created fails the run at the
/// epoch boundary, naming the epoch.
#[test]
fn checkpoint_failure_reports_epoch() {
    let tmp = TempDir::new().expect("TempDir must be created");
    let blocker = tmp.path().join("not_a_dir");
    std::fs::write(&blocker, b"x").unwrap();
    let config = TrainingConfig {
        epochs: 1,
        batch_size: 4,
        checkpoint_dir: blocker.join("parameters_record"),
        ..TrainingConfig::with_variant(Variant::new("tiny", vec![784, 4, 10]))
    };
    let data = synthetic_digits(8, 5);
    let mut trainer = Trainer::new(config).unwrap();
    match trainer.run(&data, 8, &data) {
        Err(SnnError::Epoch { epoch, source }) => {
            assert_eq!(epoch, 1);
            assert!(matches!(*source, SnnError::CheckpointIo { .. }), "{source}");
        }
        other => panic!("expected an epoch error, got {:?}", other.map(|_| ())),
    }
    assert_eq!(trainer.phase(), Phase::EpochCheckpointing);
}
