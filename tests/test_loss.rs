//! Tests for the excess cross-entropy loss.

use shift_snn::network::target_distribution;
use shift_snn::{excess_loss, SnnError, TargetEncoder};

fn normalise(row: &[f64]) -> Vec<f64> {
    let s: f64 = row.iter().sum();
    row.iter().map(|v| v / s).collect()
}

#[test]
fn identical_distributions_give_exactly_zero() {
    let targets = TargetEncoder::default().encode(&[1, 4, 9]).unwrap();
    let dist = target_distribution(&targets).unwrap();
    assert_eq!(excess_loss(&dist, &dist).unwrap(), 0.0);
}

#[test]
fn mismatched_distributions_give_positive_loss() {
    let targets = TargetEncoder::default().encode(&[2, 5]).unwrap();
    let target = target_distribution(&targets).unwrap();
    let uniform = vec![vec![0.1; 10]; 2];
    let skewed = vec![
        normalise(&[9.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]),
        normalise(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]),
    ];
    for pred in [uniform, skewed] {
        let loss = excess_loss(&pred, &target).unwrap();
        assert!(loss > 0.0, "loss {loss} must be positive");
    }
}

/// Zero probabilities are clamped rather than producing infinities.
#[test]
fn zero_probabilities_are_clamped() {
    let pred = vec![vec![1.0, 0.0]];
    let target = vec![vec![0.5, 0.5]];
    let loss = excess_loss(&pred, &target).unwrap();
    assert!(loss.is_finite());
    assert!(loss > 0.0);
}

#[test]
fn nan_prediction_is_surfaced() {
    let pred = vec![vec![f64::NAN, 0.5]];
    let target = vec![vec![0.5, 0.5]];
    assert!(matches!(
        excess_loss(&pred, &target),
        Err(SnnError::NumericInstability(_))
    ));
}

#[test]
fn row_count_mismatch_is_rejected() {
    let pred = vec![vec![0.5, 0.5]];
    let target = vec![vec![0.5, 0.5], vec![0.5, 0.5]];
    assert!(matches!(
        excess_loss(&pred, &target),
        Err(SnnError::ShapeMismatch { .. })
    ));
}
