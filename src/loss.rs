//! Excess cross-entropy between predicted and target distributions.
use crate::error::{SnnError, SnnResult};
use crate::layers::Matrix;

/// Probabilities are clamped into `[PROB_FLOOR, 1]` before the logarithm.
pub const PROB_FLOOR: f64 = 1e-5;

/// Batch-mean cross-entropy `-Σ target · ln(clamp(pred))`.
pub fn cross_entropy(pred: &Matrix, target: &Matrix) -> SnnResult<f64> {
    if pred.len() != target.len() {
        return Err(SnnError::shape_mismatch(
            0,
            vec![target.len()],
            vec![pred.len()],
        ));
    }
    if pred.is_empty() {
        return Err(SnnError::EmptyDataset);
    }
    let mut total = 0.0;
    for (p_row, t_row) in pred.iter().zip(target) {
        if p_row.len() != t_row.len() {
            return Err(SnnError::shape_mismatch(
                0,
                vec![t_row.len()],
                vec![p_row.len()],
            ));
        }
        for (&p, &t) in p_row.iter().zip(t_row) {
            total -= p.clamp(PROB_FLOOR, 1.0).ln() * t;
        }
    }
    Ok(total / pred.len() as f64)
}

/// `|CE(pred, target) - CE(target, target)|`: zero only when the
/// prediction matches the target.
pub fn excess_loss(pred: &Matrix, target: &Matrix) -> SnnResult<f64> {
    let ce = cross_entropy(pred, target)?;
    let ce_min = cross_entropy(target, target)?;
    let loss = (ce - ce_min).abs();
    if !loss.is_finite() {
        return Err(SnnError::numeric(format!(
            "loss is {} (ce {}, ce_min {})",
            loss, ce, ce_min
        )));
    }
    Ok(loss)
}
