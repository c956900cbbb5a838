//! Row-wise softmax used to turn spike times into distributions.
use crate::error::{SnnError, SnnResult};
use crate::layers::Matrix;

/// Softmax (vector-only)
#[derive(Debug, Clone, Copy, Default)]
pub struct Softmax;

impl Softmax {
    /// Max-shifted softmax. Non-finite input or a degenerate normaliser is
    /// reported instead of being smoothed over.
    pub fn apply_vec(&self, x: &[f64]) -> SnnResult<Vec<f64>> {
        if x.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(bad) = x.iter().find(|v| !v.is_finite()) {
            return Err(SnnError::numeric(format!("softmax input contains {}", bad)));
        }
        let max = x.iter().fold(f64::MIN, |a, &b| a.max(b));
        let exps: Vec<f64> = x.iter().map(|&xi| (xi - max).exp()).collect();
        let exp_sum: f64 = exps.iter().sum();
        if !exp_sum.is_finite() || exp_sum <= 0.0 {
            return Err(SnnError::numeric(format!(
                "softmax normaliser is {}",
                exp_sum
            )));
        }
        Ok(exps.into_iter().map(|e| e / exp_sum).collect())
    }

    pub fn apply_rows(&self, m: &Matrix) -> SnnResult<Matrix> {
        m.iter().map(|row| self.apply_vec(row)).collect()
    }
}
