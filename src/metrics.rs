//! Classification metrics over argmin predictions.
use std::fmt;

use crate::layers::Matrix;

/// Index of the smallest value; the first one wins on ties.
pub fn argmin(row: &[f64]) -> usize {
    row.iter()
        .enumerate()
        .fold(0usize, |min_i, (i, &v)| if v < row[min_i] { i } else { min_i })
}

/// Predicted class per row. The earliest (smallest) entry is the class,
/// matching targets that give the true class the earliest time.
pub fn argmin_rows(m: &Matrix) -> Vec<usize> {
    m.iter().map(|row| argmin(row)).collect()
}

/// Exact-match count over an evaluation set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalReport {
    pub correct: usize,
    pub total: usize,
}

impl EvalReport {
    pub fn record(&mut self, predictions: &[usize], labels: &[usize]) {
        self.correct += predictions
            .iter()
            .zip(labels)
            .filter(|(p, l)| p == l)
            .count();
        self.total += labels.len();
    }

    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    pub fn percent(&self) -> f64 {
        100.0 * self.fraction()
    }
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({:.3} %)", self.correct, self.total, self.percent())
    }
}

/// Simple confusion matrix (rows: true class, columns: predicted)
pub fn confusion_matrix(predictions: &[usize], labels: &[usize], num_classes: usize) -> Vec<Vec<usize>> {
    let mut cm = vec![vec![0; num_classes]; num_classes];
    for (&p, &l) in predictions.iter().zip(labels) {
        if p < num_classes && l < num_classes {
            cm[l][p] += 1;
        }
    }
    cm
}
