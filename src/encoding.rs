//! Latency coding of inputs and class targets.
use crate::error::{SnnError, SnnResult};
use crate::layers::Matrix;

/// Two-band time-to-first-spike encoder.
///
/// Raw values above `threshold` get `bright_intensity`, the rest get
/// `dark_intensity`; each intensity `x` becomes the time `exp(1 - x)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpikeEncoder {
    pub threshold: f64,
    pub bright_intensity: f64,
    pub dark_intensity: f64,
}

impl Default for SpikeEncoder {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            bright_intensity: 0.01,
            dark_intensity: 2.3,
        }
    }
}

impl SpikeEncoder {
    /// Band a single raw value into one of the two intensities.
    pub fn binarize(&self, value: f64) -> f64 {
        if value > self.threshold {
            self.bright_intensity
        } else {
            self.dark_intensity
        }
    }

    /// Time transform applied after banding.
    pub fn to_time(intensity: f64) -> f64 {
        (1.0 - intensity).exp()
    }

    /// Encode one sample.
    pub fn encode_sample(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .map(|&v| Self::to_time(self.binarize(v)))
            .collect()
    }

    /// Encode a whole batch, one row per sample.
    pub fn encode<R: AsRef<[f64]>>(&self, batch: &[R]) -> Matrix {
        batch
            .iter()
            .map(|row| self.encode_sample(row.as_ref()))
            .collect()
    }
}

/// Per-class target times: `near` for the true class, `far` elsewhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetEncoder {
    pub classes: usize,
    pub near: f64,
    pub far: f64,
}

impl Default for TargetEncoder {
    fn default() -> Self {
        Self {
            classes: 10,
            near: 0.01,
            far: 0.99,
        }
    }
}

impl TargetEncoder {
    pub fn encode(&self, labels: &[usize]) -> SnnResult<Matrix> {
        labels
            .iter()
            .map(|&label| {
                if label >= self.classes {
                    return Err(SnnError::InvalidLabel {
                        label,
                        classes: self.classes,
                    });
                }
                let mut row = vec![self.far; self.classes];
                row[label] = self.near;
                Ok(row)
            })
            .collect()
    }
}
