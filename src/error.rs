//! Error types for training and evaluation.
//!
//! Every fatal condition in the core is one of these variants. Only
//! [`SnnError::DeviceUnavailable`] is ever recovered from (see
//! [`crate::config::Device::resolve`]); everything else aborts the run.
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used by the orchestration code.
pub type SnnResult<T> = Result<T, SnnError>;

#[derive(Debug, Error)]
pub enum SnnError {
    /// Layer width chaining or tensor shape violated.
    #[error("shape mismatch at layer {layer}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        layer: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The requested accelerator is not available.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Reading or writing a checkpoint file failed.
    #[error("checkpoint I/O failed for {path:?}: {source}")]
    CheckpointIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A checkpoint file exists but its contents are not a valid tensor.
    #[error("malformed checkpoint {path:?}: {message}")]
    CheckpointFormat { path: PathBuf, message: String },

    /// A loss, probability or parameter became non-finite.
    #[error("numeric instability: {0}")]
    NumericInstability(String),

    #[error("label {label} out of range for {classes} classes")]
    InvalidLabel { label: usize, classes: usize },

    #[error("dataset is empty")]
    EmptyDataset,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Any fatal error raised while processing one training batch.
    /// Epoch and batch are both one-based.
    #[error("epoch {epoch}, batch {batch}: {source}")]
    Step {
        epoch: usize,
        batch: usize,
        #[source]
        source: Box<SnnError>,
    },

    /// A fatal error at an epoch boundary (checkpointing or evaluation).
    /// The epoch is one-based.
    #[error("epoch {epoch}: {source}")]
    Epoch {
        epoch: usize,
        #[source]
        source: Box<SnnError>,
    },
}

impl SnnError {
    pub fn shape_mismatch(layer: usize, expected: Vec<usize>, actual: Vec<usize>) -> Self {
        SnnError::ShapeMismatch {
            layer,
            expected,
            actual,
        }
    }

    pub fn checkpoint_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnnError::CheckpointIo {
            path: path.into(),
            source,
        }
    }

    pub fn checkpoint_format<S: Into<String>>(path: impl Into<PathBuf>, message: S) -> Self {
        SnnError::CheckpointFormat {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn numeric<S: Into<String>>(msg: S) -> Self {
        SnnError::NumericInstability(msg.into())
    }

    /// Attach the epoch/batch position to an error raised inside a batch.
    /// Both numbers are one-based.
    pub fn at_step(self, epoch: usize, batch: usize) -> Self {
        SnnError::Step {
            epoch,
            batch,
            source: Box::new(self),
        }
    }

    /// Attach the one-based epoch to an error raised at an epoch boundary.
    pub fn at_epoch(self, epoch: usize) -> Self {
        SnnError::Epoch {
            epoch,
            source: Box::new(self),
        }
    }
}
