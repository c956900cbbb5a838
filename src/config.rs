//! Run configuration: compiled-in hyperparameters, network variants and
//! device placement.
//!
//! A [`TrainingConfig`] is built once and handed to every component at
//! construction; nothing rereads it mid-run.
use std::fmt;
use std::path::PathBuf;

use tracing::warn;

use crate::encoding::{SpikeEncoder, TargetEncoder};
use crate::error::{SnnError, SnnResult};

/// Compute device for layer tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    /// Accelerator with the given ordinal.
    Accelerator(usize),
}

impl Device {
    /// Check that the device can hold tensors.
    pub fn probe(self) -> SnnResult<Device> {
        match self {
            Device::Cpu => Ok(Device::Cpu),
            Device::Accelerator(ordinal) => Err(SnnError::DeviceUnavailable(format!(
                "accelerator {} requested but no accelerator backend is built in",
                ordinal
            ))),
        }
    }

    /// Probe the device, falling back to the CPU when it is absent.
    pub fn resolve(self) -> Device {
        match self.probe() {
            Ok(device) => device,
            Err(e) => {
                warn!("{}; falling back to cpu", e);
                Device::Cpu
            }
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Accelerator(n) => write!(f, "accelerator:{}", n),
        }
    }
}

/// A network depth/width configuration with its own checkpoint namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub label: String,
    /// Layer widths from input to output; `widths.len() - 1` layers.
    pub widths: Vec<usize>,
}

impl Variant {
    pub fn new(label: impl Into<String>, widths: Vec<usize>) -> Self {
        Self {
            label: label.into(),
            widths,
        }
    }

    /// 784 → 800 → 10
    pub fn two_layer() -> Self {
        Self::new("SL_mnist", vec![784, 800, 10])
    }

    /// 784 → 400 → 400 → 10
    pub fn three_layer() -> Self {
        Self::new("SL_mly_mnist", vec![784, 400, 400, 10])
    }

    pub fn layer_count(&self) -> usize {
        self.widths.len().saturating_sub(1)
    }

    pub fn input_width(&self) -> usize {
        self.widths.first().copied().unwrap_or(0)
    }

    pub fn output_width(&self) -> usize {
        self.widths.last().copied().unwrap_or(0)
    }

    pub fn validate(&self) -> SnnResult<()> {
        if self.label.is_empty() || self.label.contains(['/', '\\']) {
            return Err(SnnError::InvalidConfig(format!(
                "variant label {:?} is not a plain file-name prefix",
                self.label
            )));
        }
        if self.widths.len() < 2 {
            return Err(SnnError::InvalidConfig(
                "a variant needs at least one layer".into(),
            ));
        }
        if self.widths.contains(&0) {
            return Err(SnnError::InvalidConfig(format!(
                "zero-width layer in {:?}",
                self.widths
            )));
        }
        Ok(())
    }
}

/// Neuron and optimizer constants shared by every layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerConfig {
    /// Potential a neuron must reach to fire.
    pub threshold: f64,
    /// Output time reported by a neuron that never fires.
    pub silent_time: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            silent_time: 10.0,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub variant: Variant,
    pub epochs: usize,
    /// Shift learning rate at epoch 0; decays geometrically to `lr_shift_end`.
    pub lr_shift_start: f64,
    pub lr_shift_end: f64,
    /// Slope learning rate, constant across epochs.
    pub lr_slope: f64,
    pub batch_size: usize,
    pub eval_batch_size: usize,
    /// Emit a progress record every `log_every` batches.
    pub log_every: usize,
    pub checkpoint_dir: PathBuf,
    pub device: Device,
    /// Seed for parameter initialisation.
    pub seed: u64,
    pub encoder: SpikeEncoder,
    pub targets: TargetEncoder,
    pub layer: LayerConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            variant: Variant::two_layer(),
            epochs: 20,
            lr_shift_start: 1e-4,
            lr_shift_end: 1e-6,
            lr_slope: 1e-4,
            batch_size: 128,
            eval_batch_size: 100,
            log_every: 10,
            checkpoint_dir: PathBuf::from("parameters_record"),
            device: Device::Cpu,
            seed: 0x5eed,
            encoder: SpikeEncoder::default(),
            targets: TargetEncoder::default(),
            layer: LayerConfig::default(),
        }
    }
}

impl TrainingConfig {
    pub fn with_variant(variant: Variant) -> Self {
        Self {
            variant,
            ..Self::default()
        }
    }

    /// `lr_shift_start * (lr_shift_end / lr_shift_start)^(epoch / epochs)`
    pub fn lr_shift_for_epoch(&self, epoch: usize) -> f64 {
        let progress = epoch as f64 / self.epochs as f64;
        self.lr_shift_start * (self.lr_shift_end / self.lr_shift_start).powf(progress)
    }

    pub fn validate(&self) -> SnnResult<()> {
        self.variant.validate()?;
        if self.epochs == 0 {
            return Err(SnnError::InvalidConfig("epochs must be > 0".into()));
        }
        if self.batch_size == 0 || self.eval_batch_size == 0 {
            return Err(SnnError::InvalidConfig("batch sizes must be > 0".into()));
        }
        if self.log_every == 0 {
            return Err(SnnError::InvalidConfig("log_every must be > 0".into()));
        }
        for (name, lr) in [
            ("lr_shift_start", self.lr_shift_start),
            ("lr_shift_end", self.lr_shift_end),
            ("lr_slope", self.lr_slope),
        ] {
            if !(lr.is_finite() && lr > 0.0) {
                return Err(SnnError::InvalidConfig(format!(
                    "{} must be finite and > 0, got {}",
                    name, lr
                )));
            }
        }
        if self.targets.classes != self.variant.output_width() {
            return Err(SnnError::InvalidConfig(format!(
                "{} target classes but the network emits {} outputs",
                self.targets.classes,
                self.variant.output_width()
            )));
        }
        if !(self.layer.threshold > 0.0) || !self.layer.silent_time.is_finite() {
            return Err(SnnError::InvalidConfig(
                "threshold must be > 0 and silent_time finite".into(),
            ));
        }
        Ok(())
    }
}
