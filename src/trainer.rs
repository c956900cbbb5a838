//! Epoch/batch training loop with learning-rate decay, checkpointing and
//! per-epoch evaluation.
//!
//! ```text
//! Initializing ─► EpochRunning ─► BatchRunning ─┐
//!                      ▲                         │ (last batch)
//!                      │                         ▼
//!                      └──── Evaluating ◄── EpochCheckpointing
//!                                │ (last epoch)
//!                                ▼
//!                            Completed
//! ```
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::checkpoint::CheckpointStore;
use crate::config::{Device, TrainingConfig};
use crate::datasets::{batch_ranges, Dataset};
use crate::error::{SnnError, SnnResult};
use crate::eval::Evaluator;
use crate::loss::excess_loss;
use crate::metrics::EvalReport;
use crate::network::{LearningRates, Network};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    EpochRunning,
    BatchRunning,
    EpochCheckpointing,
    Evaluating,
    Completed,
}

/// Emitted every `log_every` batches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressRecord {
    /// One-based epoch number.
    pub epoch: usize,
    pub samples_seen: usize,
    pub total_samples: usize,
    pub percent: f64,
    pub loss: f64,
}

#[derive(Debug, Clone)]
pub struct EpochSummary {
    pub epoch: usize,
    pub lr_shift: f64,
    /// Wall time since training started, at the end of this epoch.
    pub elapsed: Duration,
    pub accuracy: EvalReport,
}

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub elapsed: Duration,
    /// Loss of every logged batch, in order.
    pub loss_history: Vec<f64>,
    pub progress: Vec<ProgressRecord>,
    pub epochs: Vec<EpochSummary>,
}

pub struct Trainer {
    config: TrainingConfig,
    network: Network,
    device: Device,
    phase: Phase,
}

impl Trainer {
    /// Validate the configuration, pick the device once and build the
    /// network on it.
    pub fn new(config: TrainingConfig) -> SnnResult<Self> {
        config.validate()?;
        let device = config.device.resolve();
        let mut network = Network::new(&config.variant, config.layer, device, config.seed)?;
        network.to_device(device);
        info!(%network, %device, variant = %config.variant.label, "trainer initialised");
        Ok(Self {
            config,
            network,
            device,
            phase: Phase::Initializing,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }

    /// Train on the first `train_samples` of `train`, checkpointing and
    /// evaluating on `held_out` after every epoch.
    pub fn run(
        &mut self,
        train: &Dataset,
        train_samples: usize,
        held_out: &Dataset,
    ) -> SnnResult<TrainingSummary> {
        let sn = train_samples.min(train.len());
        if sn == 0 {
            return Err(SnnError::EmptyDataset);
        }
        let batches = batch_ranges(sn, self.config.batch_size)?;
        let store = CheckpointStore::new(&self.config.checkpoint_dir);
        let evaluator = Evaluator::new(self.config.clone(), self.device);

        let mut loss_history = Vec::new();
        let mut progress = Vec::new();
        let mut epochs = Vec::with_capacity(self.config.epochs);
        let start = Instant::now();

        for epoch in 0..self.config.epochs {
            self.enter(Phase::EpochRunning);
            let rates = LearningRates {
                shift: self.config.lr_shift_for_epoch(epoch),
                slope: self.config.lr_slope,
            };
            debug!(epoch = epoch + 1, lr_shift = rates.shift, lr_slope = rates.slope, "epoch start");

            self.enter(Phase::BatchRunning);
            for (bi, range) in batches.iter().enumerate() {
                let loss = self
                    .train_batch(train, range.clone(), rates)
                    .map_err(|e| e.at_step(epoch + 1, bi + 1))?;
                if bi % self.config.log_every == 0 {
                    let record = ProgressRecord {
                        epoch: epoch + 1,
                        samples_seen: bi * self.config.batch_size,
                        total_samples: sn,
                        percent: 100.0 * (bi * self.config.batch_size) as f64 / sn as f64,
                        loss,
                    };
                    info!(
                        "Current Training epoch: {}\tProgress: [{}/{}({:.0} %)]\tError: {:.6}",
                        record.epoch, record.samples_seen, sn, record.percent, loss
                    );
                    loss_history.push(loss);
                    progress.push(record);
                }
            }
            info!("Time consuming: {:.3} s", start.elapsed().as_secs_f64());

            self.enter(Phase::EpochCheckpointing);
            store
                .save_network(&self.config.variant.label, &self.network)
                .map_err(|e| e.at_epoch(epoch + 1))?;

            self.enter(Phase::Evaluating);
            info!("Accuracy on test data:");
            let accuracy = evaluator.run(held_out).map_err(|e| e.at_epoch(epoch + 1))?;
            epochs.push(EpochSummary {
                epoch: epoch + 1,
                lr_shift: rates.shift,
                elapsed: start.elapsed(),
                accuracy,
            });
        }

        self.enter(Phase::Completed);
        let elapsed = start.elapsed();
        info!("Time consuming: {:.3} s", elapsed.as_secs_f64());
        info!(entries = loss_history.len(), "loss: {:?}", loss_history);
        Ok(TrainingSummary {
            elapsed,
            loss_history,
            progress,
            epochs,
        })
    }

    /// Encode, forward, shifting-learning update and loss for one batch.
    fn train_batch(
        &mut self,
        train: &Dataset,
        range: std::ops::Range<usize>,
        rates: LearningRates,
    ) -> SnnResult<f64> {
        let (features, labels) = train.batch(range);
        let input = self.config.encoder.encode(features);
        let target = self.config.targets.encode(labels)?;
        let activations = self.network.forward(&input)?;
        let outcome = self.network.backward_pass(&activations, &target, rates)?;
        excess_loss(&outcome.predicted, &outcome.target)
    }
}
