//! Forward-only evaluation of checkpointed parameters.
use tracing::info;

use crate::activations::Softmax;
use crate::checkpoint::CheckpointStore;
use crate::config::{Device, TrainingConfig};
use crate::datasets::{batch_ranges, Dataset};
use crate::encoding::SpikeEncoder;
use crate::error::{SnnError, SnnResult};
use crate::layers::{Matrix, SpikeLayer};
use crate::metrics::{argmin_rows, confusion_matrix, EvalReport};
use crate::network::Network;

/// Predicted class per sample: argmin of the softmax of the network output.
/// The true class is trained towards the earliest spike, so the smallest
/// probability marks it.
pub fn predict_labels(output: &Matrix) -> SnnResult<Vec<usize>> {
    Ok(argmin_rows(&Softmax.apply_rows(output)?))
}

/// Accuracy of a network over `dataset`. Layers are only run forward.
pub fn evaluate_network<L: SpikeLayer>(
    network: &Network<L>,
    encoder: &SpikeEncoder,
    dataset: &Dataset,
    batch_size: usize,
) -> SnnResult<EvalReport> {
    let mut report = EvalReport::default();
    for range in batch_ranges(dataset.len(), batch_size)? {
        let (features, labels) = dataset.batch(range);
        let output = network.predict(&encoder.encode(features))?;
        report.record(&predict_labels(&output)?, labels);
    }
    Ok(report)
}

/// Evaluation against the checkpoint of the configured variant.
#[derive(Debug, Clone)]
pub struct Evaluator {
    config: TrainingConfig,
    device: Device,
}

impl Evaluator {
    /// `device` is taken as already resolved; the caller decides the
    /// fallback once.
    pub fn new(config: TrainingConfig, device: Device) -> Self {
        Self { config, device }
    }

    /// Load the checkpoint, run the held-out set, and report accuracy.
    pub fn run(&self, dataset: &Dataset) -> SnnResult<EvalReport> {
        if dataset.is_empty() {
            return Err(SnnError::EmptyDataset);
        }
        let store = CheckpointStore::new(&self.config.checkpoint_dir);
        let network = store.load_network(&self.config.variant, self.config.layer, self.device)?;
        info!(variant = %self.config.variant.label, %network, device = %self.device, "evaluating");
        let report = evaluate_network(
            &network,
            &self.config.encoder,
            dataset,
            self.config.eval_batch_size,
        )?;
        info!("Accuracy: {}", report);
        Ok(report)
    }

    /// Confusion matrix of the checkpointed network over `dataset`.
    pub fn confusion(&self, dataset: &Dataset) -> SnnResult<Vec<Vec<usize>>> {
        let store = CheckpointStore::new(&self.config.checkpoint_dir);
        let network = store.load_network(&self.config.variant, self.config.layer, self.device)?;
        let mut predictions = Vec::with_capacity(dataset.len());
        for range in batch_ranges(dataset.len(), self.config.eval_batch_size)? {
            let (features, _) = dataset.batch(range);
            let output = network.predict(&self.config.encoder.encode(features))?;
            predictions.extend(predict_labels(&output)?);
        }
        Ok(confusion_matrix(
            &predictions,
            &dataset.labels,
            self.config.targets.classes,
        ))
    }
}
