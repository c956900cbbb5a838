//! Time-to-first-spike spiking neural network classifier trained with
//! shifting learning: spike-timing parameters are nudged by an error signal
//! propagated backward through the layers, without differentiable
//! activations.
//!
//! - Two-band latency encoding of inputs and early/late class targets
//! - Layers with learnable arrival shifts and potential slopes (Adam)
//! - Epoch/batch training loop with decaying shift learning rate
//! - Per-epoch checkpoints and argmin-based evaluation

pub mod activations;
pub mod checkpoint;
pub mod config;
pub mod datasets;
pub mod encoding;
pub mod error;
pub mod eval;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod network;
pub mod trainer;
pub mod utils;

pub use activations::Softmax;
pub use checkpoint::{checkpoint_path, CheckpointId, CheckpointStore, ParamKind};
pub use config::{Device, LayerConfig, TrainingConfig, Variant};
pub use datasets::{batch_ranges, load_mnist, synthetic_digits, Dataset};
pub use encoding::{SpikeEncoder, TargetEncoder};
pub use error::{SnnError, SnnResult};
pub use eval::{evaluate_network, predict_labels, Evaluator};
pub use layers::{Matrix, ShiftLayer, SpikeLayer};
pub use loss::{cross_entropy, excess_loss};
pub use metrics::{argmin_rows, confusion_matrix, EvalReport};
pub use network::{LearningRates, Network};
pub use trainer::{Phase, ProgressRecord, Trainer, TrainingSummary};
pub use utils::{print_model_summary, print_summary_table};
