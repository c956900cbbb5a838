//! Ordered stack of spiking layers with shifting-learning updates.
use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::activations::Softmax;
use crate::config::{Device, LayerConfig, Variant};
use crate::error::{SnnError, SnnResult};
use crate::layers::{shape, Matrix, ShiftLayer, SpikeLayer};

/// Learning rates for one update step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningRates {
    pub shift: f64,
    pub slope: f64,
}

/// Distributions produced by a backward pass, kept for loss reporting.
#[derive(Debug, Clone)]
pub struct BackwardOutcome {
    /// Softmax of the final layer's output.
    pub predicted: Matrix,
    /// Softmax of the exponentiated target encoding.
    pub target: Matrix,
}

/// Network
///
/// Layer `k`'s output width equals layer `k + 1`'s input width; this is
/// checked once at construction and the stack never changes afterwards.
#[derive(Debug)]
pub struct Network<L = ShiftLayer> {
    layers: Vec<L>,
}

impl Network<ShiftLayer> {
    /// Fresh network for `variant`, all layers placed on `device`.
    pub fn new(variant: &Variant, config: LayerConfig, device: Device, seed: u64) -> SnnResult<Self> {
        variant.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let layers = variant
            .widths
            .windows(2)
            .map(|w| ShiftLayer::new(w[0], w[1], config, device, &mut rng))
            .collect();
        debug!(variant = %variant.label, widths = ?variant.widths, %device, "network built");
        Self::from_layers(layers)
    }

    /// Move every layer's tensors onto `device`.
    pub fn to_device(&mut self, device: Device) {
        for layer in &mut self.layers {
            layer.to_device(device);
        }
    }
}

impl<L: SpikeLayer> Network<L> {
    pub fn from_layers(layers: Vec<L>) -> SnnResult<Self> {
        if layers.is_empty() {
            return Err(SnnError::InvalidConfig("network has no layers".into()));
        }
        for (k, pair) in layers.windows(2).enumerate() {
            if pair[0].outputs() != pair[1].inputs() {
                return Err(SnnError::shape_mismatch(
                    k + 1,
                    vec![pair[0].outputs()],
                    vec![pair[1].inputs()],
                ));
            }
        }
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[L] {
        &self.layers
    }

    pub fn input_width(&self) -> usize {
        self.layers[0].inputs()
    }

    pub fn output_width(&self) -> usize {
        self.layers[self.layers.len() - 1].outputs()
    }

    /// Run every layer left to right. Returns all activations, starting with
    /// `input` itself and ending with the network output.
    pub fn forward(&self, input: &Matrix) -> SnnResult<Vec<Matrix>> {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(input.clone());
        for (k, layer) in self.layers.iter().enumerate() {
            let current = &activations[k];
            if let Some(row) = current.iter().find(|r| r.len() != layer.inputs()) {
                return Err(SnnError::shape_mismatch(
                    k,
                    vec![current.len(), layer.inputs()],
                    vec![current.len(), row.len()],
                ));
            }
            let next = layer.forward(current).map_err(|e| at_layer(e, k))?;
            activations.push(next);
        }
        Ok(activations)
    }

    /// Network output only.
    pub fn predict(&self, input: &Matrix) -> SnnResult<Matrix> {
        let mut activations = self.forward(input)?;
        activations
            .pop()
            .ok_or_else(|| SnnError::InvalidConfig("network has no layers".into()))
    }

    /// Read-only sweep from the output delta down to the first layer.
    /// `deltas[k]` is the error signal at layer `k`'s output.
    pub fn compute_deltas(&self, activations: &[Matrix], output_delta: Matrix) -> SnnResult<Vec<Matrix>> {
        self.check_activations(activations)?;
        let n = self.layers.len();
        let mut deltas = vec![Vec::new(); n];
        deltas[n - 1] = output_delta;
        for k in (1..n).rev() {
            let upstream = self.layers[k]
                .pass_delta(&deltas[k], &activations[k], &activations[k + 1])
                .map_err(|e| at_layer(e, k))?;
            deltas[k - 1] = upstream;
        }
        Ok(deltas)
    }

    /// One shifting-learning step.
    ///
    /// Every delta is derived from pre-update parameters before any layer
    /// is touched; updates then run from the last layer to the first.
    pub fn backward_pass(
        &mut self,
        activations: &[Matrix],
        target: &Matrix,
        rates: LearningRates,
    ) -> SnnResult<BackwardOutcome> {
        self.check_activations(activations)?;
        let output = &activations[activations.len() - 1];
        if shape(target) != shape(output) || target.iter().any(|r| r.len() != self.output_width()) {
            return Err(SnnError::shape_mismatch(
                self.layers.len() - 1,
                shape(output),
                shape(target),
            ));
        }
        let predicted = Softmax.apply_rows(output)?;
        let target = target_distribution(target)?;
        let output_delta: Matrix = predicted
            .iter()
            .zip(&target)
            .map(|(p, t)| p.iter().zip(t).map(|(&p, &t)| p - t).collect())
            .collect();

        let deltas = self.compute_deltas(activations, output_delta)?;
        for (k, layer) in self.layers.iter_mut().enumerate().rev() {
            layer
                .backward(&deltas[k], &activations[k], &activations[k + 1], rates.shift, rates.slope)
                .map_err(|e| at_layer(e, k))?;
        }
        Ok(BackwardOutcome { predicted, target })
    }

    fn check_activations(&self, activations: &[Matrix]) -> SnnResult<()> {
        if activations.len() != self.layers.len() + 1 {
            return Err(SnnError::shape_mismatch(
                0,
                vec![self.layers.len() + 1],
                vec![activations.len()],
            ));
        }
        Ok(())
    }
}

/// Softmax over the exponentiated target times.
pub fn target_distribution(target: &Matrix) -> SnnResult<Matrix> {
    target
        .iter()
        .map(|row| {
            let exp: Vec<f64> = row.iter().map(|t| t.exp()).collect();
            Softmax.apply_vec(&exp)
        })
        .collect()
}

fn at_layer(err: SnnError, layer: usize) -> SnnError {
    match err {
        SnnError::ShapeMismatch {
            expected, actual, ..
        } => SnnError::ShapeMismatch {
            layer,
            expected,
            actual,
        },
        SnnError::NumericInstability(msg) => {
            SnnError::NumericInstability(format!("layer {}: {}", layer, msg))
        }
        other => other,
    }
}

impl<L: SpikeLayer> fmt::Display for Network<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sizes = vec![self.input_width()];
        for layer in &self.layers {
            sizes.push(layer.outputs());
        }
        write!(f, "SNN: {:?}", sizes)
    }
}
