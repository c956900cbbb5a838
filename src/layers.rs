//! Spiking layers with learnable arrival shifts and potential slopes.
use rand::rngs::StdRng;
use rand::Rng;

use crate::checkpoint::ParamKind;
use crate::config::{Device, LayerConfig};
use crate::error::{SnnError, SnnResult};

/// Matrix type, row-major. Batches are one row per sample; parameters are
/// `inputs × outputs`.
pub type Matrix = Vec<Vec<f64>>;

/// The capability the network needs from a layer.
///
/// The batch size is the row count of the matrices passed in. `input` and
/// `output` are the activations bracketing the layer from the forward pass
/// that produced `delta`.
pub trait SpikeLayer {
    fn inputs(&self) -> usize;
    fn outputs(&self) -> usize;

    /// Output spike times for a batch of input spike times.
    fn forward(&self, input: &Matrix) -> SnnResult<Matrix>;

    /// Error signal for the layer below. Must not touch any state.
    fn pass_delta(&self, delta: &Matrix, input: &Matrix, output: &Matrix) -> SnnResult<Matrix>;

    /// Update parameters and optimizer moments in place.
    fn backward(
        &mut self,
        delta: &Matrix,
        input: &Matrix,
        output: &Matrix,
        lr_shift: f64,
        lr_slope: f64,
    ) -> SnnResult<()>;

    /// Parameter tensor for checkpointing.
    fn parameter(&self, kind: ParamKind) -> &Matrix;
}

/// First and second Adam moments for one parameter tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Moments {
    pub m: Matrix,
    pub v: Matrix,
}

impl Moments {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            m: vec![vec![0.0; cols]; rows],
            v: vec![vec![0.0; cols]; rows],
        }
    }

    /// Bias-corrected Adam step on `param` with gradient `grad`.
    fn step(&mut self, param: &mut Matrix, grad: &Matrix, lr: f64, t: u64, cfg: &LayerConfig) {
        let t = t as f64;
        let lr_t = lr * (1.0 - cfg.beta2.powf(t)).sqrt() / (1.0 - cfg.beta1.powf(t));
        for (((p_row, g_row), m_row), v_row) in param
            .iter_mut()
            .zip(grad)
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            for (((p, &g), m), v) in p_row
                .iter_mut()
                .zip(g_row)
                .zip(m_row.iter_mut())
                .zip(v_row.iter_mut())
            {
                *m = cfg.beta1 * *m + (1.0 - cfg.beta1) * g;
                *v = cfg.beta2 * *v + (1.0 - cfg.beta2) * g * g;
                *p -= lr_t * *m / (v.sqrt() + cfg.epsilon);
            }
        }
    }
}

/// Feed-forward spiking stage.
///
/// Input `i` reaches neuron `j` at `a_ij = z_i + shift_ij`; from then on it
/// ramps the membrane potential with slope `slope_ij`. The neuron fires when
/// the potential reaches the threshold, giving
/// `t_j = (threshold + Σ_C slope·a) / Σ_C slope` over the causal set `C` of
/// inputs that arrived strictly before `t_j`. Neurons that never fire (or
/// fire later than `silent_time`) report `silent_time` and have no causal
/// inputs.
#[derive(Debug, Clone)]
pub struct ShiftLayer {
    pub shift: Matrix,
    pub slope: Matrix,
    pub shift_moments: Moments,
    pub slope_moments: Moments,
    /// Number of optimizer steps taken.
    pub steps: u64,
    config: LayerConfig,
    device: Device,
}

impl ShiftLayer {
    /// Fresh layer: shifts `U(0, 1)`, slopes `U(0, 2/inputs)`.
    pub fn new(
        inputs: usize,
        outputs: usize,
        config: LayerConfig,
        device: Device,
        rng: &mut StdRng,
    ) -> Self {
        let slope_limit = 2.0 / inputs as f64;
        let shift: Matrix = (0..inputs)
            .map(|_| (0..outputs).map(|_| rng.gen_range(0.0..1.0)).collect())
            .collect();
        let slope: Matrix = (0..inputs)
            .map(|_| (0..outputs).map(|_| rng.gen_range(0.0..slope_limit)).collect())
            .collect();
        Self::assemble(shift, slope, config, device)
    }

    /// Rebuild a layer from stored parameters. Moments start at zero.
    pub fn from_parameters(
        shift: Matrix,
        slope: Matrix,
        config: LayerConfig,
        device: Device,
    ) -> SnnResult<Self> {
        let (rows, cols) = dims(&shift);
        if rows == 0 || cols == 0 || shift.iter().any(|r| r.len() != cols) {
            return Err(SnnError::shape_mismatch(0, vec![rows, cols], shape(&shift)));
        }
        if dims(&slope) != (rows, cols) || slope.iter().any(|r| r.len() != cols) {
            return Err(SnnError::shape_mismatch(0, vec![rows, cols], shape(&slope)));
        }
        Ok(Self::assemble(shift, slope, config, device))
    }

    fn assemble(shift: Matrix, slope: Matrix, config: LayerConfig, device: Device) -> Self {
        let (rows, cols) = dims(&shift);
        Self {
            shift,
            slope,
            shift_moments: Moments::zeros(rows, cols),
            slope_moments: Moments::zeros(rows, cols),
            steps: 0,
            config,
            device,
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Place parameters and moments on `device`. Only the CPU holds
    /// tensors, so this records the placement.
    pub fn to_device(&mut self, device: Device) {
        self.device = device;
    }

    /// Spike time of a single neuron from its `(arrival, slope)` pairs.
    fn fire_time(&self, arrivals: &mut [(f64, f64)]) -> f64 {
        arrivals.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
        let mut sum_w = 0.0;
        let mut sum_wa = 0.0;
        for k in 0..arrivals.len() {
            let (a, w) = arrivals[k];
            sum_w += w;
            sum_wa += w * a;
            if sum_w <= 0.0 {
                continue;
            }
            let t = (self.config.threshold + sum_wa) / sum_w;
            let next = arrivals.get(k + 1).map_or(f64::INFINITY, |p| p.0);
            if t > a && t <= next {
                return t.min(self.config.silent_time);
            }
        }
        self.config.silent_time
    }

    /// Summed slope over the causal set of every neuron for one sample.
    /// Silent neurons get zero.
    fn causal_slopes(&self, z: &[f64], out: &[f64]) -> Vec<f64> {
        let mut total = vec![0.0; out.len()];
        for ((&zi, s_row), w_row) in z.iter().zip(&self.shift).zip(&self.slope) {
            for (j, &t) in out.iter().enumerate() {
                if t < self.config.silent_time && zi + s_row[j] < t {
                    total[j] += w_row[j];
                }
            }
        }
        total
    }

    fn check_batch(&self, m: &Matrix, width: usize, rows: usize) -> SnnResult<()> {
        if m.len() != rows {
            return Err(SnnError::shape_mismatch(0, vec![rows, width], shape(m)));
        }
        if let Some(bad) = m.iter().find(|r| r.len() != width) {
            return Err(SnnError::shape_mismatch(
                0,
                vec![m.len(), width],
                vec![m.len(), bad.len()],
            ));
        }
        Ok(())
    }

    fn check_bracket(&self, delta: &Matrix, input: &Matrix, output: &Matrix) -> SnnResult<()> {
        let rows = delta.len();
        self.check_batch(delta, self.outputs(), rows)?;
        self.check_batch(input, self.inputs(), rows)?;
        self.check_batch(output, self.outputs(), rows)
    }
}

impl SpikeLayer for ShiftLayer {
    fn inputs(&self) -> usize {
        self.shift.len()
    }

    fn outputs(&self) -> usize {
        self.shift.first().map_or(0, Vec::len)
    }

    fn forward(&self, input: &Matrix) -> SnnResult<Matrix> {
        self.check_batch(input, self.inputs(), input.len())?;
        let (n_in, n_out) = (self.inputs(), self.outputs());
        // column-major copy so each neuron's synapses are contiguous
        let mut columns = vec![Vec::with_capacity(n_in); n_out];
        for (s_row, w_row) in self.shift.iter().zip(&self.slope) {
            for (j, col) in columns.iter_mut().enumerate() {
                col.push((s_row[j], w_row[j]));
            }
        }
        let mut arrivals = Vec::with_capacity(n_in);
        let output: Matrix = input
            .iter()
            .map(|z| {
                columns
                    .iter()
                    .map(|col| {
                        arrivals.clear();
                        arrivals.extend(z.iter().zip(col).map(|(&zi, &(s, w))| (zi + s, w)));
                        self.fire_time(&mut arrivals)
                    })
                    .collect()
            })
            .collect();
        Ok(output)
    }

    fn pass_delta(&self, delta: &Matrix, input: &Matrix, output: &Matrix) -> SnnResult<Matrix> {
        self.check_bracket(delta, input, output)?;
        let mut upstream = vec![vec![0.0; self.inputs()]; delta.len()];
        for (((d, z), out), up) in delta.iter().zip(input).zip(output).zip(upstream.iter_mut()) {
            let total = self.causal_slopes(z, out);
            for (i, (&zi, (s_row, w_row))) in z.iter().zip(self.shift.iter().zip(&self.slope)).enumerate() {
                let mut acc = 0.0;
                for j in 0..out.len() {
                    if total[j] > 0.0 && zi + s_row[j] < out[j] {
                        acc += d[j] * w_row[j] / total[j];
                    }
                }
                up[i] = acc;
            }
        }
        Ok(upstream)
    }

    fn backward(
        &mut self,
        delta: &Matrix,
        input: &Matrix,
        output: &Matrix,
        lr_shift: f64,
        lr_slope: f64,
    ) -> SnnResult<()> {
        self.check_bracket(delta, input, output)?;
        if delta.is_empty() {
            return Ok(());
        }
        let (n_in, n_out) = (self.inputs(), self.outputs());
        let mut g_shift = vec![vec![0.0; n_out]; n_in];
        let mut g_slope = vec![vec![0.0; n_out]; n_in];
        for ((d, z), out) in delta.iter().zip(input).zip(output) {
            let total = self.causal_slopes(z, out);
            for (i, &zi) in z.iter().enumerate() {
                let (s_row, w_row) = (&self.shift[i], &self.slope[i]);
                for j in 0..n_out {
                    let a = zi + s_row[j];
                    if total[j] > 0.0 && a < out[j] {
                        g_shift[i][j] += d[j] * w_row[j] / total[j];
                        g_slope[i][j] += d[j] * (a - out[j]) / total[j];
                    }
                }
            }
        }
        let scale = 1.0 / delta.len() as f64;
        for row in g_shift.iter_mut().chain(g_slope.iter_mut()) {
            for g in row.iter_mut() {
                *g *= scale;
            }
        }

        self.steps += 1;
        let cfg = self.config;
        self.shift_moments
            .step(&mut self.shift, &g_shift, lr_shift, self.steps, &cfg);
        self.slope_moments
            .step(&mut self.slope, &g_slope, lr_slope, self.steps, &cfg);

        let finite = |m: &Matrix| m.iter().flatten().all(|v| v.is_finite());
        if !finite(&self.shift) || !finite(&self.slope) {
            return Err(SnnError::numeric(format!(
                "non-finite parameter after update step {}",
                self.steps
            )));
        }
        Ok(())
    }

    fn parameter(&self, kind: ParamKind) -> &Matrix {
        match kind {
            ParamKind::Shift => &self.shift,
            ParamKind::Slope => &self.slope,
        }
    }
}

fn dims(m: &Matrix) -> (usize, usize) {
    (m.len(), m.first().map_or(0, Vec::len))
}

pub(crate) fn shape(m: &Matrix) -> Vec<usize> {
    let (r, c) = dims(m);
    vec![r, c]
}
