//! Integration tests for [`shift_snn::network`].

use std::cell::RefCell;
use std::rc::Rc;

use shift_snn::{
    predict_labels, CheckpointStore, Device, LayerConfig, LearningRates, Matrix, Network, ParamKind,
    ShiftLayer, SnnError, SnnResult, SpikeLayer, TargetEncoder, Variant,
};

const RATES: LearningRates = LearningRates {
    shift: 1e-3,
    slope: 1e-3,
};

// ---------------------------------------------------------------------------
// Recording layer: logs every delta/update call with the parameter version
// it observed.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Pass { layer: usize, version: usize },
    Backward { layer: usize },
}

struct Recorder {
    index: usize,
    inputs: usize,
    outputs: usize,
    version: usize,
    param: Matrix,
    log: Rc<RefCell<Vec<Event>>>,
}

impl Recorder {
    fn stack(widths: &[usize], log: &Rc<RefCell<Vec<Event>>>) -> Vec<Recorder> {
        widths
            .windows(2)
            .enumerate()
            .map(|(index, w)| Recorder {
                index,
                inputs: w[0],
                outputs: w[1],
                version: 0,
                param: vec![vec![0.0; w[1]]; w[0]],
                log: Rc::clone(log),
            })
            .collect()
    }
}

impl SpikeLayer for Recorder {
    fn inputs(&self) -> usize {
        self.inputs
    }

    fn outputs(&self) -> usize {
        self.outputs
    }

    fn forward(&self, input: &Matrix) -> SnnResult<Matrix> {
        Ok(input
            .iter()
            .map(|row| vec![row.iter().sum::<f64>() / row.len() as f64; self.outputs])
            .collect())
    }

    fn pass_delta(&self, delta: &Matrix, _input: &Matrix, _output: &Matrix) -> SnnResult<Matrix> {
        self.log.borrow_mut().push(Event::Pass {
            layer: self.index,
            version: self.version,
        });
        Ok(delta
            .iter()
            .map(|row| vec![row.iter().sum::<f64>(); self.inputs])
            .collect())
    }

    fn backward(&mut self, _delta: &Matrix, _input: &Matrix, _output: &Matrix, _s: f64, _p: f64) -> SnnResult<()> {
        self.log.borrow_mut().push(Event::Backward { layer: self.index });
        self.version += 1;
        Ok(())
    }

    fn parameter(&self, _kind: ParamKind) -> &Matrix {
        &self.param
    }
}

/// Every delta is derived before the first update, and updates run from the
/// last layer to the first.
#[test]
fn deltas_are_computed_before_any_update() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut net = Network::from_layers(Recorder::stack(&[4, 3, 3, 2], &log)).unwrap();
    let input = vec![vec![0.3, 2.7, 0.3, 0.3]; 2];
    let activations = net.forward(&input).unwrap();
    let target = TargetEncoder { classes: 2, near: 0.01, far: 0.99 }
        .encode(&[0, 1])
        .unwrap();
    net.backward_pass(&activations, &target, RATES).unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            Event::Pass { layer: 2, version: 0 },
            Event::Pass { layer: 1, version: 0 },
            Event::Backward { layer: 2 },
            Event::Backward { layer: 1 },
            Event::Backward { layer: 0 },
        ]
    );
}

#[test]
fn forward_returns_every_activation() {
    let variant = Variant::new("small", vec![20, 8, 5]);
    let net = Network::new(&variant, LayerConfig::default(), Device::Cpu, 3).unwrap();
    let input = vec![vec![0.27; 20]; 4];
    let activations = net.forward(&input).unwrap();
    assert_eq!(activations.len(), 3);
    assert_eq!(activations[0], input);
    assert!(activations[1].iter().all(|r| r.len() == 8));
    assert_eq!(activations[2].len(), 4);
    assert!(activations[2].iter().all(|r| r.len() == net.output_width()));
    assert_eq!(net.to_string(), "SNN: [20, 8, 5]");
}

#[test]
fn mismatched_layer_widths_fail_at_construction() {
    let cfg = LayerConfig::default();
    let layers = vec![
        ShiftLayer::from_parameters(vec![vec![0.0; 3]; 4], vec![vec![0.1; 3]; 4], cfg, Device::Cpu).unwrap(),
        ShiftLayer::from_parameters(vec![vec![0.0; 2]; 5], vec![vec![0.1; 2]; 5], cfg, Device::Cpu).unwrap(),
    ];
    match Network::from_layers(layers) {
        Err(SnnError::ShapeMismatch { layer, expected, actual }) => {
            assert_eq!(layer, 1);
            assert_eq!(expected, vec![3]);
            assert_eq!(actual, vec![5]);
        }
        other => panic!("expected ShapeMismatch, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn wrong_input_width_fails_fast() {
    let variant = Variant::new("small", vec![6, 4, 3]);
    let net = Network::new(&variant, LayerConfig::default(), Device::Cpu, 9).unwrap();
    let err = net.forward(&vec![vec![0.27; 7]]).unwrap_err();
    assert!(matches!(err, SnnError::ShapeMismatch { layer: 0, .. }), "{err}");
}

#[test]
fn backward_pass_steps_every_layer_once() {
    let variant = Variant::new("small", vec![12, 6, 4]);
    let mut net = Network::new(&variant, LayerConfig::default(), Device::Cpu, 5).unwrap();
    let input = vec![vec![0.27, 2.69, 0.27, 0.27, 2.69, 0.27, 0.27, 0.27, 2.69, 0.27, 0.27, 2.69]; 3];
    let activations = net.forward(&input).unwrap();
    let target = TargetEncoder { classes: 4, near: 0.01, far: 0.99 }
        .encode(&[0, 2, 3])
        .unwrap();
    let outcome = net.backward_pass(&activations, &target, RATES).unwrap();
    assert_eq!(outcome.predicted.len(), 3);
    for row in outcome.predicted.iter().chain(&outcome.target) {
        assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }
    assert!(net.layers().iter().all(|l| l.steps == 1));
}

#[test]
fn target_shape_must_match_output() {
    let variant = Variant::new("small", vec![6, 4, 3]);
    let mut net = Network::new(&variant, LayerConfig::default(), Device::Cpu, 9).unwrap();
    let activations = net.forward(&vec![vec![0.27; 6]]).unwrap();
    let target = vec![vec![0.99; 4]];
    assert!(matches!(
        net.backward_pass(&activations, &target, RATES),
        Err(SnnError::ShapeMismatch { .. })
    ));
}

/// The class with the unique minimum softmax value is the prediction.
#[test]
fn prediction_is_argmin_of_softmax() {
    let output = vec![
        vec![2.0, 2.5, 1.9, 0.4, 3.0, 2.2, 2.1, 2.8, 2.6, 2.4],
        vec![0.9, 0.1, 0.5, 0.7, 0.8, 0.6, 0.95, 0.3, 0.2, 0.4],
    ];
    assert_eq!(predict_labels(&output).unwrap(), vec![3, 1]);
}

#[test]
fn missing_checkpoint_is_an_io_error() {
    let tmp = tempfile::TempDir::new().expect("TempDir must be created");
    let store = CheckpointStore::new(tmp.path());
    let err = store
        .load_network(&Variant::two_layer(), LayerConfig::default(), Device::Cpu)
        .unwrap_err();
    assert!(matches!(err, SnnError::CheckpointIo { .. }), "{err}");
}
