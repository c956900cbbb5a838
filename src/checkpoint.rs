//! Parameter checkpoints: one gzipped JSON tensor per
//! (variant, layer, parameter kind).
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Device, LayerConfig, Variant};
use crate::error::{SnnError, SnnResult};
use crate::layers::{Matrix, ShiftLayer, SpikeLayer};
use crate::network::Network;

/// Which of a layer's two learnable tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Shift,
    Slope,
}

impl ParamKind {
    pub const ALL: [ParamKind; 2] = [ParamKind::Shift, ParamKind::Slope];

    fn tag(self) -> &'static str {
        match self {
            ParamKind::Shift => "ets",
            ParamKind::Slope => "etp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointId<'a> {
    pub variant: &'a str,
    /// Zero-based layer index.
    pub layer: usize,
    pub kind: ParamKind,
}

/// `dir/<variant>_<ets|etp><layer + 1>`
pub fn checkpoint_path(dir: &Path, id: &CheckpointId<'_>) -> PathBuf {
    dir.join(format!("{}_{}{}", id.variant, id.kind.tag(), id.layer + 1))
}

#[derive(Debug, Serialize, Deserialize)]
struct TensorDto {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl TensorDto {
    fn from_matrix(m: &Matrix) -> SnnResult<Self> {
        let rows = m.len();
        let cols = m.first().map_or(0, Vec::len);
        if let Some(bad) = m.iter().flatten().find(|v| !v.is_finite()) {
            return Err(SnnError::numeric(format!(
                "refusing to checkpoint non-finite value {}",
                bad
            )));
        }
        Ok(Self {
            rows,
            cols,
            data: m.iter().flatten().copied().collect(),
        })
    }

    fn into_matrix(self, path: &Path) -> SnnResult<Matrix> {
        if self.cols == 0 || self.rows.checked_mul(self.cols) != Some(self.data.len()) {
            return Err(SnnError::checkpoint_format(
                path,
                format!(
                    "{}x{} header does not match {} values",
                    self.rows,
                    self.cols,
                    self.data.len()
                ),
            ));
        }
        Ok(self.data.chunks(self.cols).map(<[f64]>::to_vec).collect())
    }
}

/// Write one tensor blob.
pub fn save_tensor(path: &Path, m: &Matrix) -> SnnResult<()> {
    let dto = TensorDto::from_matrix(m)?;
    let json = serde_json::to_vec(&dto)
        .map_err(|e| SnnError::checkpoint_format(path, e.to_string()))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SnnError::checkpoint_io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| SnnError::checkpoint_io(path, e))?;
    let mut enc = GzEncoder::new(file, Compression::default());
    enc.write_all(&json)
        .map_err(|e| SnnError::checkpoint_io(path, e))?;
    enc.finish().map_err(|e| SnnError::checkpoint_io(path, e))?;
    Ok(())
}

/// Read one tensor blob.
pub fn load_tensor(path: &Path) -> SnnResult<Matrix> {
    let file = File::open(path).map_err(|e| SnnError::checkpoint_io(path, e))?;
    let mut dec = GzDecoder::new(file);
    let mut buf = Vec::new();
    dec.read_to_end(&mut buf)
        .map_err(|e| SnnError::checkpoint_io(path, e))?;
    let dto: TensorDto = serde_json::from_slice(&buf)
        .map_err(|e| SnnError::checkpoint_format(path, e.to_string()))?;
    dto.into_matrix(path)
}

/// Checkpoints for every variant under one parameters directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every file making up one variant's checkpoint, layer by layer.
    pub fn files_for(&self, variant: &str, layers: usize) -> Vec<PathBuf> {
        (0..layers)
            .flat_map(|layer| {
                ParamKind::ALL.into_iter().map(move |kind| CheckpointId {
                    variant,
                    layer,
                    kind,
                })
            })
            .map(|id| checkpoint_path(&self.dir, &id))
            .collect()
    }

    /// Persist both tensors of every layer. All files are staged next to
    /// their targets and only renamed into place once every write
    /// succeeded, so a failed write leaves the previous checkpoint intact.
    ///
    /// The rename sweep itself is not atomic: if a rename fails, earlier
    /// files already hold the new epoch. The remaining staged files are
    /// removed and the error is returned, so the caller must treat the
    /// whole checkpoint as failed.
    pub fn save_network<L: SpikeLayer>(&self, variant: &str, network: &Network<L>) -> SnnResult<Vec<PathBuf>> {
        let mut staged = Vec::new();
        for (layer, l) in network.layers().iter().enumerate() {
            for kind in ParamKind::ALL {
                let path = checkpoint_path(&self.dir, &CheckpointId { variant, layer, kind });
                let mut tmp = path.clone().into_os_string();
                tmp.push(".tmp");
                let tmp = PathBuf::from(tmp);
                if let Err(e) = save_tensor(&tmp, l.parameter(kind)) {
                    discard(&staged);
                    let _ = fs::remove_file(&tmp);
                    return Err(e);
                }
                staged.push((tmp, path));
            }
        }
        for (k, (tmp, path)) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(tmp, path) {
                discard(&staged[k..]);
                return Err(SnnError::checkpoint_io(path, e));
            }
        }
        debug!(variant, files = staged.len(), dir = %self.dir.display(), "checkpoint written");
        Ok(staged.into_iter().map(|(_, path)| path).collect())
    }

    /// Rebuild a fixed-parameter network for `variant` from its files.
    pub fn load_network(
        &self,
        variant: &Variant,
        config: LayerConfig,
        device: Device,
    ) -> SnnResult<Network<ShiftLayer>> {
        variant.validate()?;
        let mut layers = Vec::with_capacity(variant.layer_count());
        for (layer, w) in variant.widths.windows(2).enumerate() {
            let load = |kind| {
                let id = CheckpointId {
                    variant: &variant.label,
                    layer,
                    kind,
                };
                load_tensor(&checkpoint_path(&self.dir, &id))
            };
            let shift = load(ParamKind::Shift)?;
            let slope = load(ParamKind::Slope)?;
            let loaded = ShiftLayer::from_parameters(shift, slope, config, device)
                .map_err(|e| relabel(e, layer))?;
            if loaded.inputs() != w[0] || loaded.outputs() != w[1] {
                return Err(SnnError::shape_mismatch(
                    layer,
                    vec![w[0], w[1]],
                    vec![loaded.inputs(), loaded.outputs()],
                ));
            }
            layers.push(loaded);
        }
        Network::from_layers(layers)
    }
}

fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        let _ = fs::remove_file(tmp);
    }
}

fn relabel(err: SnnError, layer: usize) -> SnnError {
    match err {
        SnnError::ShapeMismatch {
            expected, actual, ..
        } => SnnError::shape_mismatch(layer, expected, actual),
        other => other,
    }
}
