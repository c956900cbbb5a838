//! Dataset loading (MNIST IDX), synthetic digits, and batch partitioning.
use std::fs::File;
use std::io::{Cursor, Read};
use std::ops::Range;
use std::path::Path;

use anyhow::{anyhow, Result};
use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::GzDecoder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{SnnError, SnnResult};

pub const IMAGE_SIDE: usize = 28;
pub const IMAGE_SIZE: usize = IMAGE_SIDE * IMAGE_SIDE;

/// Labeled samples held fully in memory. Features are normalised to [0, 1].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Contiguous slice of samples.
    pub fn batch(&self, range: Range<usize>) -> (&[Vec<f64>], &[usize]) {
        (&self.features[range.clone()], &self.labels[range])
    }

    pub fn truncate(&mut self, len: usize) {
        self.features.truncate(len);
        self.labels.truncate(len);
    }
}

/// Contiguous batches covering `0..len`; the last one holds the remainder.
pub fn batch_ranges(len: usize, batch_size: usize) -> SnnResult<Vec<Range<usize>>> {
    if batch_size == 0 {
        return Err(SnnError::InvalidConfig("batch size must be > 0".into()));
    }
    Ok((0..len.div_ceil(batch_size))
        .map(|bi| bi * batch_size..((bi + 1) * batch_size).min(len))
        .collect())
}

/// MNIST loader
#[derive(Debug)]
struct MnistData {
    sizes: Vec<i32>,
    data: Vec<u8>,
}

impl MnistData {
    fn new(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| anyhow!("Failed to open {}: {}", path.display(), e))?;
        let mut gz = GzDecoder::new(file);
        let mut contents = Vec::new();
        gz.read_to_end(&mut contents)
            .map_err(|e| anyhow!("Gzip read error: {}", e))?;
        let mut r = Cursor::new(&contents);
        let magic = r
            .read_i32::<BigEndian>()
            .map_err(|e| anyhow!("Read magic: {}", e))?;
        let mut sizes = Vec::new();
        let mut data = Vec::new();
        match magic {
            2049 => {
                sizes.push(r.read_i32::<BigEndian>()?);
            }
            2051 => {
                sizes.push(r.read_i32::<BigEndian>()?);
                sizes.push(r.read_i32::<BigEndian>()?);
                sizes.push(r.read_i32::<BigEndian>()?);
            }
            _ => return Err(anyhow!("Invalid magic: {}", magic)),
        }
        r.read_to_end(&mut data)
            .map_err(|e| anyhow!("Read data: {}", e))?;
        Ok(Self { sizes, data })
    }
}

/// Load the MNIST training (`train = true`) or test split from `dir`.
pub fn load_mnist(dir: &Path, train: bool) -> Result<Dataset> {
    let prefix = if train { "train" } else { "t10k" };
    let label_data = MnistData::new(&dir.join(format!("{}-labels-idx1-ubyte.gz", prefix)))?;
    let image_data = MnistData::new(&dir.join(format!("{}-images-idx3-ubyte.gz", prefix)))?;
    let num_images = label_data.sizes[0] as usize;
    if label_data.data.len() < num_images {
        return Err(anyhow!("Label data underflow"));
    }
    let mut dataset = Dataset::default();
    for i in 0..num_images {
        let start = i * IMAGE_SIZE;
        if start + IMAGE_SIZE > image_data.data.len() {
            return Err(anyhow!("Image data overflow"));
        }
        let img_bytes = &image_data.data[start..start + IMAGE_SIZE];
        dataset
            .features
            .push(img_bytes.iter().map(|&b| b as f64 / 255.0).collect());
        dataset.labels.push(label_data.data[i] as usize);
    }
    if dataset.is_empty() {
        return Err(anyhow!("No MNIST data loaded"));
    }
    Ok(dataset)
}

/// Deterministic digit-like images: class `c` draws a fixed pair of strokes
/// whose position depends on `c`, then roughly 3% of pixels are flipped.
/// Labels cycle through `0..10`.
pub fn synthetic_digits(n_samples: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut dataset = Dataset::default();
    for idx in 0..n_samples {
        let label = idx % 10;
        let mut img = vec![0.0; IMAGE_SIZE];
        let bar = 3 + 2 * label;
        for k in 4..IMAGE_SIDE - 4 {
            img[bar * IMAGE_SIDE + k] = 1.0;
            img[k * IMAGE_SIDE + (IMAGE_SIDE - 1 - bar)] = 1.0;
        }
        for px in img.iter_mut() {
            if rng.gen_bool(0.03) {
                *px = 1.0 - *px;
            }
        }
        dataset.features.push(img);
        dataset.labels.push(label);
    }
    dataset
}
