use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use flate2::read::GzDecoder;
use log::info;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::{Result, SnnError};

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

/// Images (N, 1, rows, cols) scaled to [0,1] with their u32 labels.
pub struct LabeledImages {
    pub images: Tensor,
    pub labels: Tensor,
}

pub struct Mnist {
    pub train: LabeledImages,
    pub test: LabeledImages,
}

impl Mnist {
    /// Reads the four standard IDX files from `dir`, gzip-compressed or not.
    pub fn load(dir: impl AsRef<Path>, device: &Device) -> Result<Self> {
        let dir = dir.as_ref();
        let train = LabeledImages::load(
            dir,
            "train-images-idx3-ubyte",
            "train-labels-idx1-ubyte",
            device,
        )?;
        let test = LabeledImages::load(
            dir,
            "t10k-images-idx3-ubyte",
            "t10k-labels-idx1-ubyte",
            device,
        )?;
        info!(
            "loaded MNIST from {}: {} train / {} test images",
            dir.display(),
            train.len(),
            test.len()
        );
        Ok(Self { train, test })
    }
}

impl LabeledImages {
    fn load(dir: &Path, images: &str, labels: &str, device: &Device) -> Result<Self> {
        let images = read_idx_images(open_idx(dir, images)?)?;
        let labels = read_idx_labels(open_idx(dir, labels)?)?;
        Self::from_raw(images, labels, device)
    }

    pub fn from_raw(images: IdxImages, labels: Vec<u8>, device: &Device) -> Result<Self> {
        if images.count != labels.len() {
            return Err(SnnError::Dataset(format!(
                "{} images but {} labels",
                images.count,
                labels.len()
            )));
        }
        let pixels = Tensor::from_vec(
            images.pixels,
            (images.count, 1, images.rows, images.cols),
            device,
        )?
        .to_dtype(DType::F32)?
        .affine(1.0 / 255.0, 0.0)?;
        let labels: Vec<u32> = labels.into_iter().map(u32::from).collect();
        let n = labels.len();
        Ok(Self {
            images: pixels,
            labels: Tensor::from_vec(labels, n, device)?,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.dims1().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Yields (images, labels) batches, in a random order when `rng` is given.
    pub fn batches<R: Rng>(&self, batch_size: usize, rng: Option<&mut R>) -> Batches<'_> {
        let mut order: Vec<u32> = (0..self.len() as u32).collect();
        if let Some(rng) = rng {
            order.shuffle(rng);
        }
        Batches {
            data: self,
            order,
            batch_size: batch_size.max(1),
            pos: 0,
        }
    }
}

pub struct Batches<'a> {
    data: &'a LabeledImages,
    order: Vec<u32>,
    batch_size: usize,
    pos: usize,
}

impl Batches<'_> {
    pub fn n_batches(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }
}

impl Iterator for Batches<'_> {
    type Item = Result<(Tensor, Tensor)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.order.len() {
            return None;
        }
        let end = (self.pos + self.batch_size).min(self.order.len());
        let idx = &self.order[self.pos..end];
        self.pos = end;
        let batch = || -> Result<(Tensor, Tensor)> {
            let idx = Tensor::new(idx, self.data.images.device())?;
            Ok((
                self.data.images.index_select(&idx, 0)?,
                self.data.labels.index_select(&idx, 0)?,
            ))
        };
        Some(batch())
    }
}

fn open_idx(dir: &Path, name: &str) -> Result<Box<dyn Read>> {
    let gz = dir.join(format!("{name}.gz"));
    if gz.exists() {
        return Ok(Box::new(GzDecoder::new(BufReader::new(File::open(gz)?))));
    }
    let plain = dir.join(name);
    if plain.exists() {
        return Ok(Box::new(BufReader::new(File::open(plain)?)));
    }
    Err(SnnError::Dataset(format!(
        "neither {name} nor {name}.gz found in {}",
        dir.display()
    )))
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)
        .map_err(|e| SnnError::Dataset(format!("truncated IDX header: {e}")))?;
    Ok(u32::from_be_bytes(buf))
}

/// Reads exactly `len` bytes, growing the buffer only as data actually arrives.
fn read_body<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    r.take(len as u64).read_to_end(&mut body)?;
    if body.len() != len {
        return Err(SnnError::Dataset(format!(
            "expected {len} bytes of IDX data, found {}",
            body.len()
        )));
    }
    Ok(body)
}

/// Raw pixels of an IDX3 image file.
#[derive(Debug, Clone, PartialEq)]
pub struct IdxImages {
    pub count: usize,
    pub rows: usize,
    pub cols: usize,
    pub pixels: Vec<u8>,
}

pub fn read_idx_images<R: Read>(mut r: R) -> Result<IdxImages> {
    let magic = read_u32(&mut r)?;
    if magic != IMAGES_MAGIC {
        return Err(SnnError::Dataset(format!(
            "bad image file magic {magic}, expected {IMAGES_MAGIC}"
        )));
    }
    let count = read_u32(&mut r)? as usize;
    let rows = read_u32(&mut r)? as usize;
    let cols = read_u32(&mut r)? as usize;
    let len = count
        .checked_mul(rows)
        .and_then(|n| n.checked_mul(cols))
        .ok_or_else(|| {
            SnnError::Dataset(format!("image header {count}x{rows}x{cols} overflows"))
        })?;
    let pixels = read_body(&mut r, len)?;
    Ok(IdxImages {
        count,
        rows,
        cols,
        pixels,
    })
}

pub fn read_idx_labels<R: Read>(mut r: R) -> Result<Vec<u8>> {
    let magic = read_u32(&mut r)?;
    if magic != LABELS_MAGIC {
        return Err(SnnError::Dataset(format!(
            "bad label file magic {magic}, expected {LABELS_MAGIC}"
        )));
    }
    let count = read_u32(&mut r)? as usize;
    read_body(&mut r, count)
}
