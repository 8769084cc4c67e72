pub mod batcher;
pub mod charset;
pub mod image_dir;
pub mod preprocess;
pub mod synthetic;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use batcher::{batches, Batch, Batches};
pub use charset::{Charset, DEFAULT_CHARSET};
pub use image_dir::{ImageDirDataset, ImageDirOptions};
pub use synthetic::{SyntheticDataset, SyntheticOptions};

/// Which split a dataset instance serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Train,
    Valid,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Valid => "valid",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel dimensions images are resized to before flattening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub width: u32,
    pub height: u32,
}

impl ImageShape {
    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// One labeled image: flattened pixels in [0, 1] and one class per position.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub image: Vec<f64>,
    pub label: Vec<usize>,
}

/// Indexable, ordered collection of labeled captcha images.
pub trait Dataset: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Result<Sample>;

    /// Expected label length `L`.
    fn sequence_length(&self) -> usize;

    /// Class count `C`; labels lie in `[0, C)`.
    fn num_classes(&self) -> usize;

    /// Length of the flattened image vector.
    fn input_size(&self) -> usize;

    fn charset(&self) -> Option<&Charset> {
        None
    }

    fn image_shape(&self) -> Option<ImageShape> {
        None
    }
}
