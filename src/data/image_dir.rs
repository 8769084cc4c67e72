use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::data::{preprocess, Charset, Dataset, ImageShape, Mode, Sample};
use crate::error::{Result, TrainError};

const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

#[derive(Debug, Clone)]
pub struct ImageDirOptions {
    pub shape: ImageShape,
    pub sequence_length: usize,
    pub charset: Charset,
    /// Cap on the number of samples, taken in file-name order.
    pub limit: Option<usize>,
}

impl Default for ImageDirOptions {
    fn default() -> Self {
        ImageDirOptions {
            shape: ImageShape { width: 100, height: 40 },
            sequence_length: 4,
            charset: Charset::default(),
            limit: None,
        }
    }
}

/// Captcha images stored as `root/<mode>/<anything>_<label>.<ext>`.
///
/// File names and labels are read eagerly at `open`; pixels are decoded on
/// each `get`.
pub struct ImageDirDataset {
    dir: PathBuf,
    files: Vec<PathBuf>,
    labels: Vec<Vec<usize>>,
    options: ImageDirOptions,
}

impl ImageDirDataset {
    pub fn open(root: impl AsRef<Path>, mode: Mode, options: ImageDirOptions) -> Result<ImageDirDataset> {
        let dir = root.as_ref().join(mode.as_str());
        if !dir.is_dir() {
            return Err(TrainError::DatasetMissing(dir));
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(|e| TrainError::io(&dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        files.sort();
        if let Some(limit) = options.limit {
            files.truncate(limit);
        }

        let mut labels = Vec::with_capacity(files.len());
        for (index, path) in files.iter().enumerate() {
            let text = label_text(path).ok_or_else(|| {
                TrainError::InvalidConfig(format!("'{}' has no '_<label>' suffix", path.display()))
            })?;
            let label = options.charset.encode(text)?;
            if label.len() != options.sequence_length {
                return Err(TrainError::LabelLength {
                    index,
                    expected: options.sequence_length,
                    found: label.len(),
                });
            }
            labels.push(label);
        }

        info!(mode = %mode, dir = %dir.display(), samples = files.len(), "opened image dataset");
        Ok(ImageDirDataset { dir, files, labels, options })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// `img_0001_a3Bc.png` → `a3Bc`.
fn label_text(path: &Path) -> Option<&str> {
    let stem = path.file_stem()?.to_str()?;
    let (_, label) = stem.rsplit_once('_')?;
    if label.is_empty() { None } else { Some(label) }
}

impl Dataset for ImageDirDataset {
    fn len(&self) -> usize {
        self.files.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let path = &self.files[index];
        debug!(path = %path.display(), "decoding sample");
        let image = preprocess::load_grayscale(path, self.options.shape)?;
        Ok(Sample { image, label: self.labels[index].clone() })
    }

    fn sequence_length(&self) -> usize {
        self.options.sequence_length
    }

    fn num_classes(&self) -> usize {
        self.options.charset.len()
    }

    fn input_size(&self) -> usize {
        self.options.shape.pixels()
    }

    fn charset(&self) -> Option<&Charset> {
        Some(&self.options.charset)
    }

    fn image_shape(&self) -> Option<ImageShape> {
        Some(self.options.shape)
    }
}
