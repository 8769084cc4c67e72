use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the training engine.
///
/// Everything here is fatal for a run when it escapes `train_loop`. Failures
/// inside background persistence tasks are logged by the worker and never
/// surface through this type.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot decode image '{path}': {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("dataset directory '{0}' does not exist")]
    DatasetMissing(PathBuf),

    #[error("{0} dataset is empty")]
    EmptyDataset(String),

    #[error("sample {index}: label has {found} positions, expected {expected}")]
    LabelLength {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("sample {index}: class {class} is outside [0, {num_classes})")]
    LabelOutOfRange {
        index: usize,
        class: usize,
        num_classes: usize,
    },

    #[error("character '{ch}' in '{text}' is not part of the charset")]
    UnknownCharacter { ch: char, text: String },

    #[error("non-finite {phase} loss {loss} at epoch {epoch}, batch {batch}")]
    NonFiniteLoss {
        epoch: usize,
        batch: usize,
        phase: &'static str,
        loss: f64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no model registered under '{0}'")]
    UnknownModel(String),

    #[error("model shape mismatch: {0}")]
    ModelShape(String),
}

pub type Result<T> = std::result::Result<T, TrainError>;

impl TrainError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrainError::Io { path: path.into(), source }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        TrainError::Json { path: path.into(), source }
    }
}
