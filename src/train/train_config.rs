use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};
use crate::optim::{OptimizerKind, SchedulerKind};

/// Gradients are rescaled so their global L2 norm never exceeds this.
pub const GRAD_CLIP_NORM: f64 = 2.0;

/// Hyperparameters and paths for one training run.
///
/// Every field has a default, so a JSON file only needs to name the options it
/// changes. The value is built once before the run and passed by reference;
/// nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub max_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub optimizer: OptimizerKind,
    pub scheduler: SchedulerKind,
    pub early_stopping: bool,
    pub early_stop_patience: usize,
    /// Minimum validation-loss decrease that counts as an improvement.
    pub early_stop_delta: f64,
    pub label_smoothing: f64,
    /// Plateau factor, also the step-decay gamma.
    pub lr_decay_factor: f64,
    pub lr_decay_patience: usize,
    pub min_lr: f64,
    pub lr_step_size: usize,
    /// Figures and sample predictions go to the sink every N epochs.
    pub figure_interval: usize,
    pub sample_predictions: usize,
    /// Seeds batch shuffling.
    pub seed: u64,
    pub experiment_root: PathBuf,
    pub export_root: PathBuf,
    /// Run directory name. Placeholders: `{timestamp}`, `{model}`,
    /// `{batch_size}`, `{lr}`.
    pub experiment_name: String,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            max_epochs: 100,
            batch_size: 64,
            learning_rate: 1e-3,
            weight_decay: 1e-4,
            optimizer: OptimizerKind::AdamW,
            scheduler: SchedulerKind::Plateau,
            early_stopping: true,
            early_stop_patience: 10,
            early_stop_delta: 1e-3,
            label_smoothing: 0.1,
            lr_decay_factor: 0.5,
            lr_decay_patience: 3,
            min_lr: 1e-6,
            lr_step_size: 10,
            figure_interval: 5,
            sample_predictions: 5,
            seed: 42,
            experiment_root: PathBuf::from("experiments"),
            export_root: PathBuf::from("exports"),
            experiment_name: "{timestamp}_{model}_bs{batch_size}_lr{lr}".to_string(),
        }
    }
}

impl TrainConfig {
    /// Reads a (possibly partial) configuration from a JSON file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<TrainConfig> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| TrainError::io(path, e))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| TrainError::json(path, e))
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(TrainError::InvalidConfig(msg.to_string()));
        if self.max_epochs == 0 {
            return fail("max_epochs must be at least 1");
        }
        if self.batch_size == 0 {
            return fail("batch_size must be at least 1");
        }
        if !(self.learning_rate > 0.0) || !self.learning_rate.is_finite() {
            return fail("learning_rate must be a positive number");
        }
        if self.weight_decay < 0.0 {
            return fail("weight_decay must not be negative");
        }
        if !(0.0..1.0).contains(&self.label_smoothing) {
            return fail("label_smoothing must lie in [0, 1)");
        }
        if self.early_stop_delta < 0.0 {
            return fail("early_stop_delta must not be negative");
        }
        if self.lr_step_size == 0 {
            return fail("lr_step_size must be at least 1");
        }
        if self.min_lr < 0.0 {
            return fail("min_lr must not be negative");
        }
        Ok(())
    }
}
