use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::{Charset, ImageShape};
use crate::error::{Result, TrainError};
use crate::network::{Model, ModelRegistry, ModelSpec, ModelState};
use crate::persist::{atomic, checkpoint};
use crate::train::TrainConfig;

pub const MODEL_SUFFIX: &str = ".model.json";
pub const META_SUFFIX: &str = ".meta.json";

/// Versionless, deployable model file: parameters only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedModel {
    pub model_id: String,
    pub epoch: usize,
    pub accuracy: f64,
    #[serde(default)]
    pub val_loss: Option<f64>,
    pub state: ModelState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_id: String,
    pub num_parameters: usize,
    pub spec: ModelSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingInfo {
    pub config: TrainConfig,
    pub optimizer: String,
    pub scheduler: String,
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub interrupted: bool,
    pub best_val_accuracy: f64,
    pub best_epoch: Option<usize>,
    pub best_val_loss: Option<f64>,
    pub training_time_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub charset: Option<Charset>,
    pub num_classes: usize,
    pub sequence_length: usize,
    pub image: Option<ImageShape>,
    pub train_samples: usize,
    pub valid_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub exported_at: String,
    pub crate_version: String,
    pub os: String,
    pub arch: String,
    pub cpu_count: usize,
}

impl EnvironmentInfo {
    pub fn current() -> EnvironmentInfo {
        EnvironmentInfo {
            exported_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_count: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        }
    }
}

/// Human-readable sibling of the exported model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub model: ModelInfo,
    pub training: TrainingInfo,
    pub dataset: DatasetInfo,
    pub environment: EnvironmentInfo,
    pub run_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPaths {
    pub model: PathBuf,
    pub metadata: PathBuf,
}

pub fn export_paths(export_root: &Path, model_id: &str) -> ExportPaths {
    ExportPaths {
        model: export_root.join(format!("{}{}", model_id, MODEL_SUFFIX)),
        metadata: export_root.join(format!("{}{}", model_id, META_SUFFIX)),
    }
}

/// `exports/mlp.model.json` → `exports/mlp.meta.json`.
pub fn metadata_path_for(model_path: &Path) -> PathBuf {
    let name = model_path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let stem = name.strip_suffix(MODEL_SUFFIX).unwrap_or(name);
    model_path.with_file_name(format!("{}{}", stem, META_SUFFIX))
}

/// Publishes the run's surviving checkpoint (or `fallback` when the run never
/// saved one) to `export_root`, next to `metadata`.
///
/// The `best_*` fields of the written metadata always describe the parameters
/// that were exported, which lag the run's best when its newest save failed.
pub fn export_final(
    export_root: &Path,
    checkpoint_dir: &Path,
    fallback: ExportedModel,
    mut metadata: ExportMetadata,
) -> Result<ExportPaths> {
    let exported = match checkpoint::list_checkpoints(checkpoint_dir)?.pop() {
        Some(path) => {
            let ckpt = checkpoint::Checkpoint::load(&path)?;
            info!(source = %path.display(), "exporting best checkpoint");
            ExportedModel {
                model_id: ckpt.model_id,
                epoch: ckpt.epoch,
                accuracy: ckpt.accuracy,
                val_loss: Some(ckpt.val_loss),
                state: ckpt.state,
            }
        }
        None => {
            info!("no checkpoint on disk, exporting final parameters");
            fallback
        }
    };

    let training = &mut metadata.training;
    training.best_epoch = if exported.epoch > 0 { Some(exported.epoch) } else { None };
    training.best_val_accuracy = exported.accuracy;
    training.best_val_loss = exported.val_loss;

    fs::create_dir_all(export_root).map_err(|e| TrainError::io(export_root, e))?;
    let paths = export_paths(export_root, &exported.model_id);
    atomic::write_json_atomic(&paths.model, &exported)?;
    atomic::write_json_atomic(&paths.metadata, &metadata)?;
    info!(model = %paths.model.display(), accuracy = exported.accuracy, "model exported");
    Ok(paths)
}

pub fn load_exported(path: &Path) -> Result<ExportedModel> {
    atomic::read_json(path)
}

pub fn load_metadata(model_path: &Path) -> Result<ExportMetadata> {
    atomic::read_json(&metadata_path_for(model_path))
}

/// Rebuilds an exported model without the caller naming its type.
pub fn load_model(path: &Path, registry: &ModelRegistry) -> Result<Box<dyn Model>> {
    let exported = load_exported(path)?;
    registry.restore(&exported.state)
}
