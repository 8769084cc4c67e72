use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TrainError};
use crate::network::ModelSpec;
use crate::persist::atomic;
use crate::train::{EpochRecord, TrainConfig};

pub const RUN_FILE: &str = "run.json";

/// Everything fixed at run creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Directory name, filled in by `ExperimentDir::allocate`.
    #[serde(default)]
    pub name: String,
    pub model_id: String,
    pub created_at: String,
    pub config: TrainConfig,
    pub spec: ModelSpec,
    pub num_parameters: usize,
    pub train_samples: usize,
    pub valid_samples: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    StoppedEarly,
    Interrupted,
    /// Aborted by a fatal error.
    Failed,
}

/// Best validation accuracy reached so far and where.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestState {
    pub val_accuracy: f64,
    pub val_loss: f64,
    pub epoch: usize,
}

/// Contents of `<run_dir>/run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub metadata: RunMetadata,
    pub status: RunStatus,
    pub best: Option<BestState>,
    #[serde(default)]
    pub history: Vec<EpochRecord>,
}

impl RunSnapshot {
    pub fn save(&self, run_dir: &Path) -> Result<()> {
        atomic::write_json_atomic(&run_dir.join(RUN_FILE), self)
    }

    pub fn load(run_dir: &Path) -> Result<RunSnapshot> {
        atomic::read_json(&run_dir.join(RUN_FILE))
    }
}

/// `{timestamp}_{model}_bs{batch_size}_lr{lr}` style directory names.
pub fn render_name(template: &str, model_id: &str, batch_size: usize, lr: f64, now: DateTime<Local>) -> String {
    template
        .replace("{timestamp}", &now.format("%Y-%m-%d_%H-%M-%S").to_string())
        .replace("{model}", model_id)
        .replace("{batch_size}", &batch_size.to_string())
        .replace("{lr}", &lr.to_string())
}

/// A run directory that this process created and owns.
#[derive(Debug, Clone)]
pub struct ExperimentDir {
    pub path: PathBuf,
    pub metadata: RunMetadata,
}

impl ExperimentDir {
    /// Creates a fresh directory under `root` and writes the initial
    /// `run.json`. Directory creation is exclusive, so two runs started in the
    /// same second (in this or another process) get `name`, `name_1`, ...
    pub fn allocate(root: &Path, template: &str, mut metadata: RunMetadata) -> Result<ExperimentDir> {
        fs::create_dir_all(root).map_err(|e| TrainError::io(root, e))?;
        let base = render_name(
            template,
            &metadata.model_id,
            metadata.config.batch_size,
            metadata.config.learning_rate,
            Local::now(),
        );

        let mut suffix = 0usize;
        let (name, path) = loop {
            let name = if suffix == 0 { base.clone() } else { format!("{}_{}", base, suffix) };
            let path = root.join(&name);
            match fs::create_dir(&path) {
                Ok(()) => break (name, path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(TrainError::io(&path, e)),
            }
        };

        metadata.name = name;
        let snapshot = RunSnapshot { metadata: metadata.clone(), status: RunStatus::Running, best: None, history: Vec::new() };
        snapshot.save(&path)?;
        info!(run_dir = %path.display(), "experiment directory allocated");
        Ok(ExperimentDir { path, metadata })
    }

    pub fn snapshot(&self, status: RunStatus, best: Option<BestState>, history: Vec<EpochRecord>) -> RunSnapshot {
        RunSnapshot { metadata: self.metadata.clone(), status, best, history }
    }
}

/// Run directories under `root` that contain a `run.json`, newest name first.
pub fn list_runs(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut runs: Vec<PathBuf> = fs::read_dir(root)
        .map_err(|e| TrainError::io(root, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.join(RUN_FILE).is_file())
        .collect();
    runs.sort();
    runs.reverse();
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn metadata() -> RunMetadata {
        RunMetadata {
            name: String::new(),
            model_id: "mlp".into(),
            created_at: "now".into(),
            config: TrainConfig { batch_size: 32, learning_rate: 5e-4, ..Default::default() },
            spec: ModelSpec::new(4, 2, 3),
            num_parameters: 10,
            train_samples: 8,
            valid_samples: 2,
        }
    }

    #[test]
    fn name_template_is_filled() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let name = render_name("{timestamp}_{model}_bs{batch_size}_lr{lr}", "mlp", 64, 0.001, now);
        assert_eq!(name, "2024-03-09_14-05-07_mlp_bs64_lr0.001");
    }

    #[test]
    fn concurrent_allocations_get_distinct_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let a = ExperimentDir::allocate(tmp.path(), "fixed_{model}", metadata()).unwrap();
        let b = ExperimentDir::allocate(tmp.path(), "fixed_{model}", metadata()).unwrap();
        assert_ne!(a.path, b.path);
        assert_eq!(a.metadata.name, "fixed_mlp");
        assert_eq!(b.metadata.name, "fixed_mlp_1");
    }

    #[test]
    fn allocation_writes_running_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = ExperimentDir::allocate(tmp.path(), "{model}_bs{batch_size}_lr{lr}", metadata()).unwrap();
        let snap = RunSnapshot::load(&dir.path).unwrap();
        assert_eq!(snap.status, RunStatus::Running);
        assert_eq!(snap.metadata.name, "mlp_bs32_lr0.0005");
        assert!(snap.best.is_none());
        assert_eq!(list_runs(tmp.path()).unwrap(), vec![dir.path.clone()]);
    }
}
