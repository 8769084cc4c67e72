use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TrainError};
use crate::network::ModelState;
use crate::persist::atomic;

pub const CHECKPOINT_DIR: &str = "checkpoint";
pub const CHECKPOINT_SUFFIX: &str = ".ckpt.json";

/// Model parameters tagged with the epoch and validation accuracy that
/// earned them. Optimizer and scheduler state are not included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub model_id: String,
    pub epoch: usize,
    pub accuracy: f64,
    pub val_loss: f64,
    pub saved_at: String,
    pub state: ModelState,
}

impl Checkpoint {
    /// `<model>_epoch<e>_acc<a.aaaa>.ckpt.json`
    pub fn file_name(&self) -> String {
        format!("{}_epoch{}_acc{:.4}{}", self.model_id, self.epoch, self.accuracy, CHECKPOINT_SUFFIX)
    }

    pub fn load(path: &Path) -> Result<Checkpoint> {
        atomic::read_json(path)
    }
}

pub fn checkpoint_dir(run_dir: &Path) -> PathBuf {
    run_dir.join(CHECKPOINT_DIR)
}

/// Every checkpoint file in `dir`, sorted by name. A missing directory holds
/// none.
pub fn list_checkpoints(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut found: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| TrainError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.file_name().and_then(|n| n.to_str()).map_or(false, |n| n.ends_with(CHECKPOINT_SUFFIX)))
        .collect();
    found.sort();
    Ok(found)
}

/// Writes `checkpoint` into `dir`, replacing whatever checkpoint was there.
///
/// The new file is fully written to a temporary name first; old checkpoints
/// are removed only after that succeeds, then the temporary is renamed into
/// place.
pub fn save_replacing(dir: &Path, checkpoint: &Checkpoint) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| TrainError::io(dir, e))?;
    let path = dir.join(checkpoint.file_name());
    let bytes = serde_json::to_vec(checkpoint).map_err(|e| TrainError::json(&path, e))?;
    let tmp = atomic::write_tmp(&path, &bytes)?;

    for old in list_checkpoints(dir)? {
        fs::remove_file(&old).map_err(|e| TrainError::io(&old, e))?;
    }
    atomic::commit(&tmp, &path)?;

    info!(
        epoch = checkpoint.epoch,
        accuracy = checkpoint.accuracy,
        path = %path.display(),
        "checkpoint saved"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Model, ModelSpec, MultiHeadNetwork};

    fn checkpoint(epoch: usize, accuracy: f64) -> Checkpoint {
        let net = MultiHeadNetwork::new("mlp", ModelSpec::new(3, 2, 2));
        Checkpoint {
            model_id: "mlp".into(),
            epoch,
            accuracy,
            val_loss: 1.0,
            saved_at: "2024-01-01 00:00:00".into(),
            state: net.state(),
        }
    }

    #[test]
    fn file_name_carries_epoch_and_accuracy() {
        assert_eq!(checkpoint(7, 0.5).file_name(), "mlp_epoch7_acc0.5000.ckpt.json");
    }

    #[test]
    fn newer_save_replaces_the_older_one() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = checkpoint_dir(tmp.path());
        save_replacing(&dir, &checkpoint(1, 0.1)).unwrap();
        let second = save_replacing(&dir, &checkpoint(3, 0.4)).unwrap();

        assert_eq!(list_checkpoints(&dir).unwrap(), vec![second.clone()]);
        let loaded = Checkpoint::load(&second).unwrap();
        assert_eq!(loaded.epoch, 3);
        let expected = checkpoint(3, 0.4).state;
        for (name, tensor) in &expected.tensors {
            let got = &loaded.state.tensors[name];
            assert!(got.data.iter().zip(&tensor.data).all(|(a, b)| (a - b).abs() < 1e-12));
        }
    }

    #[test]
    fn listing_a_missing_directory_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(list_checkpoints(&tmp.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn unrelated_files_survive_replacement() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = checkpoint_dir(tmp.path());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("notes.txt"), "keep").unwrap();
        save_replacing(&dir, &checkpoint(1, 0.2)).unwrap();
        assert!(dir.join("notes.txt").exists());
    }
}
