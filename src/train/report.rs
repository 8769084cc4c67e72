use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::persist::WorkerStats;
use crate::train::epoch_record::EpochRecord;

/// What `train_loop` returns once persistence has drained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub run_dir: PathBuf,
    pub history: Vec<EpochRecord>,
    pub best_val_accuracy: f64,
    pub best_epoch: Option<usize>,
    pub best_val_loss: Option<f64>,
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub stopped_at_epoch: Option<usize>,
    pub interrupted: bool,
    pub training_time: Duration,
    /// The single checkpoint left in the run directory, if any.
    pub checkpoint_path: Option<PathBuf>,
    /// `None` when the export task failed (the failure is in the log).
    pub export_path: Option<PathBuf>,
    pub persistence: WorkerStats,
}
