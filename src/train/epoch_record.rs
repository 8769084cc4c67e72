use serde::{Serialize, Deserialize};

/// One completed epoch, appended to the run history and sent on the
/// progress channel. Never mutated after it is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based.
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub val_position_accuracy: Vec<f64>,
    /// Rate in effect while this epoch trained.
    pub learning_rate: f64,
    pub elapsed_ms: u64,
}
