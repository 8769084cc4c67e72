pub mod early_stop;
pub mod epoch_record;
pub mod hooks;
pub mod loop_fn;
pub mod metrics;
pub mod report;
pub mod train_config;

pub use early_stop::{EarlyStopping, StopState};
pub use epoch_record::EpochRecord;
pub use hooks::TrainHooks;
pub use loop_fn::train_loop;
pub use metrics::{sequence_accuracy, ConfusionMatrix, MetricsAccumulator, PassSummary, SequenceAccuracy};
pub use report::FinalReport;
pub use train_config::{TrainConfig, GRAD_CLIP_NORM};
