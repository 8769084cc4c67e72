pub mod atomic;
pub mod checkpoint;
pub mod export;
pub mod worker;

pub use checkpoint::{checkpoint_dir, Checkpoint};
pub use export::{export_final, load_model, ExportMetadata, ExportPaths, ExportedModel};
pub use worker::{PersistenceWorker, WorkerStats};
