pub mod math;
pub mod activation;
pub mod layers;
pub mod loss;
pub mod optim;
pub mod network;
pub mod data;
pub mod sink;
pub mod persist;
pub mod experiment;
pub mod train;
pub mod predict;
pub mod error;

// Convenience re-exports
pub use math::Matrix;
pub use activation::ActivationFunction;
pub use data::{Charset, Dataset, ImageDirDataset, ImageDirOptions, Mode, SyntheticDataset, SyntheticOptions};
pub use error::{Result, TrainError};
pub use network::{Model, ModelRegistry, ModelSpec, MultiHeadNetwork};
pub use predict::Predictor;
pub use sink::{JsonlSink, MemorySink, MetricsSink, NullSink};
pub use train::{train_loop, EpochRecord, FinalReport, TrainConfig, TrainHooks};
