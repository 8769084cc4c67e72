pub mod model;
pub mod network;
pub mod registry;
pub mod spec;

pub use model::{Model, ModelState};
pub use network::MultiHeadNetwork;
pub use registry::{ModelConstructor, ModelRegistry};
pub use spec::ModelSpec;
