pub mod config;
pub mod model_file;
pub mod network;
pub mod spec;

pub use config::NetworkConfig;
pub use model_file::ModelFile;
pub use network::{Network, PredictInput, Prediction};
pub use spec::{NetworkSpec, LayerSpec};
