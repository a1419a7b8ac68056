pub mod error;
pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod train;

// Convenience re-exports
pub use error::{NnError, Result};
pub use math::{Backend, BackendInfo, BackendKind, Matrix, NumericBackend, Tensor};
pub use activation::ActivationFunction;
pub use layers::{BatchNorm, Conv2d, Dense, Dropout, Flatten, Layer, LayerRecord, LayerRegistry, WeightInit};
pub use network::{ModelFile, Network, NetworkConfig, NetworkSpec, LayerSpec, PredictInput, Prediction};
pub use loss::{Loss, LossType};
pub use optim::{Adam, AdamW, Optimizer, OptimizerKind, OptimizerState, RmsProp, Sgd};
pub use train::{DataLoader, EpochStats, TrainConfig, TrainReport};
