pub mod layer;
pub mod dense;
pub mod conv2d;
pub mod batch_norm;
pub mod dropout;
pub mod flatten;
pub mod registry;

pub use layer::{Layer, LayerRecord};
pub use dense::{Dense, WeightInit};
pub use conv2d::Conv2d;
pub use batch_norm::BatchNorm;
pub use dropout::Dropout;
pub use flatten::Flatten;
pub use registry::{LayerFactory, LayerRegistry};
