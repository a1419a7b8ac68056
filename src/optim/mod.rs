pub mod optimizer;
pub mod sgd;
pub mod adam;
pub mod adamw;
pub mod rmsprop;

pub use optimizer::{Optimizer, OptimizerKind, OptimizerState};
pub use sgd::Sgd;
pub use adam::Adam;
pub use adamw::AdamW;
pub use rmsprop::RmsProp;
