pub mod backend;
pub mod matrix;
pub mod tensor;

pub use backend::{Backend, BackendInfo, BackendKind, NumericBackend};
pub use matrix::Matrix;
pub use tensor::Tensor;
