use serde::{Serialize, Deserialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{NnError, Result};
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::loss::mse::MseLoss;
use crate::math::backend::Backend;
use crate::math::matrix::Matrix;

/// Scalar objective plus its gradient w.r.t. the network output.
///
/// Both methods take batch×features matrices of identical shape.
pub trait Loss {
    fn kind(&self) -> LossType;

    fn calculate(&self, backend: &Backend, output: &Matrix, target: &Matrix) -> Result<f64>;

    fn gradient(&self, backend: &Backend, output: &Matrix, target: &Matrix) -> Result<Matrix>;
}

/// Selects which loss function the training loop uses.
///
/// - `Mse`         : Mean-squared error; pair with Linear or Sigmoid output.
/// - `CrossEntropy`: Categorical cross-entropy; pair with Softmax output.
///   The gradient is the combined Softmax+CE gradient (predicted - expected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    #[default]
    Mse,
    #[serde(alias = "crossentropy")]
    CrossEntropy,
}

impl LossType {
    pub fn build(self) -> Box<dyn Loss> {
        match self {
            LossType::Mse => Box::new(MseLoss),
            LossType::CrossEntropy => Box::new(CrossEntropyLoss),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LossType::Mse => "mse",
            LossType::CrossEntropy => "crossentropy",
        }
    }
}

impl FromStr for LossType {
    type Err = NnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mse" => Ok(LossType::Mse),
            "crossentropy" | "cross_entropy" | "cross-entropy" => Ok(LossType::CrossEntropy),
            other => Err(NnError::UnknownLoss(other.to_string())),
        }
    }
}

impl fmt::Display for LossType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
