use crate::error::Result;
use crate::loss::loss_type::{Loss, LossType};
use crate::math::backend::Backend;
use crate::math::matrix::Matrix;

/// Mean squared error.
pub struct MseLoss;

impl Loss for MseLoss {
    fn kind(&self) -> LossType {
        LossType::Mse
    }

    /// Scalar MSE: mean((predicted - expected)²) over every element of the
    /// batch, not just the sample count.
    fn calculate(&self, backend: &Backend, output: &Matrix, target: &Matrix) -> Result<f64> {
        let diff = backend.subtract(target, output)?;
        let n = diff.rows * diff.cols;
        if n == 0 {
            return Ok(0.0);
        }
        let squared = backend.hadamard(&diff, &diff)?;
        Ok(squared.sum() / n as f64)
    }

    /// Per-output gradient: predicted - expected
    fn gradient(&self, backend: &Backend, output: &Matrix, target: &Matrix) -> Result<Matrix> {
        backend.subtract(output, target)
    }
}
