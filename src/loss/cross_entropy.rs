use crate::error::Result;
use crate::loss::loss_type::{Loss, LossType};
use crate::math::backend::Backend;
use crate::math::matrix::Matrix;

/// Categorical cross-entropy loss for use with a Softmax output layer.
pub struct CrossEntropyLoss;

/// Predictions are clipped into [EPS, 1 - EPS] before log().
const EPS: f64 = 1e-15;

impl Loss for CrossEntropyLoss {
    fn kind(&self) -> LossType {
        LossType::CrossEntropy
    }

    /// Computes the scalar cross-entropy loss:
    ///   L = -sum(expected * log(clip(predicted))) / cols
    ///
    /// `output` and `target` are batch×classes, so the divisor is the class
    /// count, not the batch size.
    fn calculate(&self, backend: &Backend, output: &Matrix, target: &Matrix) -> Result<f64> {
        output.check_same_shape(target, "cross_entropy")?;
        if output.cols == 0 {
            return Ok(0.0);
        }
        let clipped = backend.clip(output, EPS, 1.0 - EPS);
        let per_element = target.zip_with(&clipped, "cross_entropy", |y, p| -y * p.ln())?;
        Ok(per_element.sum() / output.cols as f64)
    }

    /// Gradient of the combined Softmax + cross-entropy w.r.t. the pre-softmax
    /// logits:
    ///   ∂L/∂z_i = predicted[i] - expected[i]   (element-wise)
    ///
    /// The Softmax derivative is all ones, so this delta passes through the
    /// output layer unchanged.
    fn gradient(&self, backend: &Backend, output: &Matrix, target: &Matrix) -> Result<Matrix> {
        backend.subtract(output, target)
    }
}
