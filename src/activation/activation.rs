use serde::{Serialize, Deserialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use crate::error::NnError;
use crate::math::matrix::Matrix;

const GELU_COEFF: f64 = 0.044715;

/// Which cached quantity `derivative()` must be fed during backprop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivativeSource {
    /// The activated output `A = f(Z)`: the derivative is written in terms of f(x).
    Activated,
    /// The pre-activation `Z`.
    PreActivation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    Sigmoid,
    ReLU,
    Linear,
    /// Softmax is vector-valued: it normalises each sample (each column of
    /// the output×batch pre-activation), so it is never applied element-wise.
    Softmax,
    Tanh,
    LeakyReLU { alpha: f64 },
    Elu { alpha: f64 },
    Gelu,
    HardSigmoid,
    HardTanh { min: f64, max: f64 },
    HardSwish,
}

impl ActivationFunction {
    pub fn leaky_relu() -> ActivationFunction {
        ActivationFunction::LeakyReLU { alpha: 0.01 }
    }

    pub fn elu() -> ActivationFunction {
        ActivationFunction::Elu { alpha: 1.0 }
    }

    pub fn hard_tanh() -> ActivationFunction {
        ActivationFunction::HardTanh { min: -1.0, max: 1.0 }
    }

    /// Identifier accepted by `from_str`.
    pub fn name(&self) -> &'static str {
        match self {
            ActivationFunction::Sigmoid => "sigmoid",
            ActivationFunction::ReLU => "relu",
            ActivationFunction::Linear => "linear",
            ActivationFunction::Softmax => "softmax",
            ActivationFunction::Tanh => "tanh",
            ActivationFunction::LeakyReLU { .. } => "leaky-relu",
            ActivationFunction::Elu { .. } => "elu",
            ActivationFunction::Gelu => "gelu",
            ActivationFunction::HardSigmoid => "hardsigmoid",
            ActivationFunction::HardTanh { .. } => "hardtanh",
            ActivationFunction::HardSwish => "hardswish",
        }
    }

    pub fn derivative_source(&self) -> DerivativeSource {
        match self {
            ActivationFunction::Gelu
            | ActivationFunction::HardSigmoid
            | ActivationFunction::HardTanh { .. }
            | ActivationFunction::HardSwish => DerivativeSource::PreActivation,
            _ => DerivativeSource::Activated,
        }
    }

    /// True for the ReLU family, which wants He initialisation.
    pub fn prefers_he_init(&self) -> bool {
        matches!(
            self,
            ActivationFunction::ReLU
                | ActivationFunction::LeakyReLU { .. }
                | ActivationFunction::Elu { .. }
        )
    }

    /// Applies the activation to an output×batch matrix.
    pub fn activate(&self, z: &Matrix) -> Matrix {
        match self {
            ActivationFunction::Softmax => softmax_columns(z),
            _ => z.map(|x| self.function(x)),
        }
    }

    /// Derivative of the activation, evaluated on whichever quantity
    /// `derivative_source()` names.
    ///
    /// Softmax returns all ones: it is only paired with cross-entropy, whose
    /// gradient `output - target` already is the gradient w.r.t. the logits,
    /// so the Jacobian must not be applied a second time.
    pub fn derivative(&self, x: &Matrix) -> Matrix {
        x.map(|v| self.slope(v))
    }

    fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Linear | ActivationFunction::Softmax => x,
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { x } else { alpha * x },
            ActivationFunction::Elu { alpha } => {
                if x > 0.0 { x } else { alpha * (x.exp() - 1.0) }
            }
            ActivationFunction::Gelu => {
                let c = (2.0_f64 / PI).sqrt();
                0.5 * x * (1.0 + (c * (x + GELU_COEFF * x.powi(3))).tanh())
            }
            ActivationFunction::HardSigmoid => ((x + 3.0) / 6.0).clamp(0.0, 1.0),
            ActivationFunction::HardTanh { min, max } => x.max(*min).min(*max),
            ActivationFunction::HardSwish => {
                if x <= -3.0 {
                    0.0
                } else if x >= 3.0 {
                    x
                } else {
                    x * (x + 3.0) / 6.0
                }
            }
        }
    }

    fn slope(&self, x: f64) -> f64 {
        match self {
            // x = sigmoid(z)
            ActivationFunction::Sigmoid => x * (1.0 - x),
            // A > 0 exactly when Z > 0
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Linear | ActivationFunction::Softmax => 1.0,
            // x = tanh(z)
            ActivationFunction::Tanh => 1.0 - x * x,
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { 1.0 } else { *alpha },
            // For z <= 0, f'(z) = alpha * e^z = f(z) + alpha
            ActivationFunction::Elu { alpha } => if x > 0.0 { 1.0 } else { x + alpha },
            ActivationFunction::Gelu => {
                let c = (2.0_f64 / PI).sqrt();
                let inner = c * (x + GELU_COEFF * x.powi(3));
                let tanh_inner = inner.tanh();
                let sech2 = 1.0 - tanh_inner * tanh_inner;
                let d_inner = c * (1.0 + 3.0 * GELU_COEFF * x.powi(2));
                0.5 * (1.0 + tanh_inner) + 0.5 * x * sech2 * d_inner
            }
            ActivationFunction::HardSigmoid => {
                if (-3.0..=3.0).contains(&x) { 1.0 / 6.0 } else { 0.0 }
            }
            ActivationFunction::HardTanh { min, max } => {
                if x >= *min && x <= *max { 1.0 } else { 0.0 }
            }
            ActivationFunction::HardSwish => {
                if x < -3.0 {
                    0.0
                } else if x > 3.0 {
                    1.0
                } else {
                    x / 3.0 + 0.5
                }
            }
        }
    }
}

/// Column-wise softmax with max subtraction.
fn softmax_columns(z: &Matrix) -> Matrix {
    let mut res = Matrix::zeros(z.rows, z.cols);
    for j in 0..z.cols {
        let max = (0..z.rows).map(|i| z.data[i][j]).fold(f64::NEG_INFINITY, f64::max);
        let mut sum = 0.0;
        for i in 0..z.rows {
            let e = (z.data[i][j] - max).exp();
            res.data[i][j] = e;
            sum += e;
        }
        for i in 0..z.rows {
            res.data[i][j] /= sum;
        }
    }
    res
}

impl FromStr for ActivationFunction {
    type Err = NnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sigmoid" => Ok(ActivationFunction::Sigmoid),
            "relu" => Ok(ActivationFunction::ReLU),
            "linear" | "identity" => Ok(ActivationFunction::Linear),
            "softmax" => Ok(ActivationFunction::Softmax),
            "tanh" => Ok(ActivationFunction::Tanh),
            "leaky-relu" | "leakyrelu" => Ok(ActivationFunction::leaky_relu()),
            "elu" => Ok(ActivationFunction::elu()),
            "gelu" => Ok(ActivationFunction::Gelu),
            "hardsigmoid" => Ok(ActivationFunction::HardSigmoid),
            "hardtanh" => Ok(ActivationFunction::hard_tanh()),
            "hardswish" => Ok(ActivationFunction::HardSwish),
            other => Err(NnError::UnknownActivation(other.to_string())),
        }
    }
}

impl fmt::Display for ActivationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
