use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::math::matrix::Matrix;
use crate::optim::optimizer::{
    accumulator, check_gradients, descend_biases, layer_state, Optimizer, OptimizerKind, OptimizerState,
};

/// Adam on raw (uncorrected) moments:
///   m = beta1 * m + (1 - beta1) * g
///   v = beta2 * v + (1 - beta2) * g²
///   W -= lr * m / (sqrt(v) + eps)
///
/// The usual `1 - beta^t` bias correction is not applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    #[serde(default, with = "layer_state")]
    m: BTreeMap<usize, Matrix>,
    #[serde(default, with = "layer_state")]
    v: BTreeMap<usize, Matrix>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Adam {
        Adam::with_betas(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub fn with_betas(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Adam {
        Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            m: BTreeMap::new(),
            v: BTreeMap::new(),
        }
    }

    /// First and second moment for a layer, once it has been updated.
    pub fn moments(&self, layer_index: usize) -> Option<(&Matrix, &Matrix)> {
        Some((self.m.get(&layer_index)?, self.v.get(&layer_index)?))
    }
}

/// Shared by Adam and AdamW: advances both moments for one gradient and
/// returns the step to subtract.
pub(crate) fn moment_step(
    m: &mut f64,
    v: &mut f64,
    g: f64,
    beta1: f64,
    beta2: f64,
    learning_rate: f64,
    epsilon: f64,
) -> f64 {
    *m = beta1 * *m + (1.0 - beta1) * g;
    *v = beta2 * *v + (1.0 - beta2) * g * g;
    learning_rate * *m / (v.sqrt() + epsilon)
}

impl Optimizer for Adam {
    fn kind(&self) -> OptimizerKind {
        OptimizerKind::Adam
    }

    fn update(
        &mut self,
        layer_index: usize,
        weights: &mut Matrix,
        biases: &mut [f64],
        d_weights: &Matrix,
        d_biases: &[f64],
    ) -> Result<()> {
        check_gradients(weights, biases, d_weights, d_biases)?;
        let m = accumulator(&mut self.m, layer_index, weights)?;
        let v = accumulator(&mut self.v, layer_index, weights)?;

        for r in 0..weights.rows {
            for c in 0..weights.cols {
                weights.data[r][c] -= moment_step(
                    &mut m.data[r][c],
                    &mut v.data[r][c],
                    d_weights.data[r][c],
                    self.beta1,
                    self.beta2,
                    self.learning_rate,
                    self.epsilon,
                );
            }
        }

        descend_biases(biases, d_biases, self.learning_rate);
        Ok(())
    }

    fn reset(&mut self) {
        self.m.clear();
        self.v.clear();
    }

    fn snapshot(&self) -> OptimizerState {
        OptimizerState::Adam(self.clone())
    }
}
