use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::math::matrix::Matrix;
use crate::optim::adam::moment_step;
use crate::optim::optimizer::{
    accumulator, check_gradients, clip_gradients, descend_biases, layer_state, Optimizer, OptimizerKind,
    OptimizerState,
};

/// Adam with decoupled weight decay and optional gradient clipping.
///
/// Gradients are clipped before entering the moments; decay shrinks the
/// weight directly (`W -= lr * decay * W`) instead of being folded into
/// the gradient. Moments are uncorrected, as in [`Adam`](crate::optim::Adam).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdamW {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub weight_decay: f64,
    pub clip_value: f64,
    #[serde(default, with = "layer_state")]
    m: BTreeMap<usize, Matrix>,
    #[serde(default, with = "layer_state")]
    v: BTreeMap<usize, Matrix>,
}

impl AdamW {
    pub fn new(learning_rate: f64) -> AdamW {
        AdamW {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay: 0.01,
            clip_value: 0.0,
            m: BTreeMap::new(),
            v: BTreeMap::new(),
        }
    }

    pub fn with_betas(mut self, beta1: f64, beta2: f64, epsilon: f64) -> AdamW {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self.epsilon = epsilon;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> AdamW {
        self.weight_decay = weight_decay;
        self
    }

    pub fn with_clip_value(mut self, clip_value: f64) -> AdamW {
        self.clip_value = clip_value;
        self
    }
}

impl Optimizer for AdamW {
    fn kind(&self) -> OptimizerKind {
        OptimizerKind::AdamW
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
        let (d_w, d_b) = clip_gradients(d_weights, d_biases, self.clip_value);

        for r in 0..weights.rows {
            for c in 0..weights.cols {
                if self.weight_decay > 0.0 {
                    weights.data[r][c] -= self.learning_rate * self.weight_decay * weights.data[r][c];
                }
                weights.data[r][c] -= moment_step(
                    &mut m.data[r][c],
                    &mut v.data[r][c],
                    d_w.data[r][c],
                    self.beta1,
                    self.beta2,
                    self.learning_rate,
                    self.epsilon,
                );
            }
        }

        descend_biases(biases, &d_b, self.learning_rate);
        Ok(())
    }

    fn reset(&mut self) {
        self.m.clear();
        self.v.clear();
    }

    fn snapshot(&self) -> OptimizerState {
        OptimizerState::AdamW(self.clone())
    }
}
