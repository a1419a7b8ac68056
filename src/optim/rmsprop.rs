use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::math::matrix::Matrix;
use crate::optim::optimizer::{
    accumulator, check_gradients, descend_biases, layer_state, Optimizer, OptimizerKind, OptimizerState,
};

/// RMSProp: `cache = beta * cache + (1 - beta) * g²`,
/// `W -= lr * g / (sqrt(cache) + eps)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RmsProp {
    pub learning_rate: f64,
    pub beta: f64,
    pub epsilon: f64,
    #[serde(default, with = "layer_state")]
    cache: BTreeMap<usize, Matrix>,
}

impl RmsProp {
    pub fn new(learning_rate: f64) -> RmsProp {
        RmsProp::with_decay(learning_rate, 0.9, 1e-8)
    }

    pub fn with_decay(learning_rate: f64, beta: f64, epsilon: f64) -> RmsProp {
        RmsProp {
            learning_rate,
            beta,
            epsilon,
            cache: BTreeMap::new(),
        }
    }
}

impl Optimizer for RmsProp {
    fn kind(&self) -> OptimizerKind {
        OptimizerKind::RmsProp
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
        let cache = accumulator(&mut self.cache, layer_index, weights)?;

        for r in 0..weights.rows {
            for c in 0..weights.cols {
                let g = d_weights.data[r][c];
                let acc = &mut cache.data[r][c];
                *acc = self.beta * *acc + (1.0 - self.beta) * g * g;
                weights.data[r][c] -= self.learning_rate * g / (acc.sqrt() + self.epsilon);
            }
        }

        descend_biases(biases, d_biases, self.learning_rate);
        Ok(())
    }

    fn reset(&mut self) {
        self.cache.clear();
    }

    fn snapshot(&self) -> OptimizerState {
        OptimizerState::RmsProp(self.clone())
    }
}
