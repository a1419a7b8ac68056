use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::math::matrix::Matrix;
use crate::optim::optimizer::{
    accumulator, check_gradients, clip_gradients, descend_biases, layer_state, Optimizer, OptimizerKind,
    OptimizerState,
};

/// Stochastic gradient descent with optional momentum, L2 weight decay and
/// symmetric gradient clipping.
///
/// Per step, for weights:
///   g = clip(dW) + decay * W
///   v = momentum * v + lr * g     (or just lr * g without momentum)
///   W -= v
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    pub clip_value: f64,
    #[serde(default, with = "layer_state")]
    velocity: BTreeMap<usize, Matrix>,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd {
            learning_rate,
            momentum: 0.0,
            weight_decay: 0.0,
            clip_value: 0.0,
            velocity: BTreeMap::new(),
        }
    }

    pub fn with_momentum(mut self, momentum: f64) -> Sgd {
        self.momentum = momentum;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Sgd {
        self.weight_decay = weight_decay;
        self
    }

    pub fn with_clip_value(mut self, clip_value: f64) -> Sgd {
        self.clip_value = clip_value;
        self
    }

    pub fn velocity(&self, layer_index: usize) -> Option<&Matrix> {
        self.velocity.get(&layer_index)
    }
}

impl Optimizer for Sgd {
    fn kind(&self) -> OptimizerKind {
        OptimizerKind::Sgd
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
        let lr = self.learning_rate;
        let velocity = accumulator(&mut self.velocity, layer_index, weights)?;

        let (mut d_w, d_b) = clip_gradients(d_weights, d_biases, self.clip_value);

        if self.weight_decay > 0.0 {
            let decay = self.weight_decay;
            d_w = d_w.zip_with(weights, "sgd_decay", |g, w| g + decay * w)?;
        }

        let mut step = d_w.map(|g| lr * g);
        if self.momentum > 0.0 {
            let momentum = self.momentum;
            step = velocity.zip_with(&step, "sgd_momentum", |v, s| momentum * v + s)?;
            *velocity = step.clone();
        }

        *weights = weights.zip_with(&step, "sgd_step", |w, s| w - s)?;
        descend_biases(biases, &d_b, lr);
        Ok(())
    }

    fn reset(&mut self) {
        self.velocity.clear();
    }

    fn snapshot(&self) -> OptimizerState {
        OptimizerState::Sgd(self.clone())
    }
}
