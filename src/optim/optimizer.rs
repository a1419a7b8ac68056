use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{NnError, Result};
use crate::math::matrix::Matrix;
use crate::optim::adam::Adam;
use crate::optim::adamw::AdamW;
use crate::optim::rmsprop::RmsProp;
use crate::optim::sgd::Sgd;

/// Stateful update rule applied one layer at a time.
///
/// Accumulators are keyed by `layer_index` and created lazily, shaped like
/// the weight matrix they shadow. A layer's weight shape must therefore stay
/// fixed for the lifetime of the optimizer; a mismatch is reported as an
/// error rather than silently reallocating.
pub trait Optimizer {
    fn kind(&self) -> OptimizerKind;

    /// Applies one step to `weights` and `biases` in place.
    ///
    /// Biases always get plain `b -= lr * db`.
    fn update(
        &mut self,
        layer_index: usize,
        weights: &mut Matrix,
        biases: &mut [f64],
        d_weights: &Matrix,
        d_biases: &[f64],
    ) -> Result<()>;

    /// Drops every per-layer accumulator.
    fn reset(&mut self);

    /// Hyperparameters plus accumulators, for persistence.
    fn snapshot(&self) -> OptimizerState;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Sgd,
    Adam,
    #[serde(rename = "adamw")]
    AdamW,
    #[serde(rename = "rmsprop")]
    RmsProp,
}

impl OptimizerKind {
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerKind::Sgd => "sgd",
            OptimizerKind::Adam => "adam",
            OptimizerKind::AdamW => "adamw",
            OptimizerKind::RmsProp => "rmsprop",
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = NnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sgd" => Ok(OptimizerKind::Sgd),
            "adam" => Ok(OptimizerKind::Adam),
            "adamw" => Ok(OptimizerKind::AdamW),
            "rmsprop" => Ok(OptimizerKind::RmsProp),
            other => Err(NnError::UnknownOptimizer(other.to_string())),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Serialized optimizer, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerState {
    Sgd(Sgd),
    Adam(Adam),
    #[serde(rename = "adamw")]
    AdamW(AdamW),
    #[serde(rename = "rmsprop")]
    RmsProp(RmsProp),
}

impl OptimizerState {
    pub fn kind(&self) -> OptimizerKind {
        match self {
            OptimizerState::Sgd(_) => OptimizerKind::Sgd,
            OptimizerState::Adam(_) => OptimizerKind::Adam,
            OptimizerState::AdamW(_) => OptimizerKind::AdamW,
            OptimizerState::RmsProp(_) => OptimizerKind::RmsProp,
        }
    }

    pub fn into_optimizer(self) -> Box<dyn Optimizer> {
        match self {
            OptimizerState::Sgd(o) => Box::new(o),
            OptimizerState::Adam(o) => Box::new(o),
            OptimizerState::AdamW(o) => Box::new(o),
            OptimizerState::RmsProp(o) => Box::new(o),
        }
    }
}

/// Rejects gradients whose shapes do not mirror their parameters.
pub(crate) fn check_gradients(
    weights: &Matrix,
    biases: &[f64],
    d_weights: &Matrix,
    d_biases: &[f64],
) -> Result<()> {
    weights.check_same_shape(d_weights, "optimizer_update")?;
    if biases.len() != d_biases.len() {
        return Err(NnError::shape("optimizer_update", &[biases.len()], &[d_biases.len()]));
    }
    Ok(())
}

/// Returns the accumulator for `layer_index`, creating a zero matrix shaped
/// like `weights` on first use.
pub(crate) fn accumulator<'a>(
    state: &'a mut BTreeMap<usize, Matrix>,
    layer_index: usize,
    weights: &Matrix,
) -> Result<&'a mut Matrix> {
    let acc = state
        .entry(layer_index)
        .or_insert_with(|| Matrix::zeros(weights.rows, weights.cols));
    if acc.rows != weights.rows || acc.cols != weights.cols {
        return Err(NnError::shape("optimizer_state", &acc.shape(), &weights.shape()));
    }
    Ok(acc)
}

pub(crate) fn clip_gradients(d_weights: &Matrix, d_biases: &[f64], clip: f64) -> (Matrix, Vec<f64>) {
    if clip > 0.0 {
        (
            d_weights.map(|g| g.max(-clip).min(clip)),
            d_biases.iter().map(|g| g.max(-clip).min(clip)).collect(),
        )
    } else {
        (d_weights.clone(), d_biases.to_vec())
    }
}

pub(crate) fn descend_biases(biases: &mut [f64], d_biases: &[f64], learning_rate: f64) {
    for (b, g) in biases.iter_mut().zip(d_biases.iter()) {
        *b -= learning_rate * g;
    }
}

/// Serializes per-layer accumulators as a list of `{layer, value}` entries.
///
/// `OptimizerState` is internally tagged, and integer map keys do not
/// survive serde's buffering of tagged enums.
pub(crate) mod layer_state {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    use crate::math::matrix::Matrix;

    #[derive(Serialize)]
    struct EntryRef<'a> {
        layer: usize,
        value: &'a Matrix,
    }

    #[derive(Deserialize)]
    struct Entry {
        layer: usize,
        value: Matrix,
    }

    pub fn serialize<S: Serializer>(state: &BTreeMap<usize, Matrix>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(state.iter().map(|(&layer, value)| EntryRef { layer, value }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<usize, Matrix>, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|e| (e.layer, e.value)).collect())
    }
}
