use serde::{Serialize, Deserialize};
use serde::de::DeserializeOwned;
use std::fmt;

use crate::error::{NnError, Result};
use crate::math::backend::Backend;
use crate::math::tensor::Tensor;
use crate::optim::optimizer::Optimizer;

/// Core trait every layer type implements to take part in forward/backward
/// propagation, training and persistence.
///
/// Caches written by `forward` are only meaningful for the very next
/// `backward` on the same batch; each call overwrites them.
pub trait Layer: fmt::Debug {
    /// Type tag stored in persisted models and looked up by the
    /// [`LayerRegistry`](crate::layers::LayerRegistry).
    fn kind(&self) -> &'static str;

    /// Computes the output for a batch. `training` switches on dropout
    /// masking and batch statistics.
    fn forward(&mut self, backend: &Backend, input: &Tensor, training: bool) -> Result<Tensor>;

    /// Takes ∂L/∂output for the batch just forwarded and returns ∂L/∂input,
    /// keeping the parameter gradients for `update_params`.
    fn backward(&mut self, backend: &Backend, output_gradient: &Tensor) -> Result<Tensor>;

    /// Applies one optimizer step with the gradients from the last
    /// `backward`. Parameterless layers do nothing.
    fn update_params(&mut self, optimizer: &mut dyn Optimizer, layer_index: usize) -> Result<()>;

    /// Everything needed to rebuild this layer without its constructor.
    fn params(&self) -> Result<serde_json::Value>;

    fn set_params(&mut self, params: serde_json::Value) -> Result<()>;

    /// Pure shape inference; `input_shape` includes the batch dimension.
    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>>;

    fn parameter_count(&self) -> usize {
        0
    }
}

/// A layer as stored on disk: type tag plus opaque parameter blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub kind: String,
    pub params: serde_json::Value,
}

impl LayerRecord {
    pub fn from_layer(layer: &dyn Layer) -> Result<LayerRecord> {
        Ok(LayerRecord {
            kind: layer.kind().to_string(),
            params: layer.params()?,
        })
    }
}

/// Decodes a parameter blob, reporting failures as a malformed model.
pub(crate) fn decode_params<T: DeserializeOwned>(kind: &str, params: serde_json::Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| NnError::MalformedModel(format!("{kind} parameters: {e}")))
}

pub(crate) fn encode_params<T: Serialize>(params: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(params)?)
}

/// Fails with a shape error unless `input` has exactly `rank` dimensions.
pub(crate) fn expect_rank(op: &'static str, input: &[usize], rank: usize) -> Result<()> {
    if input.len() != rank {
        return Err(NnError::shape(op, input, &vec![0; rank]));
    }
    Ok(())
}
