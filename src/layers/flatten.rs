use crate::error::{NnError, Result};
use crate::layers::layer::Layer;
use crate::math::backend::Backend;
use crate::math::tensor::Tensor;
use crate::optim::optimizer::Optimizer;

/// Collapses every non-batch dimension: `[b, d1, d2, ...] → [b, d1·d2·...]`.
#[derive(Debug, Default)]
pub struct Flatten {
    input_shape: Option<Vec<usize>>,
}

impl Flatten {
    pub const KIND: &'static str = "flatten";

    pub fn new() -> Flatten {
        Flatten::default()
    }
}

impl Layer for Flatten {
    fn kind(&self) -> &'static str {
        Flatten::KIND
    }

    fn forward(&mut self, _backend: &Backend, input: &Tensor, _training: bool) -> Result<Tensor> {
        let flat = input.reshape(vec![input.batch_size(), input.sample_len()])?;
        self.input_shape = Some(input.shape.clone());
        Ok(flat)
    }

    fn backward(&mut self, _backend: &Backend, output_gradient: &Tensor) -> Result<Tensor> {
        let shape = self.input_shape.clone().ok_or(NnError::MissingForwardCache(Flatten::KIND))?;
        output_gradient.reshape(shape)
    }

    fn update_params(&mut self, _optimizer: &mut dyn Optimizer, _layer_index: usize) -> Result<()> {
        Ok(())
    }

    fn params(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({}))
    }

    fn set_params(&mut self, _params: serde_json::Value) -> Result<()> {
        self.input_shape = None;
        Ok(())
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        match input_shape.split_first() {
            Some((&batch, rest)) => Ok(vec![batch, rest.iter().product()]),
            None => Err(NnError::shape("flatten_shape", input_shape, &[0, 0])),
        }
    }
}
