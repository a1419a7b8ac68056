use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Serialize, Deserialize};

use crate::error::{NnError, Result};
use crate::layers::layer::{decode_params, encode_params, Layer};
use crate::math::backend::Backend;
use crate::math::tensor::Tensor;
use crate::optim::optimizer::Optimizer;

/// Inverted dropout: during training each element survives with
/// probability `1 - rate` and survivors are scaled by `1 / (1 - rate)`,
/// so inference is a plain pass-through.
///
/// A rate of exactly 0 or 1 disables the layer entirely.
#[derive(Debug)]
pub struct Dropout {
    rate: f64,
    rng: StdRng,
    mask: Option<Vec<f64>>,
}

#[derive(Serialize, Deserialize)]
struct DropoutParams {
    rate: f64,
}

impl Dropout {
    pub const KIND: &'static str = "dropout";

    pub fn new(rate: f64) -> Result<Dropout> {
        Dropout::with_rng(rate, StdRng::from_entropy())
    }

    /// Deterministic masks for reproducible runs.
    pub fn with_seed(rate: f64, seed: u64) -> Result<Dropout> {
        Dropout::with_rng(rate, StdRng::seed_from_u64(seed))
    }

    fn with_rng(rate: f64, rng: StdRng) -> Result<Dropout> {
        validate_rate(rate)?;
        Ok(Dropout { rate, rng, mask: None })
    }

    pub fn from_params(params: serde_json::Value) -> Result<Dropout> {
        let p: DropoutParams = decode_params(Dropout::KIND, params)?;
        Dropout::new(p.rate).map_err(|e| NnError::MalformedModel(e.to_string()))
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    fn is_active(&self) -> bool {
        self.rate > 0.0 && self.rate < 1.0
    }
}

fn validate_rate(rate: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(NnError::InvalidConfig(format!("dropout rate {rate} outside [0, 1]")));
    }
    Ok(())
}

impl Layer for Dropout {
    fn kind(&self) -> &'static str {
        Dropout::KIND
    }

    fn forward(&mut self, _backend: &Backend, input: &Tensor, training: bool) -> Result<Tensor> {
        if !training || !self.is_active() {
            self.mask = None;
            return Ok(input.clone());
        }

        let keep = 1.0 - self.rate;
        let scale = 1.0 / keep;
        let mask: Vec<f64> = (0..input.len())
            .map(|_| if self.rng.gen::<f64>() < keep { scale } else { 0.0 })
            .collect();
        let data = input.data.iter().zip(mask.iter()).map(|(x, m)| x * m).collect();
        self.mask = Some(mask);
        Tensor::new(input.shape.clone(), data)
    }

    fn backward(&mut self, _backend: &Backend, output_gradient: &Tensor) -> Result<Tensor> {
        let Some(mask) = &self.mask else {
            return Ok(output_gradient.clone());
        };
        if mask.len() != output_gradient.len() {
            return Err(NnError::shape("dropout_backward", &output_gradient.shape, &[mask.len()]));
        }
        let data = output_gradient.data.iter().zip(mask.iter()).map(|(g, m)| g * m).collect();
        Tensor::new(output_gradient.shape.clone(), data)
    }

    fn update_params(&mut self, _optimizer: &mut dyn Optimizer, _layer_index: usize) -> Result<()> {
        Ok(())
    }

    fn params(&self) -> Result<serde_json::Value> {
        encode_params(&DropoutParams { rate: self.rate })
    }

    fn set_params(&mut self, params: serde_json::Value) -> Result<()> {
        let p: DropoutParams = decode_params(Dropout::KIND, params)?;
        validate_rate(p.rate).map_err(|e| NnError::MalformedModel(e.to_string()))?;
        self.rate = p.rate;
        self.mask = None;
        Ok(())
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        Ok(input_shape.to_vec())
    }
}
