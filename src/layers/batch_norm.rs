use serde::{Serialize, Deserialize};

use crate::error::{NnError, Result};
use crate::layers::layer::{decode_params, encode_params, expect_rank, Layer};
use crate::math::backend::Backend;
use crate::math::matrix::Matrix;
use crate::math::tensor::Tensor;
use crate::optim::optimizer::Optimizer;

const EPSILON: f64 = 1e-8;

/// Per-feature batch normalization over `[batch, features]` inputs.
///
/// Training mode normalises with the batch's own mean/variance and folds
/// them into the running statistics (`running = m·running + (1-m)·batch`).
/// Inference mode normalises with the running statistics and never
/// touches them.
#[derive(Debug)]
pub struct BatchNorm {
    features: usize,
    momentum: f64,
    gamma: Vec<f64>,
    beta: Vec<f64>,
    running_mean: Vec<f64>,
    running_var: Vec<f64>,
    cache: Option<NormCache>,
    gradients: Option<(Vec<f64>, Vec<f64>)>,
}

#[derive(Debug)]
struct NormCache {
    x_norm: Vec<Vec<f64>>,
    std: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct BatchNormParams {
    features: usize,
    momentum: f64,
    gamma: Vec<f64>,
    beta: Vec<f64>,
    running_mean: Vec<f64>,
    running_var: Vec<f64>,
}

impl BatchNorm {
    pub const KIND: &'static str = "batch_norm";

    pub fn new(features: usize) -> BatchNorm {
        BatchNorm::with_momentum(features, 0.9)
    }

    pub fn with_momentum(features: usize, momentum: f64) -> BatchNorm {
        BatchNorm {
            features,
            momentum,
            gamma: vec![1.0; features],
            beta: vec![0.0; features],
            running_mean: vec![0.0; features],
            running_var: vec![1.0; features],
            cache: None,
            gradients: None,
        }
    }

    pub fn from_params(params: serde_json::Value) -> Result<BatchNorm> {
        let mut layer = BatchNorm::new(0);
        layer.set_params(params)?;
        Ok(layer)
    }

    pub fn gamma(&self) -> &[f64] {
        &self.gamma
    }

    pub fn beta(&self) -> &[f64] {
        &self.beta
    }

    pub fn running_mean(&self) -> &[f64] {
        &self.running_mean
    }

    pub fn running_var(&self) -> &[f64] {
        &self.running_var
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }

    /// (dGamma, dBeta) from the most recent backward pass.
    pub fn gradients(&self) -> Option<(&[f64], &[f64])> {
        self.gradients.as_ref().map(|(g, b)| (g.as_slice(), b.as_slice()))
    }

    fn batch_statistics(&self, rows: &[Vec<f64>]) -> (Vec<f64>, Vec<f64>) {
        let n = rows.len().max(1) as f64;
        let mut mean = vec![0.0; self.features];
        for row in rows {
            for (m, x) in mean.iter_mut().zip(row.iter()) {
                *m += x;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0; self.features];
        for row in rows {
            for j in 0..self.features {
                var[j] += (row[j] - mean[j]).powi(2);
            }
        }
        var.iter_mut().for_each(|v| *v /= n);
        (mean, var)
    }
}

impl Layer for BatchNorm {
    fn kind(&self) -> &'static str {
        BatchNorm::KIND
    }

    fn forward(&mut self, _backend: &Backend, input: &Tensor, training: bool) -> Result<Tensor> {
        expect_rank("batch_norm_forward", &input.shape, 2)?;
        if input.shape[1] != self.features {
            return Err(NnError::shape("batch_norm_forward", &input.shape, &[input.batch_size(), self.features]));
        }
        let rows = input.to_rows();

        let (mean, var) = if training {
            let (mean, var) = self.batch_statistics(&rows);
            for j in 0..self.features {
                self.running_mean[j] = self.momentum * self.running_mean[j] + (1.0 - self.momentum) * mean[j];
                self.running_var[j] = self.momentum * self.running_var[j] + (1.0 - self.momentum) * var[j];
            }
            (mean, var)
        } else {
            (self.running_mean.clone(), self.running_var.clone())
        };

        let std: Vec<f64> = var.iter().map(|v| (v + EPSILON).sqrt()).collect();
        let x_norm: Vec<Vec<f64>> = rows.iter()
            .map(|row| (0..self.features).map(|j| (row[j] - mean[j]) / std[j]).collect())
            .collect();
        let data = x_norm.iter()
            .flat_map(|row| (0..self.features).map(move |j| (j, row[j])))
            .map(|(j, xn)| self.gamma[j] * xn + self.beta[j])
            .collect();

        self.cache = Some(NormCache { x_norm, std });
        Tensor::new(input.shape.clone(), data)
    }

    fn backward(&mut self, _backend: &Backend, output_gradient: &Tensor) -> Result<Tensor> {
        let cache = self.cache.as_ref().ok_or(NnError::MissingForwardCache(BatchNorm::KIND))?;
        let batch = cache.x_norm.len();
        let expected = [batch, self.features];
        if output_gradient.shape != expected {
            return Err(NnError::shape("batch_norm_backward", &output_gradient.shape, &expected));
        }
        let grad = output_gradient.to_rows();
        let m = batch.max(1) as f64;

        let mut d_gamma = vec![0.0; self.features];
        let mut d_beta = vec![0.0; self.features];
        let mut sum_dx_norm = vec![0.0; self.features];
        let mut sum_dx_norm_x_norm = vec![0.0; self.features];
        let mut dx_norm = vec![vec![0.0; self.features]; batch];

        for i in 0..batch {
            for j in 0..self.features {
                let dout = grad[i][j];
                let xn = cache.x_norm[i][j];
                d_gamma[j] += dout * xn;
                d_beta[j] += dout;
                let dxn = dout * self.gamma[j];
                dx_norm[i][j] = dxn;
                sum_dx_norm[j] += dxn;
                sum_dx_norm_x_norm[j] += dxn * xn;
            }
        }

        // dx = (1/m)(1/std)(m·dx̂ − Σdx̂ − x̂·Σ(dx̂·x̂))
        let mut data = Vec::with_capacity(batch * self.features);
        for i in 0..batch {
            for j in 0..self.features {
                let term = m * dx_norm[i][j] - sum_dx_norm[j] - cache.x_norm[i][j] * sum_dx_norm_x_norm[j];
                data.push(term / (m * cache.std[j]));
            }
        }

        d_gamma.iter_mut().for_each(|g| *g /= m);
        d_beta.iter_mut().for_each(|b| *b /= m);
        self.gradients = Some((d_gamma, d_beta));
        Tensor::new(expected.to_vec(), data)
    }

    /// Gamma travels as a 1×features weight matrix, beta as the bias vector.
    fn update_params(&mut self, optimizer: &mut dyn Optimizer, layer_index: usize) -> Result<()> {
        let (d_gamma, d_beta) = self.gradients.as_ref()
            .ok_or(NnError::MissingForwardCache(BatchNorm::KIND))?;
        let mut gamma = Matrix::from_row(self.gamma.clone());
        let d_gamma = Matrix::from_row(d_gamma.clone());
        optimizer.update(layer_index, &mut gamma, &mut self.beta, &d_gamma, d_beta)?;
        self.gamma = gamma.to_flat();
        Ok(())
    }

    fn params(&self) -> Result<serde_json::Value> {
        encode_params(&BatchNormParams {
            features: self.features,
            momentum: self.momentum,
            gamma: self.gamma.clone(),
            beta: self.beta.clone(),
            running_mean: self.running_mean.clone(),
            running_var: self.running_var.clone(),
        })
    }

    fn set_params(&mut self, params: serde_json::Value) -> Result<()> {
        let p: BatchNormParams = decode_params(BatchNorm::KIND, params)?;
        let n = p.features;
        if p.gamma.len() != n || p.beta.len() != n || p.running_mean.len() != n || p.running_var.len() != n {
            return Err(NnError::MalformedModel(format!(
                "batch_norm vectors do not all have {n} features"
            )));
        }
        self.features = n;
        self.momentum = p.momentum;
        self.gamma = p.gamma;
        self.beta = p.beta;
        self.running_mean = p.running_mean;
        self.running_var = p.running_var;
        self.cache = None;
        self.gradients = None;
        Ok(())
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        expect_rank("batch_norm_shape", input_shape, 2)?;
        if input_shape[1] != self.features {
            return Err(NnError::shape("batch_norm_shape", input_shape, &[input_shape[0], self.features]));
        }
        Ok(input_shape.to_vec())
    }

    fn parameter_count(&self) -> usize {
        2 * self.features
    }
}
