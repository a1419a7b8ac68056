use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activation::activation::{ActivationFunction, DerivativeSource};
use crate::error::{NnError, Result};
use crate::layers::layer::{decode_params, encode_params, expect_rank, Layer};
use crate::math::backend::Backend;
use crate::math::matrix::Matrix;
use crate::math::tensor::Tensor;
use crate::optim::optimizer::Optimizer;

/// How `Dense` draws its initial weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightInit {
    /// He for the ReLU family, Xavier for everything else.
    #[default]
    Auto,
    He,
    Xavier,
}

/// Fully connected layer: `A = f(W·Xᵀ + b)`.
///
/// Weights are stored output×input. Internally the batch runs along the
/// columns (output×batch); inputs and outputs at the trait boundary are
/// batch×features.
#[derive(Debug)]
pub struct Dense {
    input_size: usize,
    output_size: usize,
    pub weights: Matrix,
    pub biases: Vec<f64>,
    pub activation: ActivationFunction,
    input: Option<Matrix>,           // Xᵀ, input×batch
    pre_activation: Option<Matrix>,  // Z, output×batch
    activated: Option<Matrix>,       // A, output×batch
    gradients: Option<(Matrix, Vec<f64>)>,
}

#[derive(Serialize, Deserialize)]
struct DenseParams {
    input_size: usize,
    output_size: usize,
    weights: Matrix,
    biases: Vec<f64>,
    activation: ActivationFunction,
}

impl Dense {
    pub const KIND: &'static str = "dense";

    pub fn new(input_size: usize, output_size: usize, activation: ActivationFunction) -> Dense {
        Dense::with_init(input_size, output_size, activation, WeightInit::Auto, &mut rand::thread_rng())
    }

    /// Same as [`Dense::new`] with the activation given by name
    /// (`"relu"`, `"sigmoid"`, ...).
    pub fn with_activation_name(input_size: usize, output_size: usize, activation: &str) -> Result<Dense> {
        Ok(Dense::new(input_size, output_size, activation.parse()?))
    }

    pub fn with_init<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        activation: ActivationFunction,
        init: WeightInit,
        rng: &mut R,
    ) -> Dense {
        let use_he = match init {
            WeightInit::He => true,
            WeightInit::Xavier => false,
            WeightInit::Auto => activation.prefers_he_init(),
        };
        let weights = if use_he {
            Matrix::he(output_size, input_size, rng)
        } else {
            Matrix::xavier(output_size, input_size, rng)
        };

        Dense {
            input_size,
            output_size,
            weights,
            biases: vec![0.0; output_size],
            activation,
            input: None,
            pre_activation: None,
            activated: None,
            gradients: None,
        }
    }

    /// Rebuilds a layer from a `params()` blob without drawing weights.
    pub fn from_params(params: serde_json::Value) -> Result<Dense> {
        let mut layer = Dense {
            input_size: 0,
            output_size: 0,
            weights: Matrix::default(),
            biases: Vec::new(),
            activation: ActivationFunction::Linear,
            input: None,
            pre_activation: None,
            activated: None,
            gradients: None,
        };
        layer.set_params(params)?;
        Ok(layer)
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// (dW, db) from the most recent backward pass.
    pub fn gradients(&self) -> Option<(&Matrix, &[f64])> {
        self.gradients.as_ref().map(|(w, b)| (w, b.as_slice()))
    }
}

impl Layer for Dense {
    fn kind(&self) -> &'static str {
        Dense::KIND
    }

    fn forward(&mut self, backend: &Backend, input: &Tensor, _training: bool) -> Result<Tensor> {
        expect_rank("dense_forward", &input.shape, 2)?;
        if input.shape[1] != self.input_size {
            return Err(NnError::shape("dense_forward", &input.shape, &[input.batch_size(), self.input_size]));
        }

        let x_t = backend.transpose(&input.to_matrix()?);
        let mut z = backend.multiply(&self.weights, &x_t)?;
        for (row, b) in z.data.iter_mut().zip(self.biases.iter()) {
            for v in row.iter_mut() {
                *v += b;
            }
        }
        let a = self.activation.activate(&z);
        let output = Tensor::from_matrix(&backend.transpose(&a));

        self.input = Some(x_t);
        self.pre_activation = Some(z);
        self.activated = Some(a);
        Ok(output)
    }

    fn backward(&mut self, backend: &Backend, output_gradient: &Tensor) -> Result<Tensor> {
        let (x_t, z, a) = match (&self.input, &self.pre_activation, &self.activated) {
            (Some(x), Some(z), Some(a)) => (x, z, a),
            _ => return Err(NnError::MissingForwardCache(Dense::KIND)),
        };
        expect_rank("dense_backward", &output_gradient.shape, 2)?;
        let grad_t = backend.transpose(&output_gradient.to_matrix()?);
        grad_t.check_same_shape(z, "dense_backward")?;

        let source = match self.activation.derivative_source() {
            DerivativeSource::Activated => a,
            DerivativeSource::PreActivation => z,
        };
        // δ = ∂L/∂A ⊙ f'
        let delta = backend.hadamard(&grad_t, &self.activation.derivative(source))?;

        let batch = delta.cols.max(1) as f64;
        let d_weights = backend.scalar_multiply(
            &backend.multiply(&delta, &backend.transpose(x_t))?,
            1.0 / batch,
        );
        let d_biases = delta.row_sums().into_iter().map(|s| s / batch).collect();
        let d_input = backend.multiply(&backend.transpose(&self.weights), &delta)?;

        self.gradients = Some((d_weights, d_biases));
        Ok(Tensor::from_matrix(&backend.transpose(&d_input)))
    }

    fn update_params(&mut self, optimizer: &mut dyn Optimizer, layer_index: usize) -> Result<()> {
        let (d_weights, d_biases) = self.gradients.as_ref()
            .ok_or(NnError::MissingForwardCache(Dense::KIND))?;
        optimizer.update(layer_index, &mut self.weights, &mut self.biases, d_weights, d_biases)
    }

    fn params(&self) -> Result<serde_json::Value> {
        encode_params(&DenseParams {
            input_size: self.input_size,
            output_size: self.output_size,
            weights: self.weights.clone(),
            biases: self.biases.clone(),
            activation: self.activation.clone(),
        })
    }

    fn set_params(&mut self, params: serde_json::Value) -> Result<()> {
        let p: DenseParams = decode_params(Dense::KIND, params)?;
        if p.weights.rows != p.output_size
            || p.weights.cols != p.input_size
            || p.weights.data.len() != p.weights.rows
            || p.weights.data.iter().any(|r| r.len() != p.input_size)
            || p.biases.len() != p.output_size
        {
            return Err(NnError::MalformedModel(format!(
                "dense parameters do not describe a {}→{} layer",
                p.input_size, p.output_size
            )));
        }
        self.input_size = p.input_size;
        self.output_size = p.output_size;
        self.weights = p.weights;
        self.biases = p.biases;
        self.activation = p.activation;
        self.input = None;
        self.pre_activation = None;
        self.activated = None;
        self.gradients = None;
        Ok(())
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        expect_rank("dense_shape", input_shape, 2)?;
        if input_shape[1] != self.input_size {
            return Err(NnError::shape("dense_shape", input_shape, &[input_shape[0], self.input_size]));
        }
        Ok(vec![input_shape[0], self.output_size])
    }

    fn parameter_count(&self) -> usize {
        self.input_size * self.output_size + self.output_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn relu_layers_default_to_he_and_biases_start_at_zero() {
        let mut rng = StdRng::seed_from_u64(3);
        let layer = Dense::with_init(4, 3, ActivationFunction::ReLU, WeightInit::Auto, &mut rng);
        assert_eq!(layer.weights.shape(), [3, 4]);
        assert!(layer.biases.iter().all(|&b| b == 0.0));
        assert_eq!(layer.parameter_count(), 15);
    }

    #[test]
    fn backward_before_forward_is_an_error() {
        let mut layer = Dense::new(2, 2, ActivationFunction::Sigmoid);
        let grad = Tensor::zeros(vec![1, 2]);
        let err = layer.backward(&Backend::reference(), &grad).unwrap_err();
        assert!(matches!(err, NnError::MissingForwardCache("dense")));
    }

    #[test]
    fn set_params_rejects_inconsistent_shapes() {
        let layer = Dense::new(3, 2, ActivationFunction::Tanh);
        let mut blob = layer.params().unwrap();
        blob["output_size"] = serde_json::json!(5);
        assert!(matches!(Dense::from_params(blob), Err(NnError::MalformedModel(_))));
    }
}
