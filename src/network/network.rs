use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::path::Path;

use crate::error::{NnError, Result};
use crate::layers::layer::{Layer, LayerRecord};
use crate::layers::registry::LayerRegistry;
use crate::loss::loss_type::{Loss, LossType};
use crate::math::backend::{Backend, BackendKind};
use crate::math::tensor::Tensor;
use crate::network::config::NetworkConfig;
use crate::network::model_file::ModelFile;
use crate::optim::optimizer::{Optimizer, OptimizerKind};
use crate::train::epoch_stats::TrainReport;
use crate::train::loop_fn::train_loop;
use crate::train::train_config::TrainConfig;

/// Input accepted by [`Network::predict`]: one sample or a batch of them.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictInput {
    One(Vec<f64>),
    Many(Vec<Vec<f64>>),
}

impl From<Vec<f64>> for PredictInput {
    fn from(sample: Vec<f64>) -> Self {
        PredictInput::One(sample)
    }
}

impl From<&[f64]> for PredictInput {
    fn from(sample: &[f64]) -> Self {
        PredictInput::One(sample.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for PredictInput {
    fn from(sample: [f64; N]) -> Self {
        PredictInput::One(sample.to_vec())
    }
}

impl From<Vec<Vec<f64>>> for PredictInput {
    fn from(batch: Vec<Vec<f64>>) -> Self {
        PredictInput::Many(batch)
    }
}

impl From<&[Vec<f64>]> for PredictInput {
    fn from(batch: &[Vec<f64>]) -> Self {
        PredictInput::Many(batch.to_vec())
    }
}

/// Output of [`Network::predict`], mirroring the input's shape: a single
/// sample in gives a single row out.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    One(Vec<f64>),
    Many(Vec<Vec<f64>>),
}

impl Prediction {
    /// Every row, whether one or many were predicted.
    pub fn into_rows(self) -> Vec<Vec<f64>> {
        match self {
            Prediction::One(row) => vec![row],
            Prediction::Many(rows) => rows,
        }
    }

    /// The single-sample result, if this was a single-sample prediction.
    pub fn into_one(self) -> Option<Vec<f64>> {
        match self {
            Prediction::One(row) => Some(row),
            Prediction::Many(_) => None,
        }
    }
}

/// Ordered stack of layers plus the loss, optimizer and backend that train
/// them.
///
/// The optimizer keys its state by layer position, so the layer list can
/// only change through methods that also reset the optimizer.
pub struct Network {
    layers: Vec<Box<dyn Layer>>,
    loss: Box<dyn Loss>,
    optimizer: Box<dyn Optimizer>,
    backend: Backend,
    config: NetworkConfig,
    epoch: usize,
    rng: StdRng,
}

impl Network {
    /// Builds a network with the default configuration (SGD, MSE, batch 32).
    pub fn new(layers: Vec<Box<dyn Layer>>) -> Result<Network> {
        Network::with_config(layers, NetworkConfig::default())
    }

    pub fn with_config(layers: Vec<Box<dyn Layer>>, config: NetworkConfig) -> Result<Network> {
        config.validate()?;
        Ok(Network {
            layers,
            loss: config.loss.build(),
            optimizer: config.build_optimizer(),
            backend: Backend::select(config.backend)?,
            rng: seeded_rng(config.seed),
            epoch: 0,
            config,
        })
    }

    /// Replaces the configuration. The optimizer is rebuilt from scratch,
    /// discarding any accumulated state.
    pub fn configure(&mut self, config: NetworkConfig) -> Result<()> {
        config.validate()?;
        let backend = Backend::select(config.backend)?;
        self.loss = config.loss.build();
        self.optimizer = config.build_optimizer();
        self.backend = backend;
        if config.seed.is_some() {
            self.rng = seeded_rng(config.seed);
        }
        self.config = config;
        Ok(())
    }

    /// Same as [`Network::configure`] with a JSON config string.
    pub fn configure_json(&mut self, json: &str) -> Result<()> {
        self.configure(NetworkConfig::from_json_str(json)?)
    }

    /// Swaps in an explicitly constructed backend.
    pub fn with_backend(mut self, backend: Backend) -> Network {
        self.backend = backend;
        self
    }

    /// Appends a layer. Optimizer state is keyed by layer position, so it is
    /// cleared.
    pub fn push(&mut self, layer: Box<dyn Layer>) {
        self.layers.push(layer);
        self.optimizer.reset();
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    /// Mutable access to individual layers; the list itself stays fixed.
    pub fn layers_mut(&mut self) -> &mut [Box<dyn Layer>] {
        &mut self.layers
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn loss_type(&self) -> LossType {
        self.loss.kind()
    }

    pub fn optimizer_kind(&self) -> OptimizerKind {
        self.optimizer.kind()
    }

    /// Number of completed training epochs, across every `fit` call.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }

    /// Clears every per-layer accumulator held by the optimizer.
    pub fn reset_optimizer(&mut self) {
        self.optimizer.reset();
    }

    /// Shape of the network output for `input_shape` (batch dimension
    /// included), without running any data through it.
    pub fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        self.layers.iter().try_fold(input_shape.to_vec(), |shape, layer| layer.output_shape(&shape))
    }

    /// Runs `input` through every layer in order.
    pub fn forward(&mut self, input: &Tensor, training: bool) -> Result<Tensor> {
        let mut current = input.clone();
        for layer in &mut self.layers {
            current = layer.forward(&self.backend, &current, training)?;
        }
        Ok(current)
    }

    /// One optimisation step on a single mini-batch; returns its loss.
    ///
    /// Layers are walked in reverse, each one running `backward` and then
    /// immediately `update_params`.
    pub fn train_batch(&mut self, inputs: &Tensor, targets: &Tensor) -> Result<f64> {
        let output = self.forward(inputs, true)?;
        let out_matrix = as_rows(&output)?.to_matrix()?;
        let target_matrix = as_rows(targets)?.to_matrix()?;

        let loss = self.loss.calculate(&self.backend, &out_matrix, &target_matrix)?;
        let gradient = self.loss.gradient(&self.backend, &out_matrix, &target_matrix)?;

        let mut grad = Tensor::from_matrix(&gradient).reshape(output.shape.clone())?;
        for i in (0..self.layers.len()).rev() {
            grad = self.layers[i].backward(&self.backend, &grad)?;
            self.layers[i].update_params(self.optimizer.as_mut(), i)?;
        }
        Ok(loss)
    }

    /// Trains on `inputs`/`targets` (batch-first tensors).
    pub fn fit(&mut self, inputs: &Tensor, targets: &Tensor, config: &TrainConfig) -> Result<TrainReport> {
        train_loop(self, inputs, targets, None, config)
    }

    /// Like [`Network::fit`], also reporting validation loss (and accuracy
    /// for cross-entropy) in every `EpochStats`.
    pub fn fit_with_validation(
        &mut self,
        inputs: &Tensor,
        targets: &Tensor,
        val_inputs: &Tensor,
        val_targets: &Tensor,
        config: &TrainConfig,
    ) -> Result<TrainReport> {
        train_loop(self, inputs, targets, Some((val_inputs, val_targets)), config)
    }

    /// Row-per-sample training entry point.
    pub fn train(
        &mut self,
        inputs: &[Vec<f64>],
        targets: &[Vec<f64>],
        epochs: usize,
        patience: usize,
        verbose: bool,
    ) -> Result<TrainReport> {
        let config = TrainConfig::new(epochs).with_patience(patience).verbose(verbose);
        self.fit(&Tensor::from_rows(inputs)?, &Tensor::from_rows(targets)?, &config)
    }

    /// Mean loss over a dataset in inference mode.
    pub fn evaluate(&mut self, inputs: &Tensor, targets: &Tensor) -> Result<f64> {
        let output = self.predict_tensor(inputs)?;
        let out_matrix = as_rows(&output)?.to_matrix()?;
        let target_matrix = as_rows(targets)?.to_matrix()?;
        self.loss.calculate(&self.backend, &out_matrix, &target_matrix)
    }

    /// Inference-mode forward pass over a batch tensor.
    pub fn predict_tensor(&mut self, inputs: &Tensor) -> Result<Tensor> {
        self.forward(inputs, false)
    }

    /// Predicts one sample or a batch; the result has the same arity as
    /// the input.
    pub fn predict(&mut self, input: impl Into<PredictInput>) -> Result<Prediction> {
        match input.into() {
            PredictInput::One(sample) => {
                let batch = Tensor::new(vec![1, sample.len()], sample)?;
                let output = self.predict_tensor(&batch)?;
                let row = as_rows(&output)?.data;
                Ok(Prediction::One(row))
            }
            PredictInput::Many(samples) => {
                if samples.is_empty() {
                    return Ok(Prediction::Many(Vec::new()));
                }
                let output = self.predict_tensor(&Tensor::from_rows(&samples)?)?;
                Ok(Prediction::Many(as_rows(&output)?.to_rows()))
            }
        }
    }

    // ── Persistence ────────────────────────────────────────────────────────

    /// Snapshot of everything needed to rebuild this network.
    pub fn to_model_file(&self) -> Result<ModelFile> {
        let layers = self.layers.iter()
            .map(|layer| LayerRecord::from_layer(layer.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(ModelFile {
            layers,
            optimizer: self.optimizer.snapshot(),
            loss: self.loss.kind(),
            config: self.config.clone(),
            epoch: self.epoch,
        })
    }

    /// Rebuilds a network from a model file. Every layer record is decoded
    /// before the network exists, so a bad record never yields a partial
    /// network.
    pub fn from_model_file(file: ModelFile, registry: &LayerRegistry) -> Result<Network> {
        let layers = file.layers.iter()
            .map(|record| registry.build(record))
            .collect::<Result<Vec<_>>>()?;

        let mut config = file.config;
        config.optimizer = file.optimizer.kind();
        config.loss = file.loss;
        config.validate().map_err(|e| NnError::MalformedModel(e.to_string()))?;

        // A model saved on a machine with a faster backend still loads here.
        let backend = match config.backend {
            BackendKind::Auto => Backend::detect(),
            kind => Backend::select(kind).unwrap_or_else(|_| Backend::detect()),
        };

        Ok(Network {
            layers,
            loss: file.loss.build(),
            optimizer: file.optimizer.into_optimizer(),
            backend,
            rng: seeded_rng(config.seed),
            epoch: file.epoch,
            config,
        })
    }

    /// Saves the network as JSON. The file is replaced atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.to_model_file()?.write(path.as_ref())
    }

    /// Loads a network saved with [`Network::save`] using the built-in layers.
    pub fn load(path: impl AsRef<Path>) -> Result<Network> {
        Network::load_with_registry(path, &LayerRegistry::default())
    }

    /// Loads a network whose layers may include custom registered types.
    pub fn load_with_registry(path: impl AsRef<Path>, registry: &LayerRegistry) -> Result<Network> {
        Network::from_model_file(ModelFile::read(path.as_ref())?, registry)
    }

    // ── Training-loop plumbing ─────────────────────────────────────────────

    pub(crate) fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub(crate) fn advance_epoch(&mut self) {
        self.epoch += 1;
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("layers", &self.layers)
            .field("loss", &self.loss.kind())
            .field("optimizer", &self.optimizer.kind())
            .field("backend", &self.backend)
            .field("epoch", &self.epoch)
            .finish()
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Views any batch-first tensor as `[batch, features]`.
fn as_rows(t: &Tensor) -> Result<Tensor> {
    t.reshape(vec![t.batch_size(), t.sample_len()])
}
