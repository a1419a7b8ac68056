use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{NnError, Result};
use crate::layers::{BatchNorm, Conv2d, Dense, Dropout, Flatten, Layer, WeightInit};
use crate::network::config::NetworkConfig;
use crate::network::network::Network;

fn default_stride() -> usize {
    1
}

fn default_momentum() -> f64 {
    0.9
}

/// Describes one layer in a network specification.
///
/// Serialized with a `type` tag, e.g.
/// `{"type": "dense", "input_size": 2, "output_size": 8, "activation": "ReLU"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Dense {
        input_size: usize,
        output_size: usize,
        activation: ActivationFunction,
    },
    Conv2d {
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        #[serde(default = "default_stride")]
        stride: usize,
        #[serde(default)]
        padding: usize,
    },
    BatchNorm {
        features: usize,
        #[serde(default = "default_momentum")]
        momentum: f64,
    },
    Dropout {
        rate: f64,
    },
    Flatten,
}

impl LayerSpec {
    fn build(&self, rng: &mut StdRng) -> Result<Box<dyn Layer>> {
        Ok(match self {
            LayerSpec::Dense { input_size, output_size, activation } => Box::new(Dense::with_init(
                *input_size,
                *output_size,
                activation.clone(),
                WeightInit::Auto,
                rng,
            )),
            LayerSpec::Conv2d { in_channels, out_channels, kernel_size, stride, padding } => Box::new(
                Conv2d::with_rng(*in_channels, *out_channels, *kernel_size, *stride, *padding, rng)?,
            ),
            LayerSpec::BatchNorm { features, momentum } => Box::new(BatchNorm::with_momentum(*features, *momentum)),
            LayerSpec::Dropout { rate } => Box::new(Dropout::with_seed(*rate, rng.gen())?),
            LayerSpec::Flatten => Box::new(Flatten::new()),
        })
    }

    /// Feature width this layer produces for rank-2 data, if it fixes one.
    fn output_width(&self) -> Option<usize> {
        match self {
            LayerSpec::Dense { output_size, .. } => Some(*output_size),
            LayerSpec::BatchNorm { features, .. } => Some(*features),
            _ => None,
        }
    }

    fn input_width(&self) -> Option<usize> {
        match self {
            LayerSpec::Dense { input_size, .. } => Some(*input_size),
            LayerSpec::BatchNorm { features, .. } => Some(*features),
            _ => None,
        }
    }
}

/// A fully serializable description of a network architecture plus its
/// training configuration.
///
/// `NetworkSpec` can be saved to / loaded from JSON independently of the
/// trained weights, making it possible to store architecture configurations
/// before training starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Human-readable name used as the model file stem.
    #[serde(default)]
    pub name: String,
    /// Ordered list of layer descriptions (input → output).
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub config: NetworkConfig,
}

impl NetworkSpec {
    /// Checks that consecutive fixed-width layers agree on their widths.
    /// Dropout passes the previous width through; convolution and flatten
    /// reset it.
    pub fn validate(&self) -> Result<()> {
        let mut width: Option<usize> = None;
        for (i, layer) in self.layers.iter().enumerate() {
            if let (Some(prev), Some(expected)) = (width, layer.input_width()) {
                if prev != expected {
                    return Err(NnError::InvalidConfig(format!(
                        "layer {i} expects {expected} inputs but the previous layer produces {prev}"
                    )));
                }
            }
            width = match layer {
                LayerSpec::Dropout { .. } => width,
                other => other.output_width(),
            };
        }
        self.config.validate()
    }

    /// Builds a fresh, untrained network. With `config.seed` set, weight
    /// initialisation and dropout masks are reproducible.
    pub fn build(&self) -> Result<Network> {
        self.validate()?;
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let layers = self.layers.iter()
            .map(|spec| spec.build(&mut rng))
            .collect::<Result<Vec<_>>>()?;
        Network::with_config(layers, self.config.clone())
    }

    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a `NetworkSpec` from a JSON file.
    pub fn load_json(path: &str) -> Result<NetworkSpec> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_dense_widths_are_rejected() {
        let spec = NetworkSpec {
            name: "bad".into(),
            layers: vec![
                LayerSpec::Dense { input_size: 2, output_size: 8, activation: ActivationFunction::ReLU },
                LayerSpec::Dropout { rate: 0.1 },
                LayerSpec::Dense { input_size: 4, output_size: 1, activation: ActivationFunction::Sigmoid },
            ],
            config: NetworkConfig::default(),
        };
        assert!(matches!(spec.build(), Err(NnError::InvalidConfig(_))));
    }

    #[test]
    fn parses_tagged_layers_with_defaults() {
        let json = r#"{
            "layers": [
                {"type": "conv2d", "in_channels": 1, "out_channels": 2, "kernel_size": 3},
                {"type": "flatten"},
                {"type": "batch_norm", "features": 4}
            ]
        }"#;
        let spec: NetworkSpec = serde_json::from_str(json).unwrap();
        assert_eq!(
            spec.layers[0],
            LayerSpec::Conv2d { in_channels: 1, out_channels: 2, kernel_size: 3, stride: 1, padding: 0 }
        );
        assert_eq!(spec.layers[2], LayerSpec::BatchNorm { features: 4, momentum: 0.9 });
        assert_eq!(spec.config, NetworkConfig::default());
    }
}
