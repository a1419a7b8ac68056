use serde::{Serialize, Deserialize};

use crate::error::{NnError, Result};
use crate::loss::loss_type::LossType;
use crate::math::backend::BackendKind;
use crate::optim::{Adam, AdamW, Optimizer, OptimizerKind, RmsProp, Sgd};

/// Hyperparameters consumed by [`Network`](crate::network::Network).
///
/// Every field has a default, so a JSON config only needs the keys it
/// changes:
///
/// ```json
/// { "optimizer": "adam", "learning_rate": 0.01, "batch_size": 4 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub learning_rate: f64,
    /// SGD only.
    pub momentum: f64,
    /// L2 term for SGD, decoupled decay for AdamW.
    pub weight_decay: f64,
    /// Symmetric gradient clip for SGD/AdamW; 0 disables it.
    pub clip_value: f64,
    pub optimizer: OptimizerKind,
    pub loss: LossType,
    pub batch_size: usize,
    pub beta1: f64,
    pub beta2: f64,
    /// RMSProp decay rate.
    pub rho: f64,
    pub epsilon: f64,
    pub backend: BackendKind,
    /// Seeds weight init, shuffling and dropout masks.
    pub seed: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            learning_rate: 0.01,
            momentum: 0.0,
            weight_decay: 0.0,
            clip_value: 0.0,
            optimizer: OptimizerKind::Sgd,
            loss: LossType::Mse,
            batch_size: 32,
            beta1: 0.9,
            beta2: 0.999,
            rho: 0.9,
            epsilon: 1e-8,
            backend: BackendKind::Auto,
            seed: None,
        }
    }
}

impl NetworkConfig {
    /// Parses and validates a JSON config.
    ///
    /// Identifier fields go through `FromStr` first so that an unknown
    /// optimizer, loss or backend is reported as such instead of as a
    /// generic JSON error.
    pub fn from_json_str(json: &str) -> Result<NetworkConfig> {
        let mut value: serde_json::Value = serde_json::from_str(json)?;
        if let Some(obj) = value.as_object_mut() {
            if let Some(name) = obj.get("optimizer").and_then(|v| v.as_str()) {
                let kind: OptimizerKind = name.parse()?;
                obj.insert("optimizer".into(), serde_json::to_value(kind)?);
            }
            if let Some(name) = obj.get("loss").and_then(|v| v.as_str()) {
                let loss: LossType = name.parse()?;
                obj.insert("loss".into(), serde_json::to_value(loss)?);
            }
            if let Some(name) = obj.get("backend").and_then(|v| v.as_str()) {
                let backend: BackendKind = name.parse()?;
                obj.insert("backend".into(), serde_json::to_value(backend)?);
            }
        }
        let config: NetworkConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(NnError::InvalidConfig("batch_size must be at least 1".into()));
        }
        let non_negative = [
            ("learning_rate", self.learning_rate),
            ("momentum", self.momentum),
            ("weight_decay", self.weight_decay),
            ("clip_value", self.clip_value),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(NnError::InvalidConfig(format!("{name} must be a finite value >= 0, got {value}")));
            }
        }
        for (name, value) in [("beta1", self.beta1), ("beta2", self.beta2), ("rho", self.rho)] {
            if !(0.0..1.0).contains(&value) {
                return Err(NnError::InvalidConfig(format!("{name} must lie in [0, 1), got {value}")));
            }
        }
        if !(self.epsilon > 0.0) {
            return Err(NnError::InvalidConfig(format!("epsilon must be positive, got {}", self.epsilon)));
        }
        Ok(())
    }

    /// Fresh optimizer (no accumulated state) for the configured kind.
    pub fn build_optimizer(&self) -> Box<dyn Optimizer> {
        match self.optimizer {
            OptimizerKind::Sgd => Box::new(
                Sgd::new(self.learning_rate)
                    .with_momentum(self.momentum)
                    .with_weight_decay(self.weight_decay)
                    .with_clip_value(self.clip_value),
            ),
            OptimizerKind::Adam => Box::new(
                Adam::with_betas(self.learning_rate, self.beta1, self.beta2, self.epsilon),
            ),
            OptimizerKind::AdamW => Box::new(
                AdamW::new(self.learning_rate)
                    .with_betas(self.beta1, self.beta2, self.epsilon)
                    .with_weight_decay(self.weight_decay)
                    .with_clip_value(self.clip_value),
            ),
            OptimizerKind::RmsProp => Box::new(
                RmsProp::with_decay(self.learning_rate, self.rho, self.epsilon),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = NetworkConfig::from_json_str(r#"{"optimizer": "Adam", "batch_size": 4}"#).unwrap();
        assert_eq!(config.optimizer, OptimizerKind::Adam);
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.learning_rate, 0.01);
        assert_eq!(config.loss, LossType::Mse);
    }

    #[test]
    fn unknown_identifiers_are_configuration_errors() {
        assert!(matches!(
            NetworkConfig::from_json_str(r#"{"optimizer": "lbfgs"}"#),
            Err(NnError::UnknownOptimizer(_))
        ));
        assert!(matches!(
            NetworkConfig::from_json_str(r#"{"loss": "hinge"}"#),
            Err(NnError::UnknownLoss(_))
        ));
        assert!(matches!(
            NetworkConfig::from_json_str(r#"{"backend": "cuda"}"#),
            Err(NnError::UnknownBackend(_))
        ));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(matches!(
            NetworkConfig::from_json_str(r#"{"batch_size": 0}"#),
            Err(NnError::InvalidConfig(_))
        ));
    }
}
