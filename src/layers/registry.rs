use std::collections::HashMap;

use crate::error::{NnError, Result};
use crate::layers::batch_norm::BatchNorm;
use crate::layers::conv2d::Conv2d;
use crate::layers::dense::Dense;
use crate::layers::dropout::Dropout;
use crate::layers::flatten::Flatten;
use crate::layers::layer::{Layer, LayerRecord};

/// Rebuilds a layer from its parameter blob alone.
pub type LayerFactory = fn(serde_json::Value) -> Result<Box<dyn Layer>>;

/// Type-tag keyed factory used when loading persisted models.
///
/// `LayerRegistry::default()` knows every built-in layer; custom layers can
/// be added with [`LayerRegistry::register`].
pub struct LayerRegistry {
    factories: HashMap<String, LayerFactory>,
}

impl LayerRegistry {
    /// A registry with no layer types at all.
    pub fn empty() -> LayerRegistry {
        LayerRegistry { factories: HashMap::new() }
    }

    /// Adds or replaces the factory for `kind`.
    pub fn register(&mut self, kind: &str, factory: LayerFactory) -> &mut LayerRegistry {
        self.factories.insert(kind.to_string(), factory);
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn build(&self, record: &LayerRecord) -> Result<Box<dyn Layer>> {
        let factory = self.factories.get(&record.kind)
            .ok_or_else(|| NnError::MalformedModel(format!("unknown layer type '{}'", record.kind)))?;
        factory(record.params.clone())
    }
}

impl Default for LayerRegistry {
    fn default() -> Self {
        let mut registry = LayerRegistry::empty();
        registry
            .register(Dense::KIND, |p| Ok(Box::new(Dense::from_params(p)?)))
            .register(Conv2d::KIND, |p| Ok(Box::new(Conv2d::from_params(p)?)))
            .register(BatchNorm::KIND, |p| Ok(Box::new(BatchNorm::from_params(p)?)))
            .register(Dropout::KIND, |p| Ok(Box::new(Dropout::from_params(p)?)))
            .register(Flatten::KIND, |_| Ok(Box::new(Flatten::new())));
        registry
    }
}
