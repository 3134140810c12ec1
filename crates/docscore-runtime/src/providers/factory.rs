//! Named provider constructors.
//!
//! `provider.name` in the runtime configuration selects a factory here and
//! `provider.settings` is handed to it unchanged.
//!
//! ```ignore
//! let provider = ProviderRegistry::with_defaults().create("fixture", &settings)?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{LlmProvider, ProviderError};

/// Builds one kind of provider from its JSON settings.
pub trait ProviderFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn create(&self, settings: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Reject unusable settings without building anything.
    fn check(&self, settings: &JsonValue) -> Result<(), ProviderError>;

    /// Settings a new configuration file starts from.
    fn example_settings(&self) -> JsonValue {
        JsonValue::Object(Default::default())
    }
}

#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<&'static str, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every provider compiled into this build.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::FixtureProviderFactory));
        #[cfg(feature = "openai")]
        registry.register(Arc::new(super::OpenAiProviderFactory));
        registry
    }

    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(factory.name(), factory);
    }

    fn factory(&self, name: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.factories.get(name).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "no provider named '{}' in this build (available: {})",
                name,
                self.names().join(", ")
            ))
        })
    }

    pub fn create(&self, name: &str, settings: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let factory = self.factory(name)?;
        factory.check(settings)?;
        tracing::debug!(provider = name, "creating scoring provider");
        factory.create(settings)
    }

    pub fn check(&self, name: &str, settings: &JsonValue) -> Result<(), ProviderError> {
        self.factory(name)?.check(settings)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    pub fn example_settings(&self, name: &str) -> Option<JsonValue> {
        self.factories.get(name).map(|f| f.example_settings())
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
