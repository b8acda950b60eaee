use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use super::Provider;
use crate::error::LlmError;

/// Provider selected for a `provider/model` reference
#[derive(Clone)]
pub struct ResolvedModel {
    /// The provider serving the model
    pub provider: Arc<dyn Provider>,
    /// Model identifier as the provider knows it
    pub model: String,
}

impl fmt::Debug for ResolvedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedModel")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

/// Immutable name to provider mapping built at start-up
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry").field("providers", &self.names()).finish()
    }
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Look up a provider by name
    ///
    /// # Errors
    ///
    /// Returns `LlmError::ProviderNotFound` if no provider has that name
    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, LlmError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| LlmError::ProviderNotFound {
                provider: name.to_owned(),
            })
    }

    /// Resolve a `provider/model` reference
    ///
    /// Only the first `/` separates the provider, so model names may contain
    /// slashes themselves.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::ModelNotFound` for a malformed reference and
    /// `LlmError::ProviderNotFound` for an unknown provider
    pub fn resolve(&self, reference: &str) -> Result<ResolvedModel, LlmError> {
        let Some((provider, model)) = reference.split_once('/') else {
            return Err(LlmError::ModelNotFound {
                model: reference.to_owned(),
            });
        };

        if provider.is_empty() || model.is_empty() {
            return Err(LlmError::ModelNotFound {
                model: reference.to_owned(),
            });
        }

        Ok(ResolvedModel {
            provider: self.get(provider)?,
            model: model.to_owned(),
        })
    }

    /// Registered provider names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Collects providers for a [`ProviderRegistry`]
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    providers: HashMap<String, Arc<dyn Provider>>,
    duplicates: Vec<String>,
}

impl ProviderRegistryBuilder {
    /// Add a provider under its own name
    #[must_use]
    pub fn register(self, provider: impl Provider + 'static) -> Self {
        self.register_arc(Arc::new(provider))
    }

    /// Add a shared provider under its own name
    #[must_use]
    pub fn register_arc(mut self, provider: Arc<dyn Provider>) -> Self {
        match self.providers.entry(provider.name().to_owned()) {
            Entry::Occupied(entry) => self.duplicates.push(entry.key().clone()),
            Entry::Vacant(entry) => {
                entry.insert(provider);
            }
        }
        self
    }

    /// Finish the registry
    ///
    /// Registering two providers under one name is rejected so the result
    /// never depends on registration order.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Configuration` listing duplicate or empty names
    pub fn build(self) -> Result<ProviderRegistry, LlmError> {
        if self.providers.contains_key("") {
            return Err(LlmError::Configuration("provider name must not be empty".to_owned()));
        }

        if !self.duplicates.is_empty() {
            let mut duplicates = self.duplicates;
            duplicates.sort_unstable();
            duplicates.dedup();
            return Err(LlmError::Configuration(format!(
                "duplicate provider names: {}",
                duplicates.join(", ")
            )));
        }

        tracing::debug!(count = self.providers.len(), "provider registry built");

        Ok(ProviderRegistry {
            providers: self.providers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedProvider, ScriptedSource};

    fn provider(name: &str) -> ScriptedProvider {
        ScriptedProvider::new(name, ScriptedSource::new())
    }

    #[test]
    fn names_are_sorted_regardless_of_registration_order() {
        let a = ProviderRegistry::builder()
            .register(provider("openai"))
            .register(provider("anthropic"))
            .build()
            .unwrap();
        let b = ProviderRegistry::builder()
            .register(provider("anthropic"))
            .register(provider("openai"))
            .build()
            .unwrap();

        assert_eq!(a.names(), vec!["anthropic", "openai"]);
        assert_eq!(a.names(), b.names());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = ProviderRegistry::builder()
            .register(provider("openai"))
            .register(provider("openai"))
            .build()
            .unwrap_err();
        assert!(matches!(err, LlmError::Configuration(ref msg) if msg.contains("openai")));
    }

    #[test]
    fn resolve_splits_on_first_slash() {
        let registry = ProviderRegistry::builder().register(provider("local")).build().unwrap();

        let resolved = registry.resolve("local/org/model-7b").unwrap();
        assert_eq!(resolved.provider.name(), "local");
        assert_eq!(resolved.model, "org/model-7b");
    }

    #[test]
    fn resolve_errors() {
        let registry = ProviderRegistry::builder().register(provider("local")).build().unwrap();

        assert!(matches!(registry.resolve("no-slash"), Err(LlmError::ModelNotFound { .. })));
        assert!(matches!(registry.resolve("local/"), Err(LlmError::ModelNotFound { .. })));
        assert!(matches!(
            registry.resolve("remote/gpt"),
            Err(LlmError::ProviderNotFound { ref provider }) if provider == "remote"
        ));
    }

    #[test]
    fn empty_registry() {
        let registry = ProviderRegistry::builder().build().unwrap();
        assert!(registry.is_empty());
        assert!(registry.get("x").is_err());
    }
}
