//! Process-wide registry of the four adapter kinds, keyed by string
//! identifier. Populated once at startup and treated as read-only
//! thereafter (see spec.md §5's shared resource policy) — lookup is a
//! simple keyed read, no locking required once registration has finished.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::{BackendAdapter, MessagingProvider, ResourceProvider, RuntimeAdapter};

/// Holds the four interface tables. Registration is idempotent on key:
/// registering under a key that is already taken replaces the previous
/// entry and logs a warning, rather than erroring (spec.md §4.2).
#[derive(Default)]
pub struct Registry {
    resource_providers: HashMap<String, Arc<dyn ResourceProvider>>,
    backend_adapters: HashMap<String, Arc<dyn BackendAdapter>>,
    runtime_adapters: HashMap<String, Arc<dyn RuntimeAdapter>>,
    messaging_providers: HashMap<String, Arc<dyn MessagingProvider>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register_resource_provider(&mut self, provider: Arc<dyn ResourceProvider>) {
        let key = provider.resource_type().to_string();
        if self.resource_providers.insert(key.clone(), provider).is_some() {
            warn!("resource provider '{}' registered twice; last registration wins", key);
        }
    }

    pub fn register_backend_adapter(&mut self, adapter: Arc<dyn BackendAdapter>) {
        let key = adapter.name().to_string();
        if self.backend_adapters.insert(key.clone(), adapter).is_some() {
            warn!("backend adapter '{}' registered twice; last registration wins", key);
        }
    }

    pub fn register_runtime_adapter(&mut self, adapter: Arc<dyn RuntimeAdapter>) {
        let key = adapter.name().to_string();
        if self.runtime_adapters.insert(key.clone(), adapter).is_some() {
            warn!("runtime adapter '{}' registered twice; last registration wins", key);
        }
    }

    pub fn register_messaging_provider(&mut self, provider: Arc<dyn MessagingProvider>) {
        let key = provider.provider_type().to_string();
        if self.messaging_providers.insert(key.clone(), provider).is_some() {
            warn!("messaging provider '{}' registered twice; last registration wins", key);
        }
    }

    pub fn resource_provider(&self, resource_type: &str) -> Option<Arc<dyn ResourceProvider>> {
        self.resource_providers.get(resource_type).cloned()
    }

    pub fn backend_adapter(&self, name: &str) -> Option<Arc<dyn BackendAdapter>> {
        self.backend_adapters.get(name).cloned()
    }

    pub fn runtime_adapter(&self, name: &str) -> Option<Arc<dyn RuntimeAdapter>> {
        self.runtime_adapters.get(name).cloned()
    }

    pub fn messaging_provider(&self, provider_type: &str) -> Option<Arc<dyn MessagingProvider>> {
        self.messaging_providers.get(provider_type).cloned()
    }

    /// The set of registered Resource Provider types, exposed to the
    /// reference validator (spec.md §4.2).
    pub fn resource_provider_types(&self) -> Vec<String> {
        self.resource_providers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::tests_support::NoopResourceProvider;

    fn flag_of(provider: &Arc<dyn ResourceProvider>) -> bool {
        provider
            .as_any()
            .downcast_ref::<NoopResourceProvider>()
            .expect("test double")
            .validate_is_noop()
    }

    #[test]
    fn last_registration_wins() {
        let mut reg = Registry::new();
        reg.register_resource_provider(Arc::new(NoopResourceProvider::new("postgres", true)));
        assert!(flag_of(&reg.resource_provider("postgres").unwrap()));
        reg.register_resource_provider(Arc::new(NoopResourceProvider::new("postgres", false)));
        assert!(!flag_of(&reg.resource_provider("postgres").unwrap()));
    }

    #[test]
    fn lookup_of_unregistered_key_is_none() {
        let reg = Registry::new();
        assert!(reg.resource_provider("redis").is_none());
        assert!(reg.backend_adapter("pulumi").is_none());
        assert!(reg.runtime_adapter("kubernetes").is_none());
    }
}
