//! Provider registry keyed by provider identifier.

use std::collections::HashMap;
use std::sync::Arc;

use omnidrive_common::{Error, ProviderId, Result};

use crate::adapter::ProviderAdapter;

/// Registry of active provider adapters.
///
/// Identifiers are unique; registering under an existing identifier
/// replaces the previous adapter. Iteration order is insertion order,
/// which downstream placement and rebalancing rely on for deterministic
/// tie-breaking.
#[derive(Default)]
pub struct ProviderRegistry {
    order: Vec<ProviderId>,
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            adapters: HashMap::new(),
        }
    }

    /// Register an adapter under `id`.
    ///
    /// Replaces any adapter previously registered under the same
    /// identifier, keeping its original insertion position.
    pub fn register(&mut self, id: ProviderId, adapter: Arc<dyn ProviderAdapter>) {
        if self.adapters.insert(id.clone(), adapter).is_none() {
            self.order.push(id);
        }
    }

    /// Resolve an adapter by identifier.
    ///
    /// # Errors
    /// - `ProviderNotFound` if no adapter is registered under `id`
    pub fn get(&self, id: &ProviderId) -> Result<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ProviderNotFound(id.to_string()))
    }

    /// Remove an adapter, returning it if it was registered.
    pub fn remove(&mut self, id: &ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        let removed = self.adapters.remove(id);
        if removed.is_some() {
            self.order.retain(|o| o != id);
        }
        removed
    }

    /// All registered identifiers, in insertion order.
    pub fn ids(&self) -> Vec<ProviderId> {
        self.order.clone()
    }

    /// All registered adapters with their identifiers, in insertion order.
    pub fn adapters(&self) -> Vec<(ProviderId, Arc<dyn ProviderAdapter>)> {
        self.order
            .iter()
            .filter_map(|id| self.adapters.get(id).map(|a| (id.clone(), a.clone())))
            .collect()
    }

    /// Check if a provider is registered.
    pub fn contains(&self, id: &ProviderId) -> bool {
        self.adapters.contains_key(id)
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAdapter;

    fn pid(s: &str) -> ProviderId {
        ProviderId::new(s).unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ProviderRegistry::new();
        registry.register(pid("a"), Arc::new(MemoryAdapter::with_capacity(100)));

        let adapter = registry.get(&pid("a")).unwrap();
        assert_eq!(adapter.backend(), "memory");
    }

    #[test]
    fn test_get_unknown_fails() {
        let registry = ProviderRegistry::new();
        let result = registry.get(&pid("unknown"));
        assert!(matches!(
            result,
            Err(omnidrive_common::Error::ProviderNotFound(_))
        ));
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut registry = ProviderRegistry::new();
        registry.register(pid("a"), Arc::new(MemoryAdapter::with_capacity(100)));
        registry.register(pid("b"), Arc::new(MemoryAdapter::with_capacity(100)));
        registry.register(pid("a"), Arc::new(MemoryAdapter::with_capacity(200)));

        // Replacement keeps the original insertion position.
        assert_eq!(registry.ids(), vec![pid("a"), pid("b")]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut registry = ProviderRegistry::new();
        for name in ["c", "a", "b"] {
            registry.register(pid(name), Arc::new(MemoryAdapter::with_capacity(1)));
        }
        assert_eq!(registry.ids(), vec![pid("c"), pid("a"), pid("b")]);
    }

    #[test]
    fn test_remove() {
        let mut registry = ProviderRegistry::new();
        registry.register(pid("a"), Arc::new(MemoryAdapter::with_capacity(1)));

        assert!(registry.remove(&pid("a")).is_some());
        assert!(registry.remove(&pid("a")).is_none());
        assert!(registry.is_empty());
    }
}
