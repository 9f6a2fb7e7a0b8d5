//! Adapter registry keyed by task type.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::adapter::Adapter;

/// Registry of available adapters.
///
/// Injected into dispatch and the runner; there is no process-wide instance.
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn Adapter>>>,
}

impl AdapterRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Build a registry from a fixed set of adapters.
    pub fn with_adapters(adapters: impl IntoIterator<Item = Arc<dyn Adapter>>) -> Self {
        let map = adapters
            .into_iter()
            .map(|adapter| (adapter.task_type().to_string(), adapter))
            .collect();
        Self {
            adapters: RwLock::new(map),
        }
    }

    /// Register an adapter, replacing any previous one for the same task type.
    pub async fn register(&self, adapter: Arc<dyn Adapter>) {
        let task_type = adapter.task_type().to_string();
        if self
            .adapters
            .write()
            .await
            .insert(task_type.clone(), adapter)
            .is_some()
        {
            tracing::warn!(task_type = %task_type, "Replaced existing adapter");
        } else {
            tracing::debug!("Registered adapter: {}", task_type);
        }
    }

    /// Unregister an adapter.
    pub async fn unregister(&self, task_type: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.write().await.remove(task_type)
    }

    /// Get an adapter by task type.
    pub async fn get(&self, task_type: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.read().await.get(task_type).cloned()
    }

    /// Check if an adapter exists.
    pub async fn has(&self, task_type: &str) -> bool {
        self.adapters.read().await.contains_key(task_type)
    }

    /// List all registered task types, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of registered adapters.
    pub async fn count(&self) -> usize {
        self.adapters.read().await.len()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
