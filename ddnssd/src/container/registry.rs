use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use crate::config::DiscoveryConfig;
use crate::error::ContainerError;
use super::Container;
use super::snapshot::ContainerSnapshot;

/// Name-keyed arena of constructed containers.
///
/// Shared-network containers look their root up here once, at construction,
/// and copy what they need; nothing holds a reference into the map.
#[derive(Debug, Clone, Default)]
pub struct ContainerRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<Container>>>>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Container>> {
        self.inner.read().get(name).cloned()
    }

    /// Insert or replace the container registered under its name
    pub fn insert(&self, container: Container) -> Arc<Container> {
        let container = Arc::new(container);
        self.inner
            .write()
            .insert(container.name().to_string(), Arc::clone(&container));
        container
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Container>> {
        self.inner.write().remove(name)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Construct and register a batch of containers.
    ///
    /// Containers that own their network namespace go first so every
    /// `root__suffix` container finds its root already registered. Failures
    /// are reported per snapshot and do not stop the batch.
    pub fn build(
        &self,
        snapshots: &[ContainerSnapshot],
        config: Arc<DiscoveryConfig>,
    ) -> Vec<(String, Result<Arc<Container>, ContainerError>)> {
        let (dependents, roots): (Vec<_>, Vec<_>) = snapshots.iter().partition(|s| {
            s.container_name()
                .is_some_and(|name| name.contains("__"))
        });

        roots
            .into_iter()
            .chain(dependents)
            .map(|snapshot| {
                let result = Container::new(snapshot, Arc::clone(&config), self)
                    .map(|container| self.insert(container));
                if let Err(e) = &result {
                    tracing::warn!("Failed to build container {}: {}", snapshot.id, e);
                }
                (snapshot.id.clone(), result)
            })
            .collect()
    }
}
