/* -------------------------------------------------------------------------- *\
 *                |   █████╗ ██╗   ██╗██████╗  █████╗ ███████╗ |              *
 *                |  ██╔══██╗██║   ██║██╔══██╗██╔══██╗██╔════╝ |              *
 *                |  ███████║██║   ██║██████╔╝███████║█████╗   |              *
 *                |  ██╔══██║██║   ██║██╔══██╗██╔══██║██╔══╝   |              *
 *                |  ██║  ██║╚██████╔╝██║  ██║██║  ██║███████╗ |              *
 *                |  ╚═╝  ╚═╝ ╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═╝╚══════╝ |              *
 *                +--------------------------------------------+              *
 *                                                                            *
 *                         Distributed Systems Runtime                        *
 * -------------------------------------------------------------------------- *
 * Copyright 2022 - 2024, the aurae contributors                              *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

use super::{Container, ContainerId, ContainerState, ContainersError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

/// The containers admitted and not yet deregistered.
///
/// Lock order is always the registry lock first, then a container's mutex.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    containers: RwLock<HashMap<ContainerId, Arc<Container>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, container: Arc<Container>) -> Result<()> {
        let mut containers = self.containers.write().await;
        let id = container.id();
        if containers.contains_key(&id) {
            return Err(ContainersError::ContainerExists { id });
        }

        let _ = containers.insert(id, container);
        Ok(())
    }

    /// Snapshot of the registered containers, in no particular order.
    pub async fn list(&self) -> Vec<Arc<Container>> {
        self.containers.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: &ContainerId) -> Option<Arc<Container>> {
        self.containers.read().await.get(id).cloned()
    }

    /// Unregisters the container and flags it for stopping. Teardown happens
    /// in its lifecycle task. Removing an unknown id does nothing.
    pub async fn remove(&self, id: &ContainerId) -> Option<Arc<Container>> {
        let mut containers = self.containers.write().await;
        let container = containers.get(id).cloned()?;

        let mut inner = container.lock().await;
        container.request_stop(&mut inner);
        drop(inner);

        let _ = containers.remove(id);
        trace!("Removed container {id} from registry");
        Some(container)
    }

    /// Final step of a container's life: record the terminal state and drop
    /// it from the registry if removal has not already done so.
    pub async fn deregister(
        &self,
        container: &Arc<Container>,
        terminal: ContainerState,
        failure: Option<String>,
    ) {
        let mut containers = self.containers.write().await;
        let mut inner = container.lock().await;
        container.finish(&mut inner, terminal, failure);
        drop(inner);

        let id = container.id();
        if containers.get(&id).is_some_and(|c| Arc::ptr_eq(c, container)) {
            let _ = containers.remove(&id);
            trace!("Deregistered container {id}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::IsolationPlan;
    use crate::schema::{
        AcIdentifier, AcName, App, ImageHash, ImageManifest, PodManifest,
        ResourceLimits,
    };
    use validation::ValidatedField;

    fn container() -> Arc<Container> {
        Arc::new(Container::new(
            ContainerId::new(),
            AcName::validate(Some("app".into()), "name", None).expect("name"),
            PodManifest::blank(),
            ImageManifest::new(
                AcIdentifier::try_from("example.com/app".to_string())
                    .expect("id"),
                Some(App::default()),
            ),
            ImageHash::try_from("sha512-0a1b".to_string()).expect("hash"),
            IsolationPlan {
                namespaces: vec![],
                limits: ResourceLimits::default(),
                host_api_access: false,
            },
        ))
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates() {
        let registry = Registry::new();
        let container = container();

        registry.insert(Arc::clone(&container)).await.expect("insert");
        assert!(matches!(
            registry.insert(Arc::clone(&container)).await,
            Err(ContainersError::ContainerExists { .. })
        ));
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = Registry::new();
        let container = container();
        registry.insert(Arc::clone(&container)).await.expect("insert");

        let removed = registry.remove(&container.id()).await.expect("present");
        assert!(Arc::ptr_eq(&removed, &container));
        assert!(container.stop_requested().await);
        assert!(registry.get(&container.id()).await.is_none());

        assert!(registry.remove(&container.id()).await.is_none());
        assert!(registry.remove(&ContainerId::new()).await.is_none());
    }

    #[tokio::test]
    async fn test_deregister_sets_terminal_state() {
        let registry = Registry::new();
        let container = container();
        registry.insert(Arc::clone(&container)).await.expect("insert");
        container.advance(ContainerState::Starting).await.expect("start");

        registry
            .deregister(&container, ContainerState::Failed, Some("boom".into()))
            .await;

        assert!(registry.list().await.is_empty());
        assert_eq!(container.state().await, ContainerState::Failed);
        assert_eq!(container.failure().await.as_deref(), Some("boom"));
    }
}
