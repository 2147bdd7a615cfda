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

use super::{
    lifecycle::Lifecycle,
    registry::Registry,
    validation::{isolation_plan, validate_image_manifest},
    volumes::Volumes,
    Container, ContainerId, ContainerState, ContainersError, Result,
};
use crate::cgroups::{CgroupHandle, CgroupHierarchy, HostCgroups};
use crate::images::ImageManager;
use crate::launcher::{HostLauncher, ProcessLauncher};
use crate::network::NetworkManager;
use crate::schema::{
    AcName, ImageHash, ImageManifest, NamespaceKind, PodManifest, RuntimeApp,
    RuntimeImage,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use validation::ValidatedField;

pub const DEFAULT_PARENT_CGROUP: &str = "corral";
pub const DEFAULT_CONTAINER_DIRECTORY: &str = "/var/lib/corral/containers";
pub const DEFAULT_VOLUME_DIRECTORY: &str = "/var/lib/corral/volumes";
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Cgroup every container cgroup is created under.
    pub parent_cgroup_name: String,
    /// Per container scratch directories live here.
    pub container_directory: PathBuf,
    /// Named volumes live here.
    pub volume_directory: PathBuf,
    /// Namespace kinds an image may not share with the host.
    pub required_namespaces: Vec<NamespaceKind>,
    /// Containers still starting after this long are failed.
    pub startup_timeout: Option<Duration>,
    /// Grace period between SIGTERM and SIGKILL.
    pub stop_timeout: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            parent_cgroup_name: DEFAULT_PARENT_CGROUP.into(),
            container_directory: DEFAULT_CONTAINER_DIRECTORY.into(),
            volume_directory: DEFAULT_VOLUME_DIRECTORY.into(),
            required_namespaces: vec![
                NamespaceKind::Ipc,
                NamespaceKind::Net,
                NamespaceKind::Pid,
                NamespaceKind::Uts,
            ],
            startup_timeout: Some(DEFAULT_STARTUP_TIMEOUT),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Admits, tracks and tears down the containers of this host.
///
/// Cloning is cheap and every clone shares the same registry.
#[derive(Debug, Clone)]
pub struct ContainerManager {
    options: Arc<ManagerOptions>,
    parent_cgroup: Arc<dyn CgroupHandle>,
    images: Arc<dyn ImageManager>,
    network: Arc<dyn NetworkManager>,
    launcher: Arc<dyn ProcessLauncher>,
    registry: Arc<Registry>,
    volumes: Arc<Volumes>,
    host_socket: Option<PathBuf>,
}

impl ContainerManager {
    /// Creates a manager running containers on this host's cgroup v2
    /// hierarchy.
    pub fn new(
        images: Arc<dyn ImageManager>,
        network: Arc<dyn NetworkManager>,
        options: ManagerOptions,
    ) -> Result<Self> {
        Self::with_capabilities(
            images,
            network,
            &HostCgroups::new(),
            Arc::new(HostLauncher::new()),
            options,
        )
    }

    /// # Errors
    /// * If the hierarchy cannot host containers -> [ContainersError::HostUnsupported]
    /// * If the parent cgroup cannot be created -> [ContainersError::CgroupSetupFailed]
    pub fn with_capabilities(
        images: Arc<dyn ImageManager>,
        network: Arc<dyn NetworkManager>,
        cgroups: &dyn CgroupHierarchy,
        launcher: Arc<dyn ProcessLauncher>,
        options: ManagerOptions,
    ) -> Result<Self> {
        cgroups
            .check_supported()
            .map_err(|e| ContainersError::HostUnsupported { source: e })?;

        let parent_cgroup =
            cgroups.create_parent(&options.parent_cgroup_name).map_err(|e| {
                ContainersError::CgroupSetupFailed {
                    name: options.parent_cgroup_name.clone(),
                    source: e,
                }
            })?;

        info!(
            "Container manager using cgroup {}, required namespaces {:?}",
            parent_cgroup.path().display(),
            options.required_namespaces
        );

        Ok(Self {
            volumes: Arc::new(Volumes::new(options.volume_directory.clone())),
            options: Arc::new(options),
            parent_cgroup,
            images,
            network,
            launcher,
            registry: Arc::new(Registry::new()),
            host_socket: None,
        })
    }

    /// Socket handed to containers granted host API access.
    pub fn with_host_socket_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.host_socket = Some(path.into());
        self
    }

    pub fn host_socket_file(&self) -> Option<&Path> {
        self.host_socket.as_deref()
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    pub fn images(&self) -> &Arc<dyn ImageManager> {
        &self.images
    }

    /// Checks `manifest` against this manager's isolation policy.
    pub fn validate(&self, manifest: &ImageManifest) -> Result<()> {
        validate_image_manifest(manifest, &self.options.required_namespaces)
    }

    /// Admits a container for `manifest` and starts it in the background.
    ///
    /// A blank `name` is derived from the image name. The container is
    /// registered before this returns. Startup failures are only visible
    /// through [Container::wait] and [Container::wait_for_running].
    #[instrument(skip(self, manifest), fields(image = %manifest.name))]
    pub async fn create(
        &self,
        name: &str,
        manifest: ImageManifest,
        image_hash: &str,
    ) -> Result<Arc<Container>> {
        self.validate(&manifest)?;

        let image_hash =
            ImageHash::validate(Some(image_hash.to_string()), "image_hash", None)
                .map_err(|e| ContainersError::InvalidImageReference { source: e })?;

        let name = if name.trim().is_empty() {
            AcName::from_identifier(&manifest.name)
        } else {
            AcName::validate(Some(name.to_string()), "name", None)
        }
        .map_err(|e| ContainersError::InvalidName {
            name: name.to_string(),
            source: e,
        })?;

        let app = manifest.app.clone().ok_or(ContainersError::MissingApp)?;
        let isolation = isolation_plan(&app, &self.options.required_namespaces)
            .map_err(|e| ContainersError::InvalidIsolator { source: e })?;

        let id = ContainerId::new();

        let mut pod = PodManifest::blank();
        pod.annotations = manifest.annotations.clone();
        pod.apps.push(RuntimeApp {
            name: name.clone(),
            image: RuntimeImage {
                id: image_hash.clone(),
                name: Some(manifest.name.clone()),
                labels: manifest.labels.clone(),
            },
            app: Some(app),
        });

        let container = Arc::new(Container::new(
            id, name, pod, manifest, image_hash, isolation,
        ));

        self.registry.insert(Arc::clone(&container)).await?;
        container.advance(ContainerState::Starting).await?;
        container.span().in_scope(|| info!("Admitted container"));

        let _handle = Lifecycle {
            container: Arc::clone(&container),
            registry: Arc::clone(&self.registry),
            options: Arc::clone(&self.options),
            parent_cgroup: Arc::clone(&self.parent_cgroup),
            network: Arc::clone(&self.network),
            launcher: Arc::clone(&self.launcher),
            volumes: Arc::clone(&self.volumes),
            host_socket: self.host_socket.clone(),
        }
        .spawn();

        Ok(container)
    }

    /// Resolves `reference` through the image manager and creates a container
    /// named after the image.
    #[instrument(skip(self))]
    pub async fn create_from_reference(
        &self,
        reference: &str,
    ) -> Result<Arc<Container>> {
        let (manifest, image_hash) =
            self.images.resolve_or_fetch(reference).await?;
        self.create("", manifest, image_hash.as_str()).await
    }

    pub async fn list(&self) -> Vec<Arc<Container>> {
        self.registry.list().await
    }

    pub async fn get(&self, id: &ContainerId) -> Option<Arc<Container>> {
        self.registry.get(id).await
    }

    /// Unregisters the container and starts its teardown. Returns without
    /// waiting; use [Container::wait] on the returned handle for that.
    /// Removing an unknown id is a no-op.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &ContainerId) -> Option<Arc<Container>> {
        let container = self.registry.remove(id).await?;
        container.span().in_scope(|| info!("Removing container"));
        Some(container)
    }

    /// Removes every registered container.
    pub async fn remove_all(&self) -> Vec<Arc<Container>> {
        let mut removed = vec![];
        for container in self.registry.list().await {
            if let Some(container) = self.remove(&container.id()).await {
                removed.push(container);
            }
        }
        removed
    }

    /// Waits for a registered container to reach a terminal state.
    pub async fn wait(&self, id: &ContainerId) -> Result<ContainerState> {
        let container = self
            .registry
            .get(id)
            .await
            .ok_or(ContainersError::NotFound { id: *id })?;
        Ok(container.wait().await)
    }

    /// Host path of the named volume, created if it does not exist yet.
    pub async fn volume_path(&self, name: &str) -> Result<PathBuf> {
        self.volumes.path(name).await
    }
}
