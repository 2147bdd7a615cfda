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

use super::{logging, BootContext, BootStep};
use crate::config::CorraldConfig;
use crate::containers::ContainerManager;
use crate::images::DirectoryImageManager;
use crate::network::HostNetworkManager;
use anyhow::{anyhow, Context};
use std::sync::Arc;
use tracing::{info, trace};

#[derive(Debug)]
pub struct ConfigureLogging;

#[async_trait::async_trait]
impl BootStep for ConfigureLogging {
    fn name(&self) -> &'static str {
        "configure-logging"
    }

    async fn run(&self, context: &mut BootContext) -> anyhow::Result<()> {
        logging::init(context.verbose)?;
        trace!("**Logging: Verbose Mode**");
        Ok(())
    }
}

#[derive(Debug)]
pub struct LoadConfiguration;

#[async_trait::async_trait]
impl BootStep for LoadConfiguration {
    fn name(&self) -> &'static str {
        "load-configuration"
    }

    async fn run(&self, context: &mut BootContext) -> anyhow::Result<()> {
        context.config = CorraldConfig::load(context.config_path.as_deref()).await?;
        trace!("{:#?}", context.config);
        Ok(())
    }
}

#[derive(Debug)]
pub struct CreateDirectories;

#[async_trait::async_trait]
impl BootStep for CreateDirectories {
    fn name(&self) -> &'static str {
        "create-directories"
    }

    async fn run(&self, context: &mut BootContext) -> anyhow::Result<()> {
        let paths = &context.config.paths;
        for directory in [&paths.containers, &paths.volumes, &paths.images] {
            tokio::fs::create_dir_all(directory).await.with_context(|| {
                format!("Failed to create directory {}", directory.display())
            })?;
            trace!("Created {}", directory.display());
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct LaunchManager;

#[async_trait::async_trait]
impl BootStep for LaunchManager {
    fn name(&self) -> &'static str {
        "launch-manager"
    }

    async fn run(&self, context: &mut BootContext) -> anyhow::Result<()> {
        let config = &context.config;
        let images = Arc::new(DirectoryImageManager::new(&config.paths.images));
        let network = Arc::new(HostNetworkManager::new());

        let mut manager =
            ContainerManager::new(images, network, config.manager_options())?;
        if let Some(socket) = &context.socket {
            manager = manager.with_host_socket_file(socket);
        }

        info!("Container manager started");
        context.manager = Some(manager);
        Ok(())
    }
}

#[derive(Debug)]
pub struct StartInitContainers;

#[async_trait::async_trait]
impl BootStep for StartInitContainers {
    fn name(&self) -> &'static str {
        "start-init-containers"
    }

    async fn run(&self, context: &mut BootContext) -> anyhow::Result<()> {
        let manager = context
            .manager
            .as_ref()
            .ok_or_else(|| anyhow!("container manager has not been launched"))?;

        for reference in &context.config.init_containers {
            let container = manager
                .create_from_reference(reference)
                .await
                .with_context(|| format!("init container '{reference}'"))?;
            info!("Started init container {} ({reference})", container.id());
            context.init_containers.push(container);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_directories() {
        let root = std::env::temp_dir().join(format!("corrald-{}", uuid::Uuid::new_v4()));
        let mut context = BootContext::default();
        context.config.paths.containers = root.join("containers");
        context.config.paths.volumes = root.join("volumes");
        context.config.paths.images = root.join("images");

        CreateDirectories.run(&mut context).await.expect("create");
        // Running again over existing directories is fine.
        CreateDirectories.run(&mut context).await.expect("exists");

        assert!(root.join("containers").is_dir());
        assert!(root.join("volumes").is_dir());
        assert!(root.join("images").is_dir());
        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_init_containers_need_a_manager() {
        let mut context = BootContext::default();
        context.config.init_containers = vec!["example.com/ntpd".into()];

        assert!(StartInitContainers.run(&mut context).await.is_err());
        assert!(context.init_containers.is_empty());
    }

    #[tokio::test]
    async fn test_load_configuration_defaults() {
        let mut context = BootContext::default();
        LoadConfiguration.run(&mut context).await.expect("defaults");
        assert_eq!(context.config, CorraldConfig::default());
    }
}
