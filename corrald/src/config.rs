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

//! The on-disk daemon configuration.
//!
//! Every field has a codified default, so a missing file or an empty JSON
//! object boots a working host.

use crate::containers::{
    ManagerOptions, DEFAULT_CONTAINER_DIRECTORY, DEFAULT_PARENT_CGROUP,
    DEFAULT_STARTUP_TIMEOUT, DEFAULT_STOP_TIMEOUT, DEFAULT_VOLUME_DIRECTORY,
};
use crate::schema::NamespaceKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_IMAGE_DIRECTORY: &str = "/var/lib/corral/images";

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config '{}' could not be read: {source}", .path.display())]
    Read { path: PathBuf, source: std::io::Error },
    #[error("config '{}' is invalid: {source}", .path.display())]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct CorraldConfig {
    pub parent_cgroup_name: String,
    pub paths: PathsConfig,
    /// Namespace kinds images may not share with the host. Unknown kinds
    /// fail to parse.
    pub required_namespaces: Vec<NamespaceKind>,
    /// `null` disables the startup timeout.
    pub startup_timeout_seconds: Option<u64>,
    pub stop_timeout_seconds: u64,
    /// Image references started once the manager is up.
    pub init_containers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub containers: PathBuf,
    pub volumes: PathBuf,
    pub images: PathBuf,
}

impl Default for CorraldConfig {
    fn default() -> Self {
        Self {
            parent_cgroup_name: DEFAULT_PARENT_CGROUP.into(),
            paths: PathsConfig::default(),
            required_namespaces: vec![
                NamespaceKind::Ipc,
                NamespaceKind::Net,
                NamespaceKind::Pid,
                NamespaceKind::Uts,
            ],
            startup_timeout_seconds: Some(DEFAULT_STARTUP_TIMEOUT.as_secs()),
            stop_timeout_seconds: DEFAULT_STOP_TIMEOUT.as_secs(),
            init_containers: vec![],
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            containers: DEFAULT_CONTAINER_DIRECTORY.into(),
            volumes: DEFAULT_VOLUME_DIRECTORY.into(),
            images: DEFAULT_IMAGE_DIRECTORY.into(),
        }
    }
}

impl CorraldConfig {
    /// Reads the config at `path`, or the defaults when there is none.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            info!("No config file given, using defaults");
            return Ok(Self::default());
        };

        let contents = tokio::fs::read(path).await.map_err(|e| {
            ConfigError::Read { path: path.to_path_buf(), source: e }
        })?;

        let config = Self::from_slice(&contents).map_err(|e| match e {
            ConfigError::Parse { source, .. } => {
                ConfigError::Parse { path: path.to_path_buf(), source }
            }
            e => e,
        })?;
        info!("Loaded config {}", path.display());
        Ok(config)
    }

    pub fn from_slice(contents: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(contents).map_err(|e| {
            ConfigError::Parse { path: PathBuf::new(), source: e }
        })?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        let name = &self.parent_cgroup_name;
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(ConfigError::Invalid {
                reason: format!("parentCgroupName '{name}' must be a single path segment"),
            });
        }

        let mut seen = HashSet::new();
        for kind in &self.required_namespaces {
            if !seen.insert(kind) {
                return Err(ConfigError::Invalid {
                    reason: format!("requiredNamespaces lists '{kind}' twice"),
                });
            }
        }

        if self.stop_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                reason: "stopTimeoutSeconds must be positive".into(),
            });
        }

        Ok(())
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            parent_cgroup_name: self.parent_cgroup_name.clone(),
            container_directory: self.paths.containers.clone(),
            volume_directory: self.paths.volumes.clone(),
            required_namespaces: self.required_namespaces.clone(),
            startup_timeout: self.startup_timeout_seconds.map(Duration::from_secs),
            stop_timeout: Duration::from_secs(self.stop_timeout_seconds),
        }
    }
}
