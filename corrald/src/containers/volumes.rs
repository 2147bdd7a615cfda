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

use super::{ContainersError, Result};
use crate::schema::AcName;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs::DirBuilder;
use tokio::sync::Mutex;
use tracing::debug;
use validation::ValidatedField;

const VOLUME_MODE: u32 = 0o755;

/// Named host directories shared into containers.
#[derive(Debug)]
pub(crate) struct Volumes {
    directory: PathBuf,
    // Serializes volume creation only. Independent of the registry lock.
    lock: Mutex<()>,
}

impl Volumes {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory, lock: Mutex::new(()) }
    }

    /// Host path of the volume `name`, created on first use.
    pub async fn path(&self, name: &str) -> Result<PathBuf> {
        let name = AcName::validate(Some(name.to_string()), "volume", None)
            .map_err(|e| ContainersError::InvalidName {
                name: name.to_string(),
                source: e,
            })?;
        let path = self.directory.join(name.as_str());

        let _guard = self.lock.lock().await;
        match DirBuilder::new().mode(VOLUME_MODE).create(&path).await {
            Ok(()) => debug!("Created volume {}", path.display()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(ContainersError::Io { path, source: e }),
        }

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;

    async fn volumes() -> Volumes {
        let directory = std::env::temp_dir()
            .join(format!("corral-volumes-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&directory).await.expect("mkdir");
        Volumes::new(directory)
    }

    #[tokio::test]
    async fn test_volume_is_created_once() {
        let volumes = volumes().await;

        let first = volumes.path("data").await.expect("create");
        let second = volumes.path("data").await.expect("exists");
        assert_eq!(first, second);
        assert_eq!(first, volumes.directory.join("data"));

        let mode = tokio::fs::metadata(&first)
            .await
            .expect("metadata")
            .permissions()
            .mode();
        assert!(mode & 0o777 <= VOLUME_MODE);

        let _ = tokio::fs::remove_dir_all(&volumes.directory).await;
    }

    #[tokio::test]
    async fn test_concurrent_creation_agrees() {
        let volumes = Arc::new(volumes().await);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let volumes = Arc::clone(&volumes);
                tokio::spawn(async move { volumes.path("shared").await })
            })
            .collect();

        for task in tasks {
            let path = task.await.expect("join").expect("volume");
            assert_eq!(path, volumes.directory.join("shared"));
        }

        let _ = tokio::fs::remove_dir_all(&volumes.directory).await;
    }

    #[tokio::test]
    async fn test_invalid_names_are_rejected() {
        let volumes = volumes().await;

        for name in ["", "../etc", "Data", "a/b"] {
            assert!(matches!(
                volumes.path(name).await,
                Err(ContainersError::InvalidName { .. })
            ));
        }

        let _ = tokio::fs::remove_dir_all(&volumes.directory).await;
    }

    #[tokio::test]
    async fn test_missing_volume_directory_is_an_error() {
        let volumes = Volumes::new(
            std::env::temp_dir().join(uuid::Uuid::new_v4().to_string()),
        );
        assert!(matches!(
            volumes.path("data").await,
            Err(ContainersError::Io { .. })
        ));
    }
}
