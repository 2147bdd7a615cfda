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

//! Starting container processes inside their namespaces.

pub use error::{LaunchError, Result};
pub use host::HostLauncher;

use crate::containers::ContainerId;
use crate::schema::NamespaceKind;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::fmt::Debug;
use std::path::PathBuf;
use std::process::ExitStatus;

mod error;
mod host;

/// Environment variable carrying the host control socket to containers that
/// were granted host API access.
pub const HOST_SOCKET_ENV: &str = "CORRAL_HOST_SOCKET";

/// Everything needed to start the single process of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub container_id: ContainerId,
    pub hostname: String,
    pub exec: Vec<String>,
    pub environment: Vec<(String, String)>,
    pub working_directory: Option<PathBuf>,
    /// Namespace kinds the process gets its own instance of.
    pub namespaces: Vec<NamespaceKind>,
    pub mounts: Vec<VolumeMount>,
    pub host_socket: Option<PathBuf>,
    pub user: Option<u32>,
    pub group: Option<u32>,
}

impl LaunchSpec {
    pub fn isolates(&self, kind: NamespaceKind) -> bool {
        self.namespaces.contains(&kind)
    }
}

/// A volume bound into the container's mount namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: PathBuf,
    pub target: PathBuf,
    pub read_only: bool,
}

/// Parses a numeric user or group id. Blank means "inherit from corrald".
pub fn parse_id(value: &str, field: &str) -> Result<Option<u32>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }

    value.parse().map(Some).map_err(|_| LaunchError::InvalidSpec {
        reason: format!("{field} '{value}' is not a numeric id"),
    })
}

#[async_trait::async_trait]
pub trait ProcessLauncher: Debug + Send + Sync {
    async fn launch(&self, spec: LaunchSpec) -> Result<Box<dyn ContainerProcess>>;
}

#[async_trait::async_trait]
pub trait ContainerProcess: Debug + Send + Sync {
    /// Host pid of the process.
    fn pid(&self) -> Pid;

    /// Resolves once the process has exited. Cancel safe, so it can be raced
    /// against a stop request and called again.
    async fn wait(&mut self) -> Result<ExitStatus>;

    /// Does nothing once the process has been reaped.
    fn signal(&self, signal: Signal) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case("", None; "blank")]
    #[test_case("0", Some(0); "root")]
    #[test_case(" 1000 ", Some(1000); "padded")]
    #[test]
    fn test_parse_id(input: &str, expected: Option<u32>) {
        assert_eq!(parse_id(input, "user").expect("valid id"), expected);
    }

    #[test]
    fn test_parse_id_rejects_names() {
        assert!(matches!(
            parse_id("nobody", "user"),
            Err(LaunchError::InvalidSpec { .. })
        ));
    }
}
