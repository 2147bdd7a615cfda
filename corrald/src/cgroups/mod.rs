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

//! Placement of container processes in the cgroup v2 hierarchy.

pub use error::{CgroupsError, Result};
pub use host::HostCgroups;

use crate::schema::ResourceLimits;
use nix::unistd::Pid;
use std::{fmt::Debug, path::Path, sync::Arc};

mod error;
mod host;

/// Entry point into a cgroup hierarchy.
pub trait CgroupHierarchy: Debug + Send + Sync {
    /// Fails if the host cannot host containers at all.
    fn check_supported(&self) -> Result<()>;

    /// Creates the cgroup every container cgroup is nested under, or attaches
    /// to it if it already exists.
    fn create_parent(&self, name: &str) -> Result<Arc<dyn CgroupHandle>>;
}

/// A single cgroup, relative to the hierarchy root.
pub trait CgroupHandle: Debug + Send + Sync {
    fn path(&self) -> &Path;

    /// Prepares a cgroup nested under this one. Limits take effect once the
    /// first task has been added.
    fn create_child(
        &self,
        name: &str,
        limits: &ResourceLimits,
    ) -> Result<Arc<dyn CgroupHandle>>;

    fn add_task(&self, pid: Pid) -> Result<()>;

    /// Deletes the cgroup. Processes still inside it are killed.
    fn remove(&self) -> Result<()>;
}

/// Rejects anything that would escape the parent directory.
pub(crate) fn check_segment(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(CgroupsError::InvalidName { name: name.to_string() });
    }
    Ok(())
}
