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

//! Admission and lifecycle of containers.
//!
//! The [ContainerManager] validates image manifests against the host's
//! isolation policy, registers containers, and hands each one to a task that
//! sets up its cgroup, volumes, process and network, then supervises it until
//! it exits or is removed.

pub use container::{Container, IsolationPlan};
pub use container_id::ContainerId;
pub use container_state::ContainerState;
pub use error::{ContainersError, Result};
pub use manager::{
    ContainerManager, ManagerOptions, DEFAULT_CONTAINER_DIRECTORY,
    DEFAULT_PARENT_CGROUP, DEFAULT_STARTUP_TIMEOUT, DEFAULT_STOP_TIMEOUT,
    DEFAULT_VOLUME_DIRECTORY,
};
pub use self::validation::validate_image_manifest;

mod container;
mod container_id;
mod container_state;
mod error;
mod lifecycle;
mod manager;
mod registry;
mod validation;
mod volumes;
