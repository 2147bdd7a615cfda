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

use super::{ContainerId, ContainerState};
use crate::cgroups::CgroupsError;
use crate::images::ImageError;
use crate::schema::{IsolatorError, NamespaceKind};
use std::path::PathBuf;
use thiserror::Error;
use validation::ValidationError;

pub type Result<T> = std::result::Result<T, ContainersError>;

#[derive(Error, Debug)]
pub enum ContainersError {
    #[error("host cannot run containers: {source}")]
    HostUnsupported { source: CgroupsError },
    #[error("parent cgroup '{name}' could not be set up: {source}")]
    CgroupSetupFailed { name: String, source: CgroupsError },
    #[error("image manifest does not declare an app")]
    MissingApp,
    #[error("invalid image reference: {source}")]
    InvalidImageReference { source: ValidationError },
    #[error("invalid name '{name}': {source}")]
    InvalidName { name: String, source: ValidationError },
    #[error(transparent)]
    InvalidIsolator { source: IsolatorError },
    #[error("image shares the host {namespace} namespace, which must be isolated")]
    IsolationPolicyViolation { namespace: NamespaceKind },
    #[error("container '{id}' already exists")]
    ContainerExists { id: ContainerId },
    #[error("container '{id}' not found")]
    NotFound { id: ContainerId },
    #[error("container '{id}' failed to start: {reason}")]
    StartupFailed { id: ContainerId, reason: String },
    #[error("container '{id}' cannot move from {from} to {to}")]
    InvalidTransition { id: ContainerId, from: ContainerState, to: ContainerState },
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("failed to prepare '{}': {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
}
