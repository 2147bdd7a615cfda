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

use nix::unistd::Pid;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CgroupsError>;

#[derive(Error, Debug)]
pub enum CgroupsError {
    #[error("unable to detect the host cgroup setup: {source}")]
    DetectSetup { source: anyhow::Error },
    #[error("a cgroup v2 unified hierarchy is required, host has {setup}")]
    UnsupportedSetup { setup: String },
    #[error("cgroup name '{name}' is not a single path segment")]
    InvalidName { name: String },
    #[error("cgroup '{}' could not be created: {source}", .path.display())]
    CreateCgroup { path: PathBuf, source: anyhow::Error },
    #[error("pid {pid} could not be added to cgroup '{}': {source}", .path.display())]
    AddTaskToCgroup { path: PathBuf, pid: Pid, source: anyhow::Error },
    #[error("limits could not be applied to cgroup '{}': {source}", .path.display())]
    ApplyLimits { path: PathBuf, source: anyhow::Error },
    #[error("cgroup '{}' could not be deleted: {source}", .path.display())]
    DeleteCgroup { path: PathBuf, source: anyhow::Error },
}
