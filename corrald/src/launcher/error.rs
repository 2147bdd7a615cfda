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
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LaunchError>;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("invalid launch request: {reason}")]
    InvalidSpec { reason: String },
    #[error("failed to clone container process: {source}")]
    Clone { source: io::Error },
    #[error("failed to exec '{program}': {source}")]
    Exec { program: String, source: io::Error },
    #[error("failed to signal pid {pid}: {source}")]
    Signal { pid: Pid, source: nix::Error },
    #[error("failed to wait for pid {pid}: {source}")]
    Wait { pid: Pid, source: io::Error },
}
