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

//! A host container manager daemon.
//!
//! `corrald` admits containers built from already unpacked images, checks
//! them against the host's isolation policy, places each in its own cgroup
//! and namespaces, and tears them down again when they exit or are removed.
//!
//! The [containers::ContainerManager] is the entry point. Image storage,
//! networking, cgroups and process launch sit behind traits so they can be
//! swapped out.

// Lint groups: https://doc.rust-lang.org/rustc/lints/groups.html
#![warn(future_incompatible, nonstandard_style, unused)]
#![warn(
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    unconditional_recursion,
    unused_comparisons,
    while_true
)]
#![warn(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
#![warn(clippy::unwrap_used)]

use crate::graceful_shutdown::GracefulShutdown;
use crate::init::BootContext;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

pub mod cgroups;
pub mod config;
pub mod containers;
mod graceful_shutdown;
pub mod images;
pub mod init;
pub mod launcher;
pub mod network;
pub mod schema;

/// Default path of the host control socket handed to containers granted
/// host API access.
pub const CORRAL_SOCK: &str = "/var/run/corral/corral.sock";
const EXIT_OKAY: i32 = 0;
const EXIT_ERROR: i32 = 1;

/// Command line options for corrald.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CorraldOptions {
    /// JSON config file. Defaults are used when omitted.
    #[clap(short, long, value_parser)]
    pub config: Option<PathBuf>,
    /// Host control socket path. Defaults to /var/run/corral/corral.sock
    #[clap(short, long, value_parser, default_value = CORRAL_SOCK)]
    pub socket: PathBuf,
    /// Toggle verbosity. Default false
    #[clap(short, long)]
    pub verbose: bool,
}

/// Parses the command line, boots the host and runs until SIGTERM or SIGINT.
pub async fn daemon() -> i32 {
    let options = CorraldOptions::parse();

    match run(options).await {
        Ok(()) => EXIT_OKAY,
        Err(e) => {
            // Logging may not be up if boot failed early.
            eprintln!("{e:#}");
            error!("{e:#}");
            EXIT_ERROR
        }
    }
}

pub async fn run(options: CorraldOptions) -> anyhow::Result<()> {
    let mut context = BootContext {
        verbose: options.verbose,
        config_path: options.config,
        socket: Some(options.socket),
        ..Default::default()
    };

    init::boot(&mut context, &init::default_steps()).await?;
    info!("Corral daemon is pid {}", std::process::id());

    let manager = context
        .manager
        .take()
        .ok_or_else(|| anyhow::anyhow!("boot did not launch a container manager"))?;

    GracefulShutdown::new(manager).wait().await?;
    info!("Shut down cleanly");
    Ok(())
}
