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

//! Boot sequencing for the daemon.
//!
//! Boot is an ordered list of named [BootStep]s sharing one [BootContext].
//! The first step to fail stops the boot and is named in the error. Nothing
//! already done is rolled back.

pub use steps::{
    ConfigureLogging, CreateDirectories, LaunchManager, LoadConfiguration,
    StartInitContainers,
};

use crate::config::CorraldConfig;
use crate::containers::{Container, ContainerManager};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, trace};

mod logging;
mod steps;

#[derive(Error, Debug)]
pub enum BootError {
    #[error("boot step '{step}' failed: {source:#}")]
    StepFailed { step: &'static str, source: anyhow::Error },
}

/// State handed from one boot step to the next.
#[derive(Debug, Default)]
pub struct BootContext {
    pub verbose: bool,
    pub config_path: Option<PathBuf>,
    /// Control socket passed to containers granted host API access.
    pub socket: Option<PathBuf>,
    pub config: CorraldConfig,
    pub manager: Option<ContainerManager>,
    pub init_containers: Vec<Arc<Container>>,
}

#[async_trait::async_trait]
pub trait BootStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, context: &mut BootContext) -> anyhow::Result<()>;
}

/// The steps a host boots through, in order.
pub fn default_steps() -> Vec<Box<dyn BootStep>> {
    vec![
        Box::new(ConfigureLogging),
        Box::new(LoadConfiguration),
        Box::new(CreateDirectories),
        Box::new(LaunchManager),
        Box::new(StartInitContainers),
    ]
}

/// Runs `steps` in order against `context`.
pub async fn boot(
    context: &mut BootContext,
    steps: &[Box<dyn BootStep>],
) -> Result<(), BootError> {
    for step in steps {
        trace!("Running boot step {}", step.name());
        step.run(context)
            .await
            .map_err(|e| BootError::StepFailed { step: step.name(), source: e })?;
    }

    info!("Boot complete");
    Ok(())
}
