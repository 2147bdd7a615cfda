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

use crate::containers::ContainerManager;
use std::io;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

pub(crate) struct GracefulShutdown {
    manager: ContainerManager,
    /// Upper bound on waiting for all containers to be torn down.
    timeout: Duration,
}

impl GracefulShutdown {
    pub fn new(manager: ContainerManager) -> Self {
        // Each container gets its stop grace period, plus time to tear down.
        let timeout = manager.options().stop_timeout + Duration::from_secs(5);
        Self { manager, timeout }
    }

    /// Waits for a signal and then removes every container.
    /// ---
    /// Signals:
    /// * [SIGTERM]
    /// * [SIGINT]
    /// ---
    /// Returns after processing the first received signal.
    pub async fn wait(self) -> io::Result<()> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        self.shutdown().await;
        Ok(())
    }

    /// Removes every container and waits, up to the timeout, for them to be
    /// torn down.
    pub async fn shutdown(&self) {
        let removed = self.manager.remove_all().await;
        info!("Stopping {} container(s)", removed.len());

        let joined = tokio::time::timeout(self.timeout, async {
            for container in &removed {
                let state = container.wait().await;
                info!("Container {} is {state}", container.id());
            }
        })
        .await;

        if joined.is_err() {
            let mut pending = 0;
            for container in &removed {
                if !container.state().await.is_terminal() {
                    pending += 1;
                }
            }
            warn!("Gave up waiting for {pending} container(s) after {:?}", self.timeout);
        }

        let remaining = self.manager.list().await.len();
        if remaining > 0 {
            error!("{remaining} container(s) registered during shutdown");
        }
    }
}
