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

use super::{InterfaceRequest, NetworkInterface, NetworkManager, Result};
use crate::containers::Container;
use tracing::debug;

/// Leaves containers without configured interfaces. A container with its own
/// network namespace only has a loopback device; anything sharing the host
/// namespace sees the host's interfaces.
#[derive(Debug, Clone, Default)]
pub struct HostNetworkManager;

impl HostNetworkManager {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl NetworkManager for HostNetworkManager {
    async fn attach(
        &self,
        container: &Container,
        requested: &[InterfaceRequest],
    ) -> Result<Vec<NetworkInterface>> {
        debug!(
            "No network plugin configured, ignoring {} interface request(s) for {}",
            requested.len(),
            container.id()
        );
        Ok(vec![])
    }

    async fn detach(&self, _container: &Container) -> Result<()> {
        Ok(())
    }
}
