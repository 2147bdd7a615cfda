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

//! Network configuration for containers with their own network namespace.

pub use error::{NetworkError, Result};
pub use host::HostNetworkManager;

use crate::containers::Container;
use ipnetwork::IpNetwork;
use std::fmt::Debug;

mod error;
mod host;

/// What a container asks of the network. An empty request lets the network
/// manager pick everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceRequest {
    pub name: Option<String>,
    pub address: Option<IpNetwork>,
}

/// An interface configured inside a container's network namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub addresses: Vec<IpNetwork>,
}

#[async_trait::async_trait]
pub trait NetworkManager: Debug + Send + Sync {
    /// Configures interfaces for a container whose process is running.
    async fn attach(
        &self,
        container: &Container,
        requested: &[InterfaceRequest],
    ) -> Result<Vec<NetworkInterface>>;

    /// Tears down whatever [NetworkManager::attach] set up. Must succeed when
    /// nothing was attached.
    async fn detach(&self, container: &Container) -> Result<()>;
}
