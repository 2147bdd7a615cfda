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

//! The admission gate: what an image must look like to be run here.

use super::{ContainersError, IsolationPlan, Result};
use crate::schema::{
    App, ImageManifest, IsolatorError, NamespaceKind, NamespaceMode,
};

/// Checks `manifest` against the required namespace kinds.
///
/// Only an explicit request to share a required namespace with the host is
/// rejected. A manifest without the namespaces isolator, or one that does
/// not mention a kind, passes.
pub fn validate_image_manifest(
    manifest: &ImageManifest,
    required: &[NamespaceKind],
) -> Result<()> {
    let app = manifest.app.as_ref().ok_or(ContainersError::MissingApp)?;

    let Some(namespaces) = app
        .linux_namespaces()
        .map_err(|e| ContainersError::InvalidIsolator { source: e })?
    else {
        return Ok(());
    };

    for kind in required {
        if namespaces.get(*kind) == Some(NamespaceMode::Host) {
            return Err(ContainersError::IsolationPolicyViolation {
                namespace: *kind,
            });
        }
    }

    Ok(())
}

/// Works out the namespaces and limits for `app`. Required kinds the app is
/// silent about are isolated along with the default set.
pub(crate) fn isolation_plan(
    app: &App,
    required: &[NamespaceKind],
) -> std::result::Result<IsolationPlan, IsolatorError> {
    let declared = app.linux_namespaces()?.unwrap_or_default();

    Ok(IsolationPlan {
        namespaces: declared.isolated(required),
        limits: app.resource_limits()?,
        host_api_access: app.host_api_access()?,
    })
}
