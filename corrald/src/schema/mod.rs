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

//! The manifest model: image manifests as they come out of image storage and
//! pod manifests as the runtime generates them for each container.

pub use ac_name::{AcIdentifier, AcName, AC_NAME_MAX_LENGTH};
pub use image_hash::ImageHash;
pub use image_manifest::{
    Annotation, App, EnvironmentVariable, ImageManifest, Label, MountPoint,
};
pub use isolators::{
    Isolator, IsolatorError, LinuxNamespaces, NamespaceKind, NamespaceMode,
    ResourceLimits,
};
pub use pod_manifest::{PodManifest, RuntimeApp, RuntimeImage};

mod ac_name;
mod image_hash;
mod image_manifest;
pub mod isolators;
mod pod_manifest;

/// Schema version stamped on generated manifests.
pub const AC_VERSION: &str = "0.8.11";
