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

use crate::schema::ImageHash;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImageError>;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("image '{reference}' not found")]
    NotFound { reference: String },
    #[error("image '{reference}' is not available locally and remote fetching is not supported")]
    FetchUnsupported { reference: String },
    #[error("image '{image_hash}' has an invalid manifest: {source}")]
    InvalidManifest { image_hash: ImageHash, source: serde_json::Error },
    #[error("image store '{}' could not be read: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
}
