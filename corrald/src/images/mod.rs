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

//! Image lookup. The runtime never fetches images itself; it asks an
//! [ImageManager] for the manifest of an image that is already present.

pub use directory::DirectoryImageManager;
pub use error::{ImageError, Result};

use crate::schema::{ImageHash, ImageManifest};
use std::fmt::Debug;

mod directory;
mod error;

#[async_trait::async_trait]
pub trait ImageManager: Debug + Send + Sync {
    /// Resolves `reference`, either an image hash or an image name, to a
    /// locally available image. Implementations may fetch missing images.
    async fn resolve_or_fetch(
        &self,
        reference: &str,
    ) -> Result<(ImageManifest, ImageHash)>;

    async fn get(&self, image_hash: &ImageHash) -> Result<ImageManifest>;

    async fn list(&self) -> Result<Vec<(ImageHash, ImageManifest)>>;

    async fn delete(&self, image_hash: &ImageHash) -> Result<()>;
}
