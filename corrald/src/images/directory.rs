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

use super::{ImageError, ImageManager, Result};
use crate::schema::{ImageHash, ImageManifest};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, trace, warn};
use validation::ValidatedField;

const MANIFEST_FILE: &str = "manifest";

/// Image catalogue over a directory of unpacked images, one directory per
/// image named after its hash and holding a JSON `manifest`.
///
/// ```text
/// <directory>/sha512-4f2c.../manifest
/// <directory>/sha512-4f2c.../rootfs/
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryImageManager {
    directory: PathBuf,
}

impl DirectoryImageManager {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into() }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn image_directory(&self, image_hash: &ImageHash) -> PathBuf {
        self.directory.join(image_hash.as_str())
    }

    async fn read_manifest(&self, image_hash: &ImageHash) -> Result<ImageManifest> {
        let path = self.image_directory(image_hash).join(MANIFEST_FILE);
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ImageError::NotFound {
                    reference: image_hash.to_string(),
                })
            }
            Err(e) => return Err(ImageError::Io { path, source: e }),
        };

        serde_json::from_slice(&contents).map_err(|e| {
            ImageError::InvalidManifest {
                image_hash: image_hash.clone(),
                source: e,
            }
        })
    }
}

#[async_trait::async_trait]
impl ImageManager for DirectoryImageManager {
    async fn resolve_or_fetch(
        &self,
        reference: &str,
    ) -> Result<(ImageManifest, ImageHash)> {
        if let Ok(image_hash) =
            ImageHash::validate(Some(reference.to_string()), "reference", None)
        {
            let manifest = self.get(&image_hash).await?;
            return Ok((manifest, image_hash));
        }

        // Not a hash, so treat it as an image name. The first image found
        // by that name wins.
        let found = self
            .list()
            .await?
            .into_iter()
            .find(|(_, manifest)| manifest.name.as_str() == reference);

        match found {
            Some((image_hash, manifest)) => {
                trace!("Resolved image {reference} to {image_hash}");
                Ok((manifest, image_hash))
            }
            None => Err(ImageError::FetchUnsupported {
                reference: reference.to_string(),
            }),
        }
    }

    async fn get(&self, image_hash: &ImageHash) -> Result<ImageManifest> {
        self.read_manifest(image_hash).await
    }

    async fn list(&self) -> Result<Vec<(ImageHash, ImageManifest)>> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(ImageError::Io {
                    path: self.directory.clone(),
                    source: e,
                })
            }
        };

        let mut images = vec![];
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            ImageError::Io { path: self.directory.clone(), source: e }
        })? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Ok(image_hash) =
                ImageHash::validate(Some(file_name.clone()), "image", None)
            else {
                trace!("Ignoring {file_name} in image store");
                continue;
            };

            match self.read_manifest(&image_hash).await {
                Ok(manifest) => images.push((image_hash, manifest)),
                Err(e) => warn!("Skipping image {image_hash}: {e}"),
            }
        }

        images.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(images)
    }

    async fn delete(&self, image_hash: &ImageHash) -> Result<()> {
        let path = self.image_directory(image_hash);
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                info!("Deleted image {image_hash}");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ImageError::NotFound { reference: image_hash.to_string() })
            }
            Err(e) => Err(ImageError::Io { path, source: e }),
        }
    }
}
