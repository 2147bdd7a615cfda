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

use super::{
    isolators::{
        self, IsolatorError, LinuxNamespaces, ResourceLimits, CPU_ISOLATOR,
        HOST_API_ACCESS_ISOLATOR, LINUX_NAMESPACES_ISOLATOR, MEMORY_ISOLATOR,
    },
    AcIdentifier, AcName, Isolator, AC_VERSION,
};
use serde::{Deserialize, Serialize};

pub const IMAGE_MANIFEST_KIND: &str = "ImageManifest";

fn image_manifest_kind() -> String {
    IMAGE_MANIFEST_KIND.into()
}

fn ac_version() -> String {
    AC_VERSION.into()
}

/// Declarative description of an image: its name, labels, annotations and
/// the app it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    #[serde(default = "image_manifest_kind")]
    pub ac_kind: String,
    #[serde(default = "ac_version")]
    pub ac_version: String,
    pub name: AcIdentifier,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<App>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl ImageManifest {
    pub fn new(name: AcIdentifier, app: Option<App>) -> Self {
        Self {
            ac_kind: image_manifest_kind(),
            ac_version: ac_version(),
            name,
            labels: vec![],
            app,
            annotations: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: AcIdentifier,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub name: AcIdentifier,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

/// A path inside the container that a named volume is mounted at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountPoint {
    pub name: AcName,
    pub path: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    #[serde(default)]
    pub exec: Vec<String>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub environment: Vec<EnvironmentVariable>,
    #[serde(default)]
    pub isolators: Vec<Isolator>,
    #[serde(default)]
    pub mount_points: Vec<MountPoint>,
}

impl App {
    pub fn isolator(&self, name: &str) -> Option<&Isolator> {
        self.isolators.iter().find(|isolator| isolator.name == name)
    }

    /// Returns [None] when the app does not declare the namespaces isolator.
    pub fn linux_namespaces(
        &self,
    ) -> Result<Option<LinuxNamespaces>, IsolatorError> {
        self.isolator(LINUX_NAMESPACES_ISOLATOR)
            .map(Isolator::decode)
            .transpose()
    }

    pub fn resource_limits(&self) -> Result<ResourceLimits, IsolatorError> {
        Ok(ResourceLimits {
            memory_max: self
                .isolator(MEMORY_ISOLATOR)
                .map(isolators::memory_limit)
                .transpose()?,
            cpu_millis: self
                .isolator(CPU_ISOLATOR)
                .map(isolators::cpu_limit)
                .transpose()?,
        })
    }

    pub fn host_api_access(&self) -> Result<bool, IsolatorError> {
        Ok(self
            .isolator(HOST_API_ACCESS_ISOLATOR)
            .map(Isolator::decode::<bool>)
            .transpose()?
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{NamespaceKind, NamespaceMode};
    use serde_json::json;

    #[test]
    fn test_deserialize_image_manifest() {
        let manifest: ImageManifest = serde_json::from_value(json!({
            "acKind": "ImageManifest",
            "acVersion": "0.8.11",
            "name": "example.com/nginx",
            "labels": [{ "name": "os", "value": "linux" }],
            "app": {
                "exec": ["/usr/sbin/nginx", "-g", "daemon off;"],
                "user": "0",
                "group": "0",
                "isolators": [
                    { "name": "os/linux/namespaces", "value": { "net": "host" } },
                    { "name": "resource/memory", "value": { "limit": "64M" } },
                    { "name": "corral/host-api-access", "value": true }
                ],
                "mountPoints": [{ "name": "html", "path": "/usr/share/nginx/html", "readOnly": true }]
            },
            "annotations": [{ "name": "authors", "value": "ops@example.com" }]
        }))
        .expect("deserialize manifest");

        assert_eq!(manifest.name.as_str(), "example.com/nginx");
        let app = manifest.app.expect("app");
        assert_eq!(app.exec.len(), 3);
        assert!(app.mount_points[0].read_only);

        let namespaces =
            app.linux_namespaces().expect("valid").expect("present");
        assert_eq!(namespaces.get(NamespaceKind::Net), Some(NamespaceMode::Host));

        let limits = app.resource_limits().expect("valid limits");
        assert_eq!(limits.memory_max, Some(64_000_000));
        assert_eq!(limits.cpu_millis, None);

        assert_eq!(app.host_api_access(), Ok(true));
    }

    #[test]
    fn test_missing_isolators_are_absent() {
        let app = App::default();
        assert_eq!(app.linux_namespaces(), Ok(None));
        assert!(app.resource_limits().expect("empty").is_empty());
        assert_eq!(app.host_api_access(), Ok(false));
    }

    #[test]
    fn test_invalid_name_is_rejected() {
        let manifest: Result<ImageManifest, _> =
            serde_json::from_value(json!({ "name": "Example.com/App" }));
        assert!(manifest.is_err());
    }
}
