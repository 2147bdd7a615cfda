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

//! Typed views over the isolators an app may declare.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

pub const LINUX_NAMESPACES_ISOLATOR: &str = "os/linux/namespaces";
pub const MEMORY_ISOLATOR: &str = "resource/memory";
pub const CPU_ISOLATOR: &str = "resource/cpu";
pub const HOST_API_ACCESS_ISOLATOR: &str = "corral/host-api-access";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IsolatorError {
    #[error("isolator '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },
}

/// A named isolator as it appears in a manifest. The value is kept untyped
/// until one of the typed accessors asks for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Isolator {
    pub name: String,
    pub value: serde_json::Value,
}

impl Isolator {
    pub(crate) fn decode<T: for<'de> Deserialize<'de>>(
        &self,
    ) -> Result<T, IsolatorError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            IsolatorError::Invalid {
                name: self.name.clone(),
                reason: e.to_string(),
            }
        })
    }
}

/// The namespace kinds the runtime knows how to isolate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    Ipc,
    Net,
    Pid,
    User,
    Uts,
}

impl NamespaceKind {
    pub const ALL: [NamespaceKind; 5] = [
        NamespaceKind::Ipc,
        NamespaceKind::Net,
        NamespaceKind::Pid,
        NamespaceKind::User,
        NamespaceKind::Uts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NamespaceKind::Ipc => "ipc",
            NamespaceKind::Net => "net",
            NamespaceKind::Pid => "pid",
            NamespaceKind::User => "user",
            NamespaceKind::Uts => "uts",
        }
    }

    /// Whether a container gets its own namespace of this kind when its
    /// manifest says nothing about it. User namespaces need id mappings the
    /// app has to opt into, so they are only created on request.
    pub fn isolated_by_default(&self) -> bool {
        !matches!(self, NamespaceKind::User)
    }
}

impl FromStr for NamespaceKind {
    type Err = IsolatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NamespaceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| IsolatorError::Invalid {
                name: LINUX_NAMESPACES_ISOLATOR.into(),
                reason: format!("unknown namespace kind '{s}'"),
            })
    }
}

impl Display for NamespaceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an app wants a namespace set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceMode {
    /// Share the host's view.
    Host,
    /// Create a new namespace for the container.
    Child,
}

/// Value of the `os/linux/namespaces` isolator. Kinds left out are unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxNamespaces {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipc: Option<NamespaceMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net: Option<NamespaceMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<NamespaceMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<NamespaceMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uts: Option<NamespaceMode>,
}

impl LinuxNamespaces {
    pub fn get(&self, kind: NamespaceKind) -> Option<NamespaceMode> {
        match kind {
            NamespaceKind::Ipc => self.ipc,
            NamespaceKind::Net => self.net,
            NamespaceKind::Pid => self.pid,
            NamespaceKind::User => self.user,
            NamespaceKind::Uts => self.uts,
        }
    }

    /// The kinds a container declaring these settings gets its own namespace
    /// for. Unset kinds are isolated if they are in `required` or isolated by
    /// default.
    pub fn isolated(&self, required: &[NamespaceKind]) -> Vec<NamespaceKind> {
        NamespaceKind::ALL
            .into_iter()
            .filter(|kind| match self.get(*kind) {
                Some(NamespaceMode::Host) => false,
                Some(NamespaceMode::Child) => true,
                None => kind.isolated_by_default() || required.contains(kind),
            })
            .collect()
    }
}

/// cgroup limits requested through the `resource/*` isolators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Hard memory limit in bytes.
    pub memory_max: Option<i64>,
    /// CPU limit in thousandths of a core.
    pub cpu_millis: Option<u64>,
}

impl ResourceLimits {
    pub fn is_empty(&self) -> bool {
        self.memory_max.is_none() && self.cpu_millis.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum Quantity {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct ResourceIsolatorValue {
    limit: Quantity,
}

pub(crate) fn memory_limit(isolator: &Isolator) -> Result<i64, IsolatorError> {
    let ResourceIsolatorValue { limit } = isolator.decode()?;
    let invalid = |reason: String| IsolatorError::Invalid {
        name: isolator.name.clone(),
        reason,
    };

    let bytes = match limit {
        Quantity::Number(n) if n >= 0.0 => n,
        Quantity::Number(n) => return Err(invalid(format!("negative limit {n}"))),
        Quantity::Text(text) => {
            const SUFFIXES: [(&str, f64); 8] = [
                ("Ki", 1024.0),
                ("Mi", 1024.0 * 1024.0),
                ("Gi", 1024.0 * 1024.0 * 1024.0),
                ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
                ("K", 1e3),
                ("M", 1e6),
                ("G", 1e9),
                ("T", 1e12),
            ];
            let (number, multiplier) = SUFFIXES
                .iter()
                .find_map(|(suffix, multiplier)| {
                    text.strip_suffix(suffix).map(|n| (n, *multiplier))
                })
                .unwrap_or((text.as_str(), 1.0));
            let number: f64 = number
                .parse()
                .map_err(|_| invalid(format!("cannot parse quantity '{text}'")))?;
            if number < 0.0 {
                return Err(invalid(format!("negative limit '{text}'")));
            }
            number * multiplier
        }
    };

    // Also catches NaN and infinities, which parse as valid floats.
    let bytes = bytes.round();
    if !(0.0..i64::MAX as f64).contains(&bytes) {
        return Err(invalid(format!("limit {bytes} is out of range")));
    }
    Ok(bytes as i64)
}

pub(crate) fn cpu_limit(isolator: &Isolator) -> Result<u64, IsolatorError> {
    let ResourceIsolatorValue { limit } = isolator.decode()?;
    let invalid = |reason: String| IsolatorError::Invalid {
        name: isolator.name.clone(),
        reason,
    };

    let millis = match limit {
        Quantity::Number(cores) if cores > 0.0 => cores * 1000.0,
        Quantity::Number(cores) => {
            return Err(invalid(format!("non positive limit {cores}")))
        }
        Quantity::Text(text) => {
            let millis = match text.strip_suffix('m') {
                Some(millis) => millis.parse::<f64>(),
                None => text.parse::<f64>().map(|cores| cores * 1000.0),
            }
            .map_err(|_| invalid(format!("cannot parse quantity '{text}'")))?;
            if millis <= 0.0 {
                return Err(invalid(format!("non positive limit '{text}'")));
            }
            millis
        }
    };

    let millis = millis.round();
    if !(1.0..u64::MAX as f64).contains(&millis) {
        return Err(invalid(format!("limit {millis}m is out of range")));
    }
    Ok(millis as u64)
}
