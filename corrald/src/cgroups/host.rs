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

use super::{check_segment, CgroupHandle, CgroupHierarchy, CgroupsError, Result};
use crate::schema::ResourceLimits;
use libcgroups::common::{
    get_cgroup_setup, CgroupManager, CgroupSetup, ControllerOpt,
    DEFAULT_CGROUP_ROOT,
};
use libcgroups::v2;
use nix::unistd::Pid;
use oci_spec::runtime::{
    LinuxCpuBuilder, LinuxMemoryBuilder, LinuxResources, LinuxResourcesBuilder,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, trace};

/// CPU bandwidth period, in microseconds, that quotas are expressed against.
const CPU_PERIOD: u64 = 100_000;

/// The host's cgroup v2 hierarchy mounted at `/sys/fs/cgroup`.
#[derive(Debug, Clone)]
pub struct HostCgroups {
    root: PathBuf,
}

impl HostCgroups {
    pub fn new() -> Self {
        Self { root: DEFAULT_CGROUP_ROOT.into() }
    }
}

impl Default for HostCgroups {
    fn default() -> Self {
        Self::new()
    }
}

impl CgroupHierarchy for HostCgroups {
    fn check_supported(&self) -> Result<()> {
        let setup = get_cgroup_setup()
            .map_err(|e| CgroupsError::DetectSetup { source: e.into() })?;

        // The hybrid and legacy layouts are not supported. Only the unified
        // hierarchy can delegate controllers to a subtree we own.
        match setup {
            CgroupSetup::Unified => Ok(()),
            other => Err(CgroupsError::UnsupportedSetup {
                setup: format!("{other:?}"),
            }),
        }
    }

    fn create_parent(&self, name: &str) -> Result<Arc<dyn CgroupHandle>> {
        check_segment(name)?;
        let path = PathBuf::from(name);
        let full_path = self.root.join(&path);

        // An existing directory is a parent left over from a previous boot,
        // which we attach to.
        std::fs::create_dir_all(&full_path).map_err(|e| {
            CgroupsError::CreateCgroup { path: path.clone(), source: e.into() }
        })?;
        info!("Using parent cgroup {}", full_path.display());

        Ok(Arc::new(HostCgroup {
            root: self.root.clone(),
            path,
            limits: ResourceLimits::default(),
        }))
    }
}

#[derive(Debug)]
struct HostCgroup {
    root: PathBuf,
    path: PathBuf,
    limits: ResourceLimits,
}

impl HostCgroup {
    fn manager(&self) -> Result<v2::manager::Manager> {
        v2::manager::Manager::new(self.root.clone(), self.path.clone()).map_err(
            |e| CgroupsError::CreateCgroup {
                path: self.path.clone(),
                source: e.into(),
            },
        )
    }

    fn resources(&self) -> Result<LinuxResources> {
        let apply_error = |e: oci_spec::OciSpecError| {
            CgroupsError::ApplyLimits { path: self.path.clone(), source: e.into() }
        };

        let mut builder = LinuxResourcesBuilder::default();

        if let Some(millis) = self.limits.cpu_millis {
            let quota = millis
                .checked_mul(CPU_PERIOD / 1000)
                .and_then(|quota| i64::try_from(quota).ok())
                .ok_or_else(|| CgroupsError::ApplyLimits {
                    path: self.path.clone(),
                    source: anyhow::anyhow!(
                        "cpu limit of {millis}m overflows the quota"
                    ),
                })?;
            let cpu = LinuxCpuBuilder::default()
                .quota(quota)
                .period(CPU_PERIOD)
                .build()
                .map_err(apply_error)?;
            builder = builder.cpu(cpu);
        }

        if let Some(limit) = self.limits.memory_max {
            let memory = LinuxMemoryBuilder::default()
                .limit(limit)
                .build()
                .map_err(apply_error)?;
            builder = builder.memory(memory);
        }

        builder.build().map_err(apply_error)
    }
}

impl CgroupHandle for HostCgroup {
    fn path(&self) -> &Path {
        &self.path
    }

    fn create_child(
        &self,
        name: &str,
        limits: &ResourceLimits,
    ) -> Result<Arc<dyn CgroupHandle>> {
        check_segment(name)?;

        // Nothing is written to the hierarchy yet. libcgroups only creates
        // the cgroup when the first task is added.
        let child = HostCgroup {
            root: self.root.clone(),
            path: self.path.join(name),
            limits: *limits,
        };
        let _ = child.manager()?;

        Ok(Arc::new(child))
    }

    fn add_task(&self, pid: Pid) -> Result<()> {
        let manager = self.manager()?;

        manager.add_task(pid).map_err(|e| CgroupsError::AddTaskToCgroup {
            path: self.path.clone(),
            pid,
            source: e.into(),
        })?;
        trace!("Added pid {pid} to cgroup {}", self.path.display());

        if self.limits.is_empty() {
            return Ok(());
        }

        let resources = self.resources()?;
        let options = ControllerOpt {
            resources: &resources,
            disable_oom_killer: false,
            oom_score_adj: None,
            freezer_state: None,
        };

        manager.apply(&options).map_err(|e| CgroupsError::ApplyLimits {
            path: self.path.clone(),
            source: e.into(),
        })
    }

    fn remove(&self) -> Result<()> {
        // A cgroup that never received a task was never created.
        if !self.root.join(&self.path).exists() {
            return Ok(());
        }

        self.manager()?.remove().map_err(|e| CgroupsError::DeleteCgroup {
            path: self.path.clone(),
            source: e.into(),
        })
    }
}
