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

//! The task driving a container from admission to deregistration.

use super::{
    manager::ManagerOptions, registry::Registry, volumes::Volumes, Container,
    ContainerState, ContainersError, Result,
};
use crate::cgroups::CgroupHandle;
use crate::launcher::{
    parse_id, ContainerProcess, LaunchError, LaunchSpec, ProcessLauncher,
    VolumeMount,
};
use crate::network::{InterfaceRequest, NetworkManager};
use crate::schema::NamespaceKind;
use nix::sys::signal::Signal;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn, Instrument};

/// Everything startup has set up so far, so teardown knows what to undo
/// even when startup was cut short.
#[derive(Default)]
struct Acquired {
    directory: Option<PathBuf>,
    cgroup: Option<Arc<dyn CgroupHandle>>,
    attached: bool,
    process: Option<Box<dyn ContainerProcess>>,
}

enum Event {
    Exited(crate::launcher::Result<ExitStatus>),
    StopRequested,
}

pub(crate) struct Lifecycle {
    pub container: Arc<Container>,
    pub registry: Arc<Registry>,
    pub options: Arc<ManagerOptions>,
    pub parent_cgroup: Arc<dyn CgroupHandle>,
    pub network: Arc<dyn NetworkManager>,
    pub launcher: Arc<dyn ProcessLauncher>,
    pub volumes: Arc<Volumes>,
    pub host_socket: Option<PathBuf>,
}

impl Lifecycle {
    pub fn spawn(self) -> JoinHandle<()> {
        let span = self.container.span().clone();
        tokio::spawn(self.run().instrument(span))
    }

    async fn run(self) {
        let mut acquired = Acquired::default();

        // A removal while starting abandons startup.
        let started = tokio::select! {
            started = self.start_within_timeout(&mut acquired) => Some(started),
            _ = self.container.stopped() => None,
        };

        let (terminal, failure) = match started {
            Some(Ok(())) => self.supervise(&mut acquired).await,
            Some(Err(e)) => {
                error!("Failed to start: {e}");
                let reason = match e {
                    ContainersError::StartupFailed { reason, .. } => reason,
                    e => e.to_string(),
                };
                (ContainerState::Failed, Some(reason))
            }
            None => {
                info!("Removed while starting");
                if let Err(e) = self.container.advance(ContainerState::Stopping).await {
                    warn!("{e}");
                }
                (ContainerState::Removed, None)
            }
        };

        self.teardown(acquired).await;
        self.registry.deregister(&self.container, terminal, failure).await;
    }

    async fn start_within_timeout(&self, acquired: &mut Acquired) -> Result<()> {
        let Some(timeout) = self.options.startup_timeout else {
            return self.start(acquired).await;
        };

        match tokio::time::timeout(timeout, self.start(acquired)).await {
            Ok(started) => started,
            Err(_) => Err(self.startup_failed(format!(
                "startup did not complete within {timeout:?}"
            ))),
        }
    }

    fn startup_failed(&self, reason: impl Into<String>) -> ContainersError {
        ContainersError::StartupFailed {
            id: self.container.id(),
            reason: reason.into(),
        }
    }

    async fn start(&self, acquired: &mut Acquired) -> Result<()> {
        let container = &self.container;
        let id = container.id();
        let app = container.app().ok_or(ContainersError::MissingApp)?;
        let isolation = container.isolation();

        let directory = self.options.container_directory.join(id.to_string());
        tokio::fs::create_dir_all(&directory).await.map_err(|e| {
            ContainersError::Io { path: directory.clone(), source: e }
        })?;
        acquired.directory = Some(directory);

        let cgroup = self
            .parent_cgroup
            .create_child(&id.to_string(), &isolation.limits)
            .map_err(|e| self.startup_failed(e.to_string()))?;
        acquired.cgroup = Some(Arc::clone(&cgroup));

        let mut mounts = Vec::with_capacity(app.mount_points.len());
        for mount_point in &app.mount_points {
            mounts.push(VolumeMount {
                source: self.volumes.path(mount_point.name.as_str()).await?,
                target: PathBuf::from(&mount_point.path),
                read_only: mount_point.read_only,
            });
        }

        let spec = LaunchSpec {
            container_id: id,
            hostname: container.name().to_string(),
            exec: app.exec.clone(),
            environment: app
                .environment
                .iter()
                .map(|env| (env.name.clone(), env.value.clone()))
                .collect(),
            working_directory: app.working_directory.as_ref().map(PathBuf::from),
            namespaces: isolation.namespaces.clone(),
            mounts,
            host_socket: if isolation.host_api_access {
                self.host_socket.clone()
            } else {
                None
            },
            user: parse_id(&app.user, "user").map_err(launch_failed(id))?,
            group: parse_id(&app.group, "group").map_err(launch_failed(id))?,
        };

        let process =
            self.launcher.launch(spec).await.map_err(launch_failed(id))?;
        let pid = process.pid();
        acquired.process = Some(process);
        container.set_pid(pid).await;

        cgroup
            .add_task(pid)
            .map_err(|e| self.startup_failed(e.to_string()))?;

        // The network namespace only exists once the process does.
        if isolation.isolates(NamespaceKind::Net) {
            acquired.attached = true;
            let interfaces = self
                .network
                .attach(container, &[InterfaceRequest::default()])
                .await
                .map_err(|e| self.startup_failed(e.to_string()))?;
            container.set_interfaces(interfaces).await;
        }

        container.advance(ContainerState::Running).await
    }

    async fn supervise(
        &self,
        acquired: &mut Acquired,
    ) -> (ContainerState, Option<String>) {
        let container = &self.container;
        let Some(process) = acquired.process.as_mut() else {
            return (ContainerState::Failed, Some("no process to supervise".into()));
        };

        let event = tokio::select! {
            status = process.wait() => Event::Exited(status),
            _ = container.stopped() => Event::StopRequested,
        };

        match event {
            Event::Exited(Ok(status)) => {
                info!("Process exited with {status}");
                container.set_exit_status(status).await;
                if let Err(e) = container.advance(ContainerState::Stopping).await {
                    warn!("{e}");
                }

                // Removal may have raced the exit.
                if container.stop_requested().await {
                    (ContainerState::Removed, None)
                } else {
                    (ContainerState::Stopped, None)
                }
            }
            Event::Exited(Err(e)) => {
                error!("Lost track of process: {e}");
                (ContainerState::Failed, Some(e.to_string()))
            }
            Event::StopRequested => {
                if let Err(e) = container.advance(ContainerState::Stopping).await {
                    warn!("{e}");
                }
                if let Some(status) = self.stop(process).await {
                    container.set_exit_status(status).await;
                }
                (ContainerState::Removed, None)
            }
        }
    }

    /// SIGTERM, then SIGKILL once the stop timeout has passed.
    async fn stop(
        &self,
        process: &mut Box<dyn ContainerProcess>,
    ) -> Option<ExitStatus> {
        if let Err(e) = process.signal(Signal::SIGTERM) {
            warn!("{e}");
        }

        match tokio::time::timeout(self.options.stop_timeout, process.wait()).await
        {
            Ok(Ok(status)) => return Some(status),
            Ok(Err(e)) => {
                error!("{e}");
                return None;
            }
            Err(_) => warn!(
                "Process did not stop within {:?}, killing it",
                self.options.stop_timeout
            ),
        }

        if let Err(e) = process.signal(Signal::SIGKILL) {
            warn!("{e}");
        }
        match process.wait().await {
            Ok(status) => Some(status),
            Err(e) => {
                error!("{e}");
                None
            }
        }
    }

    /// Undoes whatever startup managed to set up. Errors are logged only.
    async fn teardown(&self, acquired: Acquired) {
        let Acquired { directory, cgroup, attached, process } = acquired;

        if let Some(mut process) = process {
            // Startup may have failed after the launch.
            if let Err(e) = process.signal(Signal::SIGKILL) {
                warn!("{e}");
            }
            match tokio::time::timeout(self.options.stop_timeout, process.wait())
                .await
            {
                Ok(Ok(status)) => trace!("Process reaped with {status}"),
                Ok(Err(e)) => error!("Failed to reap process: {e}"),
                Err(_) => warn!(
                    "Process was not reaped within {:?}",
                    self.options.stop_timeout
                ),
            }
        }

        if attached {
            if let Err(e) = self.network.detach(&self.container).await {
                error!("Failed to detach network: {e}");
            }
        }

        if let Some(cgroup) = cgroup {
            if let Err(e) = cgroup.remove() {
                error!("Failed to remove cgroup: {e}");
            }
        }

        if let Some(directory) = directory {
            if let Err(e) = tokio::fs::remove_dir_all(&directory).await {
                error!("Failed to remove {}: {e}", directory.display());
            }
        }
    }
}

fn launch_failed(
    id: super::ContainerId,
) -> impl Fn(LaunchError) -> ContainersError {
    move |e| ContainersError::StartupFailed { id, reason: e.to_string() }
}
