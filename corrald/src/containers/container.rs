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

use super::{ContainerId, ContainerState, ContainersError, Result};
use crate::network::NetworkInterface;
use crate::schema::{
    AcName, App, ImageHash, ImageManifest, NamespaceKind, PodManifest,
    ResourceLimits,
};
use nix::unistd::Pid;
use std::process::ExitStatus;
use tokio::sync::{watch, Mutex, MutexGuard, Notify};
use tracing::{info, warn, Span};

/// What the runtime sets up around the container process, worked out once
/// at admission from the app's isolators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationPlan {
    /// Kinds the process gets its own namespace for.
    pub namespaces: Vec<NamespaceKind>,
    pub limits: ResourceLimits,
    pub host_api_access: bool,
}

impl IsolationPlan {
    pub fn isolates(&self, kind: NamespaceKind) -> bool {
        self.namespaces.contains(&kind)
    }
}

/// A single app running in its own isolation context.
///
/// Identity and manifests are fixed at admission. Everything that changes
/// over the container's life sits behind one mutex.
#[derive(Debug)]
pub struct Container {
    id: ContainerId,
    name: AcName,
    pod: PodManifest,
    image: ImageManifest,
    image_hash: ImageHash,
    isolation: IsolationPlan,
    span: Span,
    inner: Mutex<ContainerInner>,
    state_tx: watch::Sender<ContainerState>,
    stop: Notify,
}

#[derive(Debug)]
pub(crate) struct ContainerInner {
    state: ContainerState,
    stop_requested: bool,
    pid: Option<Pid>,
    interfaces: Vec<NetworkInterface>,
    exit_status: Option<ExitStatus>,
    failure: Option<String>,
}

impl Container {
    pub(crate) fn new(
        id: ContainerId,
        name: AcName,
        pod: PodManifest,
        image: ImageManifest,
        image_hash: ImageHash,
        isolation: IsolationPlan,
    ) -> Self {
        let span = tracing::info_span!("container", container = %id, name = %name);
        let (state_tx, _) = watch::channel(ContainerState::Created);

        Self {
            id,
            name,
            pod,
            image,
            image_hash,
            isolation,
            span,
            inner: Mutex::new(ContainerInner {
                state: ContainerState::Created,
                stop_requested: false,
                pid: None,
                interfaces: vec![],
                exit_status: None,
                failure: None,
            }),
            state_tx,
            stop: Notify::new(),
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn name(&self) -> &AcName {
        &self.name
    }

    pub fn pod_manifest(&self) -> &PodManifest {
        &self.pod
    }

    pub fn image_manifest(&self) -> &ImageManifest {
        &self.image
    }

    pub fn image_hash(&self) -> &ImageHash {
        &self.image_hash
    }

    /// The app of the pod manifest. Admission guarantees there is one.
    pub fn app(&self) -> Option<&App> {
        self.pod.apps.first().and_then(|runtime_app| runtime_app.app.as_ref())
    }

    pub fn isolation(&self) -> &IsolationPlan {
        &self.isolation
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub async fn state(&self) -> ContainerState {
        self.inner.lock().await.state
    }

    pub async fn pid(&self) -> Option<Pid> {
        self.inner.lock().await.pid
    }

    pub async fn interfaces(&self) -> Vec<NetworkInterface> {
        self.inner.lock().await.interfaces.clone()
    }

    pub async fn exit_status(&self) -> Option<ExitStatus> {
        self.inner.lock().await.exit_status
    }

    /// Why the container ended in [ContainerState::Failed], if it did.
    pub async fn failure(&self) -> Option<String> {
        self.inner.lock().await.failure.clone()
    }

    /// Observe state changes as they happen.
    pub fn subscribe(&self) -> watch::Receiver<ContainerState> {
        self.state_tx.subscribe()
    }

    /// Resolves with the terminal state once the container has been torn
    /// down and deregistered.
    pub async fn wait(&self) -> ContainerState {
        let mut rx = self.state_tx.subscribe();
        if let Ok(state) = rx.wait_for(ContainerState::is_terminal).await {
            return *state;
        }
        let state = *rx.borrow();
        state
    }

    /// Resolves once startup has finished, successfully or not.
    pub async fn wait_for_running(&self) -> Result<()> {
        let mut rx = self.state_tx.subscribe();
        let started = |s: &ContainerState| {
            !matches!(s, ContainerState::Created | ContainerState::Starting)
        };
        let state = match rx.wait_for(started).await.map(|state| *state) {
            Ok(state) => state,
            Err(_) => *rx.borrow(),
        };

        if state == ContainerState::Failed {
            return Err(ContainersError::StartupFailed {
                id: self.id,
                reason: self
                    .failure()
                    .await
                    .unwrap_or_else(|| "unknown failure".into()),
            });
        }
        Ok(())
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ContainerInner> {
        self.inner.lock().await
    }

    pub(crate) async fn advance(&self, next: ContainerState) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.transition(&mut inner, next)
    }

    /// Moves to `next` with the container mutex already held.
    pub(crate) fn transition(
        &self,
        inner: &mut ContainerInner,
        next: ContainerState,
    ) -> Result<()> {
        if !inner.state.can_transition_to(next) {
            return Err(ContainersError::InvalidTransition {
                id: self.id,
                from: inner.state,
                to: next,
            });
        }

        self.span.in_scope(|| info!("{} -> {}", inner.state, next));
        inner.state = next;
        let _ = self.state_tx.send_replace(next);
        Ok(())
    }

    /// Moves into a terminal state, even one the state machine would not
    /// reach from where the container is.
    pub(crate) fn finish(
        &self,
        inner: &mut ContainerInner,
        terminal: ContainerState,
        failure: Option<String>,
    ) {
        if failure.is_some() {
            inner.failure = failure;
        }

        if self.transition(inner, terminal).is_err() {
            self.span.in_scope(|| {
                warn!("forcing {} -> {}", inner.state, terminal)
            });
            inner.state = terminal;
            let _ = self.state_tx.send_replace(terminal);
        }
    }

    /// Flags the container for removal and wakes its lifecycle task.
    pub(crate) fn request_stop(&self, inner: &mut ContainerInner) {
        if !inner.stop_requested {
            inner.stop_requested = true;
            self.stop.notify_one();
        }
    }

    pub(crate) async fn stop_requested(&self) -> bool {
        self.inner.lock().await.stop_requested
    }

    /// Resolves once [Container::request_stop] has been called, even if that
    /// happened before this was awaited.
    pub(crate) async fn stopped(&self) {
        self.stop.notified().await
    }

    pub(crate) async fn set_pid(&self, pid: Pid) {
        self.inner.lock().await.pid = Some(pid);
    }

    pub(crate) async fn set_interfaces(&self, interfaces: Vec<NetworkInterface>) {
        self.inner.lock().await.interfaces = interfaces;
    }

    pub(crate) async fn set_exit_status(&self, exit_status: ExitStatus) {
        self.inner.lock().await.exit_status = Some(exit_status);
    }
}

impl ContainerInner {
    pub(crate) fn state(&self) -> ContainerState {
        self.state
    }
}
