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

//! In-memory stand-ins for the host capabilities so the manager can be
//! driven without root, cgroups or namespaces.

#![allow(dead_code)]

use corrald::cgroups::{CgroupHandle, CgroupHierarchy, CgroupsError};
use corrald::containers::{Container, ContainerManager, ManagerOptions};
use corrald::images::{ImageError, ImageManager};
use corrald::launcher::{ContainerProcess, LaunchError, LaunchSpec, ProcessLauncher};
use corrald::network::{InterfaceRequest, NetworkError, NetworkInterface, NetworkManager};
use corrald::schema::{
    AcIdentifier, App, ImageHash, ImageManifest, Isolator, ResourceLimits,
};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

pub const IMAGE_HASH: &str = "sha512-4f2c9a7b1e";

pub fn manifest(name: &str, isolators: Vec<Isolator>) -> ImageManifest {
    ImageManifest::new(
        AcIdentifier::try_from(name.to_string()).expect("valid image name"),
        Some(App {
            exec: vec!["/bin/app".into()],
            isolators,
            ..Default::default()
        }),
    )
}

pub fn namespaces(value: serde_json::Value) -> Isolator {
    Isolator { name: "os/linux/namespaces".into(), value }
}

// ---------------------------------------------------------------- cgroups --

#[derive(Debug, Default)]
pub struct CgroupJournal {
    pub parents: Vec<String>,
    pub children: Vec<(PathBuf, ResourceLimits)>,
    pub tasks: Vec<(PathBuf, Pid)>,
    pub removed: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeCgroups {
    pub unsupported: bool,
    pub fail_parent: bool,
    pub fail_add_task: bool,
    pub journal: Arc<Mutex<CgroupJournal>>,
}

impl FakeCgroups {
    pub fn journal(&self) -> std::sync::MutexGuard<'_, CgroupJournal> {
        self.journal.lock().expect("cgroup journal")
    }
}

impl CgroupHierarchy for FakeCgroups {
    fn check_supported(&self) -> corrald::cgroups::Result<()> {
        if self.unsupported {
            return Err(CgroupsError::UnsupportedSetup { setup: "Legacy".into() });
        }
        Ok(())
    }

    fn create_parent(
        &self,
        name: &str,
    ) -> corrald::cgroups::Result<Arc<dyn CgroupHandle>> {
        if self.fail_parent {
            return Err(CgroupsError::CreateCgroup {
                path: name.into(),
                source: anyhow::anyhow!("permission denied"),
            });
        }
        self.journal().parents.push(name.to_string());
        Ok(Arc::new(FakeCgroup { path: name.into(), cgroups: self.clone() }))
    }
}

#[derive(Debug)]
struct FakeCgroup {
    path: PathBuf,
    cgroups: FakeCgroups,
}

impl CgroupHandle for FakeCgroup {
    fn path(&self) -> &Path {
        &self.path
    }

    fn create_child(
        &self,
        name: &str,
        limits: &ResourceLimits,
    ) -> corrald::cgroups::Result<Arc<dyn CgroupHandle>> {
        let path = self.path.join(name);
        self.cgroups.journal().children.push((path.clone(), *limits));
        Ok(Arc::new(FakeCgroup { path, cgroups: self.cgroups.clone() }))
    }

    fn add_task(&self, pid: Pid) -> corrald::cgroups::Result<()> {
        if self.cgroups.fail_add_task {
            return Err(CgroupsError::AddTaskToCgroup {
                path: self.path.clone(),
                pid,
                source: anyhow::anyhow!("no such process"),
            });
        }
        self.cgroups.journal().tasks.push((self.path.clone(), pid));
        Ok(())
    }

    fn remove(&self) -> corrald::cgroups::Result<()> {
        self.cgroups.journal().removed.push(self.path.clone());
        Ok(())
    }
}

// ----------------------------------------------------------------- images --

#[derive(Debug, Default)]
pub struct FakeImageManager {
    pub images: HashMap<ImageHash, ImageManifest>,
}

impl FakeImageManager {
    pub fn with_image(image_hash: &str, manifest: ImageManifest) -> Self {
        let mut images = HashMap::new();
        let _ = images.insert(
            ImageHash::try_from(image_hash.to_string()).expect("valid hash"),
            manifest,
        );
        Self { images }
    }
}

#[async_trait::async_trait]
impl ImageManager for FakeImageManager {
    async fn resolve_or_fetch(
        &self,
        reference: &str,
    ) -> corrald::images::Result<(ImageManifest, ImageHash)> {
        self.images
            .iter()
            .find(|(hash, manifest)| {
                hash.as_str() == reference || manifest.name.as_str() == reference
            })
            .map(|(hash, manifest)| (manifest.clone(), hash.clone()))
            .ok_or_else(|| ImageError::FetchUnsupported {
                reference: reference.to_string(),
            })
    }

    async fn get(
        &self,
        image_hash: &ImageHash,
    ) -> corrald::images::Result<ImageManifest> {
        self.images.get(image_hash).cloned().ok_or_else(|| {
            ImageError::NotFound { reference: image_hash.to_string() }
        })
    }

    async fn list(
        &self,
    ) -> corrald::images::Result<Vec<(ImageHash, ImageManifest)>> {
        Ok(self.images.iter().map(|(h, m)| (h.clone(), m.clone())).collect())
    }

    async fn delete(&self, image_hash: &ImageHash) -> corrald::images::Result<()> {
        Err(ImageError::NotFound { reference: image_hash.to_string() })
    }
}

// ---------------------------------------------------------------- network --

#[derive(Debug, Clone, Default)]
pub struct FakeNetworkManager {
    pub fail_attach: bool,
    pub attached: Arc<Mutex<Vec<String>>>,
    pub detached: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl NetworkManager for FakeNetworkManager {
    async fn attach(
        &self,
        container: &Container,
        requested: &[InterfaceRequest],
    ) -> corrald::network::Result<Vec<NetworkInterface>> {
        if self.fail_attach {
            return Err(NetworkError::AttachFailed {
                container: container.id().to_string(),
                reason: "no addresses left".into(),
            });
        }
        self.attached.lock().expect("attached").push(container.id().to_string());
        Ok(requested
            .iter()
            .enumerate()
            .map(|(i, _)| NetworkInterface {
                name: format!("veth{i}"),
                addresses: vec!["10.0.0.2/24".parse().expect("valid network")],
            })
            .collect())
    }

    async fn detach(&self, container: &Container) -> corrald::network::Result<()> {
        self.detached.lock().expect("detached").push(container.id().to_string());
        Ok(())
    }
}

// --------------------------------------------------------------- launcher --

/// How launched processes behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Runs until signalled.
    Run,
    /// Exits right away with the given code.
    Exit(i32),
    /// Keeps running through SIGTERM and only dies on SIGKILL.
    IgnoreTerm,
    /// The launch itself fails.
    FailLaunch,
    /// The launch never completes.
    Hang,
    /// Starts, but waiting on it always fails.
    LoseTrack,
}

#[derive(Debug, Clone)]
pub struct FakeLauncher {
    pub behavior: Behavior,
    pub launched: Arc<Mutex<Vec<LaunchSpec>>>,
    pub signals: Arc<Mutex<Vec<(Pid, Signal)>>>,
    next_pid: Arc<AtomicI32>,
}

impl FakeLauncher {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            launched: Default::default(),
            signals: Default::default(),
            next_pid: Arc::new(AtomicI32::new(1000)),
        }
    }

    pub fn launched(&self) -> Vec<LaunchSpec> {
        self.launched.lock().expect("launched").clone()
    }

    pub fn signals(&self) -> Vec<(Pid, Signal)> {
        self.signals.lock().expect("signals").clone()
    }
}

#[async_trait::async_trait]
impl ProcessLauncher for FakeLauncher {
    async fn launch(
        &self,
        spec: LaunchSpec,
    ) -> corrald::launcher::Result<Box<dyn ContainerProcess>> {
        match self.behavior {
            Behavior::FailLaunch => {
                return Err(LaunchError::InvalidSpec {
                    reason: "exec format error".into(),
                })
            }
            Behavior::Hang => std::future::pending::<()>().await,
            _ => {}
        }

        self.launched.lock().expect("launched").push(spec);
        let pid = Pid::from_raw(self.next_pid.fetch_add(1, Ordering::SeqCst));

        let initial = match self.behavior {
            Behavior::Exit(code) => Some(ExitStatus::from_raw(code << 8)),
            _ => None,
        };
        let (exit, _) = watch::channel(initial);

        Ok(Box::new(FakeProcess {
            pid,
            ignore_term: self.behavior == Behavior::IgnoreTerm,
            lose_track: self.behavior == Behavior::LoseTrack,
            exit,
            signals: Arc::clone(&self.signals),
        }))
    }
}

#[derive(Debug)]
struct FakeProcess {
    pid: Pid,
    ignore_term: bool,
    lose_track: bool,
    exit: watch::Sender<Option<ExitStatus>>,
    signals: Arc<Mutex<Vec<(Pid, Signal)>>>,
}

#[async_trait::async_trait]
impl ContainerProcess for FakeProcess {
    fn pid(&self) -> Pid {
        self.pid
    }

    async fn wait(&mut self) -> corrald::launcher::Result<ExitStatus> {
        if self.lose_track {
            return Err(LaunchError::Wait {
                pid: self.pid,
                source: std::io::Error::from_raw_os_error(libc::ECHILD),
            });
        }

        let mut rx = self.exit.subscribe();
        let status = rx
            .wait_for(Option::is_some)
            .await
            .map(|status| *status)
            .expect("sender alive");
        Ok(status.expect("exit status"))
    }

    fn signal(&self, signal: Signal) -> corrald::launcher::Result<()> {
        if self.exit.borrow().is_some() {
            return Ok(());
        }
        self.signals.lock().expect("signals").push((self.pid, signal));

        if signal == Signal::SIGKILL || !self.ignore_term {
            let _ = self.exit.send_replace(Some(ExitStatus::from_raw(signal as i32)));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------- harness --

pub struct Harness {
    pub manager: ContainerManager,
    pub cgroups: FakeCgroups,
    pub network: FakeNetworkManager,
    pub launcher: FakeLauncher,
    pub root: PathBuf,
}

impl Harness {
    pub fn options(root: &Path) -> ManagerOptions {
        ManagerOptions {
            container_directory: root.join("containers"),
            volume_directory: root.join("volumes"),
            startup_timeout: Some(Duration::from_secs(5)),
            stop_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    pub fn root() -> PathBuf {
        let root =
            std::env::temp_dir().join(format!("corral-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join("containers")).expect("mkdir containers");
        std::fs::create_dir_all(root.join("volumes")).expect("mkdir volumes");
        root
    }

    pub fn new(behavior: Behavior) -> Self {
        let root = Self::root();
        Self::with_options(behavior, Self::options(&root), root)
    }

    pub fn with_options(
        behavior: Behavior,
        options: ManagerOptions,
        root: PathBuf,
    ) -> Self {
        let cgroups = FakeCgroups::default();
        let network = FakeNetworkManager::default();
        let launcher = FakeLauncher::new(behavior);
        let images = FakeImageManager::with_image(
            IMAGE_HASH,
            manifest("example.com/app", vec![]),
        );

        let manager = ContainerManager::with_capabilities(
            Arc::new(images),
            Arc::new(network.clone()),
            &cgroups,
            Arc::new(launcher.clone()),
            options,
        )
        .expect("manager");

        Self { manager, cgroups, network, launcher, root }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}
