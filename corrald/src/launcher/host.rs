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
    ContainerProcess, LaunchError, LaunchSpec, ProcessLauncher, Result,
    VolumeMount, HOST_SOCKET_ENV,
};
use crate::schema::NamespaceKind;
use clone3::Clone3;
use libc::SIGCHLD;
use nix::mount::{mount, MsFlags};
use nix::fcntl::OFlag;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{pipe2, Pid};
use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command, ExitStatus};
use tokio::sync::watch;
use tracing::{info, trace, warn};

/// Raw wait status, or the errno `waitpid` failed with.
type Reaped = Option<std::result::Result<i32, i32>>;

/// Starts container processes on this host with `clone3`.
#[derive(Debug, Clone, Default)]
pub struct HostLauncher;

impl HostLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ProcessLauncher for HostLauncher {
    async fn launch(&self, spec: LaunchSpec) -> Result<Box<dyn ContainerProcess>> {
        let command = command(&spec)?;

        // vfork suspends the calling thread until the child execs, so keep it
        // off the runtime's worker threads. The handle is built on the same
        // thread so a cancelled launch still kills and reaps the child.
        let process = tokio::task::spawn_blocking(move || {
            let pid = clone_process(spec, command)?;

            let (tx, rx) = watch::channel(None);
            let _ = tokio::task::spawn_blocking(move || {
                let _ = tx.send(Some(wait_blocking(pid)));
            });

            Ok::<_, LaunchError>(HostProcess { pid, reaped: rx })
        })
        .await
        .map_err(|e| LaunchError::Clone {
            source: io::Error::new(ErrorKind::Other, e),
        })??;

        Ok(Box::new(process))
    }
}

fn command(spec: &LaunchSpec) -> Result<Command> {
    let Some((program, args)) = spec.exec.split_first() else {
        return Err(LaunchError::InvalidSpec {
            reason: format!("container {} has nothing to exec", spec.container_id),
        });
    };

    let mut command = Command::new(program);
    let _ = command.args(args).env_clear().envs(spec.environment.iter().cloned());

    if let Some(host_socket) = &spec.host_socket {
        let _ = command.env(HOST_SOCKET_ENV, host_socket);
    }
    if let Some(working_directory) = &spec.working_directory {
        let _ = command.current_dir(working_directory);
    }
    if let Some(group) = spec.group {
        let _ = command.gid(group);
    }
    if let Some(user) = spec.user {
        let _ = command.uid(user);
    }

    Ok(command)
}

fn clone_process(spec: LaunchSpec, mut command: Command) -> Result<Pid> {
    // *****************************************************************
    // Clone docs: https://man7.org/linux/man-pages/man2/clone.2.html
    // *****************************************************************
    let mut clone = Clone3::default();

    // Freeze the parent until the child calls execvp
    let _ = clone.flag_vfork();
    let _ = clone.exit_signal(SIGCHLD as u64);

    // Always unshare the cgroup namespace
    let _ = clone.flag_newcgroup();

    let new_mount_namespace =
        spec.isolates(NamespaceKind::Pid) || !spec.mounts.is_empty();
    if new_mount_namespace {
        let _ = clone.flag_newns();
    }
    for kind in &spec.namespaces {
        match kind {
            NamespaceKind::Ipc => {
                let _ = clone.flag_newipc();
            }
            NamespaceKind::Net => {
                let _ = clone.flag_newnet();
            }
            NamespaceKind::Pid => {
                let _ = clone.flag_newpid();
            }
            NamespaceKind::User => {
                let _ = clone.flag_newuser();
            }
            NamespaceKind::Uts => {
                let _ = clone.flag_newuts();
            }
        }
    }

    let mount_proc = spec.isolates(NamespaceKind::Pid);
    let hostname =
        spec.isolates(NamespaceKind::Uts).then(|| spec.hostname.clone());
    let mounts = spec.mounts.clone();
    unsafe {
        let _ = command.pre_exec(move || {
            if new_mount_namespace {
                isolate_mounts(mount_proc, &mounts)?;
            }
            if let Some(hostname) = &hostname {
                nix::unistd::sethostname(hostname)?;
            }
            Ok(())
        });
    }

    // Exec failures travel back over this pipe. A successful exec closes
    // the child's end, so the parent reads nothing.
    let (exec_errors, exec_error_tx) = exec_error_pipe()?;
    let report_fd = exec_error_tx.as_raw_fd();

    match unsafe { clone.call() }
        .map_err(|e| LaunchError::Clone { source: io::Error::from_raw_os_error(e.0) })?
    {
        0 => {
            // child: nothing but exec from here on, the parent's memory is
            // shared until then.
            let errno = command
                .exec()
                .raw_os_error()
                .unwrap_or(libc::EINVAL)
                .to_ne_bytes();
            unsafe {
                let _ = libc::write(report_fd, errno.as_ptr().cast(), errno.len());
                libc::_exit(127)
            }
        }
        pid => {
            let pid = Pid::from_raw(pid);
            drop(exec_error_tx);

            if let Some(errno) = read_exec_error(exec_errors) {
                // The child has already exited, collect it.
                let _ = wait_blocking(pid);
                return Err(LaunchError::Exec {
                    program: spec.exec.first().cloned().unwrap_or_default(),
                    source: io::Error::from_raw_os_error(errno),
                });
            }

            info!("Container {} running with host pid {pid}", spec.container_id);
            Ok(pid)
        }
    }
}

fn exec_error_pipe() -> Result<(File, OwnedFd)> {
    let (read, write) = pipe2(OFlag::O_CLOEXEC)
        .map_err(|e| LaunchError::Clone { source: e.into() })?;
    // SAFETY: both descriptors were just created and are owned by nobody else.
    unsafe { Ok((File::from_raw_fd(read), OwnedFd::from_raw_fd(write))) }
}

/// The errno the child reported, if its exec failed.
fn read_exec_error(mut exec_errors: File) -> Option<i32> {
    let mut buf = Vec::with_capacity(4);
    if let Err(e) = exec_errors.read_to_end(&mut buf) {
        warn!("Failed to read exec status: {e}");
        return None;
    }

    let errno: [u8; 4] = buf.get(..4)?.try_into().ok()?;
    Some(i32::from_ne_bytes(errno))
}

/// Runs in the child between clone and exec.
fn isolate_mounts(mount_proc: bool, mounts: &[VolumeMount]) -> io::Result<()> {
    // Keep everything below from propagating back to the host.
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )?;

    if mount_proc {
        mount(
            Some("proc"),
            "/proc",
            Some("proc"),
            MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
            None::<&str>,
        )?;
    }

    for VolumeMount { source, target, read_only } in mounts {
        mount(
            Some(source),
            target,
            None::<&str>,
            MsFlags::MS_BIND | MsFlags::MS_REC,
            None::<&str>,
        )?;

        // Read only only sticks on a remount of the bind.
        if *read_only {
            mount(
                None::<&str>,
                target,
                None::<&str>,
                MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
                None::<&str>,
            )?;
        }
    }

    Ok(())
}

fn wait_blocking(pid: Pid) -> std::result::Result<i32, i32> {
    let mut status = 0;
    loop {
        let res = unsafe { libc::waitpid(pid.as_raw(), &mut status, 0) };
        if res == -1 {
            let err = io::Error::last_os_error();
            match err.kind() {
                ErrorKind::Interrupted => continue,
                _ => return Err(err.raw_os_error().unwrap_or(libc::ECHILD)),
            }
        }

        trace!("Pid {pid} exited with status {status}");
        return Ok(status);
    }
}

#[derive(Debug)]
struct HostProcess {
    pid: Pid,
    reaped: watch::Receiver<Reaped>,
}

impl HostProcess {
    fn has_exited(&self) -> bool {
        self.reaped.borrow().is_some()
    }
}

#[async_trait::async_trait]
impl ContainerProcess for HostProcess {
    fn pid(&self) -> Pid {
        self.pid
    }

    async fn wait(&mut self) -> Result<ExitStatus> {
        let pid = self.pid;
        let reaped = self
            .reaped
            .wait_for(Option::is_some)
            .await
            .map(|reaped| *reaped)
            .map_err(|_| LaunchError::Wait {
                pid,
                source: io::Error::new(ErrorKind::Other, "reaper task exited"),
            })?;

        match reaped {
            Some(Ok(status)) => Ok(ExitStatus::from_raw(status)),
            Some(Err(errno)) => Err(LaunchError::Wait {
                pid,
                source: io::Error::from_raw_os_error(errno),
            }),
            None => Err(LaunchError::Wait {
                pid,
                source: io::Error::new(ErrorKind::Other, "no exit status"),
            }),
        }
    }

    fn signal(&self, signal: Signal) -> Result<()> {
        // Never signal a pid that may already have been reused.
        if self.has_exited() {
            return Ok(());
        }

        kill(self.pid, signal)
            .map_err(|e| LaunchError::Signal { pid: self.pid, source: e })
    }
}

impl Drop for HostProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            if let Err(e) = kill(self.pid, Signal::SIGKILL) {
                warn!("Failed to kill orphaned pid {}: {e}", self.pid);
            }
        }
    }
}
