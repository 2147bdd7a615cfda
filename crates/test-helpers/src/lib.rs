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

// Lint groups: https://doc.rust-lang.org/rustc/lints/groups.html
#![warn(future_incompatible, nonstandard_style, unused)]
#![warn(missing_debug_implementations, unused_extern_crates, unused_results)]
#![warn(clippy::unwrap_used)]

//! Test macros shared by the corral crates.
//!
//! The skip helpers follow the ones nix keeps privately in its own test
//! suite: https://github.com/nix-rust/nix/blob/master/test/common/mod.rs

// Re-exported so the macros resolve `nix` from the caller's crate graph.
#[doc(hidden)]
pub use nix;

#[macro_export]
macro_rules! skip {
    ($($reason: expr),+) => {
        use ::std::io::{self, Write};

        let stderr = io::stderr();
        let mut handle = stderr.lock();
        let _ = writeln!(handle, $($reason),+);
        return;
    }
}

#[macro_export]
macro_rules! skip_if_not_root {
    ($name:expr) => {
        if !$crate::nix::unistd::Uid::current().is_root() {
            $crate::skip!("{} requires root privileges. Skipping test.", $name);
        }
    };
}

#[macro_export]
macro_rules! skip_if_seccomp {
    ($name:expr) => {
        if let Ok(s) = std::fs::read_to_string("/proc/self/status") {
            for l in s.lines() {
                let mut fields = l.split_whitespace();
                if fields.next() == Some("Seccomp:")
                    && fields.next() != Some("0")
                {
                    $crate::skip!(
                        "{} cannot be run in Seccomp mode.  Skipping test.",
                        stringify!($name)
                    );
                }
            }
        }
    };
}

/// Skips unless the host mounts the unified (v2) cgroup hierarchy.
#[macro_export]
macro_rules! skip_if_no_cgroup_v2 {
    ($name:expr) => {
        if !::std::path::Path::new("/sys/fs/cgroup/cgroup.controllers").exists() {
            $crate::skip!("{} requires cgroup v2. Skipping test.", $name);
        }
    };
}

/// Polls `$left` until it equals `$right`, panicking once `$timeout` elapses.
/// Must be used from an async context driven by tokio.
#[macro_export]
macro_rules! assert_eventually_eq {
    ($left: expr, $right: expr $(,)?) => {
        $crate::assert_eventually_eq!(
            $left,
            $right,
            ::std::time::Duration::from_secs(2),
            ::std::time::Duration::from_millis(10)
        );
    };
    ($left: expr, $right: expr, $timeout: expr $(,)?) => {
        $crate::assert_eventually_eq!(
            $left,
            $right,
            $timeout,
            ::std::time::Duration::from_millis(10)
        );
    };
    ($left: expr, $right: expr, $timeout: expr, $poll_interval: expr $(,)?) => {
        let start = ::std::time::Instant::now();
        let timeout = $timeout;
        let poll_interval = $poll_interval;
        loop {
            let left = $left;
            let right = $right;
            if left == right {
                break;
            }
            if start.elapsed() > timeout {
                ::core::panic!(
                    "assertion failed: `(left == right)`\nleft: {:#?}\nright: {:#?}",
                    left,
                    right
                );
            }
            ::tokio::time::sleep(poll_interval).await;
        }
    };
}
