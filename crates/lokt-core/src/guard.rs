//! Guard Supervisor — §4.7, §9.
//!
//! The heartbeat task, the child-wait task, and the signal handler form a
//! small cooperative mesh around a shared `CancellationToken` and a
//! release-once guard, following the teacher's `atm-daemon/src/main.rs`
//! pattern (`CancellationToken` + `tokio::select!` over `ctrl_c()`/SIGTERM).
//! Unlike the teacher's long-running daemon event loop, this mesh tears
//! itself down the moment the child exits or a signal arrives — a guard
//! invocation is a single short-lived supervised child, not a service.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::engine::{self, AcquireOptions, ReleaseOptions};
use crate::error::{LoktError, Result};
use crate::identity::Identity;
use crate::wait;

#[derive(Debug, Clone)]
pub struct GuardOptions {
    pub ttl_sec: u64,
    pub wait: bool,
    pub timeout: Option<Duration>,
}

/// Ensures the lock is released exactly once no matter which of the
/// cooperating tasks (child-exit, signal handler) gets there first —
/// the "sync.Once-equivalent guard" from §4.7.
struct ReleaseOnce {
    released: AtomicBool,
    root: PathBuf,
    name: String,
    identity: Identity,
}

impl ReleaseOnce {
    fn new(root: PathBuf, name: String, identity: Identity) -> Self {
        Self { released: AtomicBool::new(false), root, name, identity }
    }

    fn release(&self) {
        if self
            .released
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            if let Err(e) = engine::release(&self.root, &self.name, &ReleaseOptions::default(), &self.identity) {
                tracing::warn!(error = %e, name = %self.name, "guard release failed");
            }
        }
    }
}

impl Drop for ReleaseOnce {
    /// Covers the panic path §4.7 step 4 requires alongside normal-exit and
    /// signal: if the supervisor task unwinds before an explicit `release()`
    /// call, this still fires during stack unwinding. A no-op if `release()`
    /// already ran.
    fn drop(&mut self) {
        self.release();
    }
}

/// Validate the `--` separator contract before any lock work happens —
/// §4.7 step 1.
pub fn validate_argv(argv: &[String]) -> Result<()> {
    if argv.is_empty() {
        return Err(LoktError::Usage("guard requires a command after `--`".into()));
    }
    Ok(())
}

/// Run the guarded child to completion. Returns the exit code the CLI
/// process should itself exit with: the child's own code on normal exit,
/// or `128 + signal` if a signal terminated the supervisor.
pub async fn run(
    root: &Path,
    name: &str,
    lock_opts: AcquireOptions,
    guard_opts: GuardOptions,
    identity: Identity,
    argv: Vec<String>,
) -> Result<i32> {
    validate_argv(&argv)?;

    let record = if guard_opts.wait {
        let deadline = guard_opts.timeout.unwrap_or(wait::DEFAULT_TIMEOUT);
        // The wait loop itself is synchronous (blocking sleeps between
        // retries); it has no cancellation source of its own before the
        // child exists, so it only ever stops on success or deadline.
        wait::wait_for_acquire(root, name, &lock_opts, &identity, true, deadline, &|| false)?
    } else {
        engine::acquire(root, name, &lock_opts, &identity, true)?
    };

    let cancel = CancellationToken::new();
    let release_guard = Arc::new(ReleaseOnce::new(root.to_path_buf(), name.to_string(), identity.clone()));

    let heartbeat_handle = if record.ttl_sec > 0 {
        Some(spawn_heartbeat(root.to_path_buf(), name.to_string(), record.ttl_sec, identity.clone(), cancel.clone()))
    } else {
        None
    };

    let mut child = match Command::new(&argv[0]).args(&argv[1..]).spawn() {
        Ok(c) => c,
        Err(e) => {
            cancel.cancel();
            release_guard.release();
            return Err(LoktError::Operational(format!("failed to launch child: {e}")));
        }
    };
    let child_pid = child.id();

    let exit_code = tokio::select! {
        wait_result = child.wait() => {
            cancel.cancel();
            release_guard.release();
            match wait_result {
                Ok(status) => status.code().unwrap_or(1),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to wait on guarded child");
                    1
                }
            }
        }
        signum = wait_for_terminating_signal() => {
            if let Some(pid) = child_pid {
                forward_signal(pid, signum);
            }
            let _ = child.wait().await;
            cancel.cancel();
            release_guard.release();
            128 + signum
        }
    };

    if let Some(h) = heartbeat_handle {
        h.abort();
    }

    Ok(exit_code)
}

fn spawn_heartbeat(
    root: PathBuf,
    name: String,
    ttl_sec: u64,
    identity: Identity,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_millis((ttl_sec * 1000 / 2).max(500));
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            if cancel.is_cancelled() {
                return;
            }
            if let Err(e) = engine::renew(&root, &name, &identity) {
                // Heartbeat failures are logged but never abort the
                // supervisor — §4.7 step 5.
                tracing::warn!(error = %e, name = %name, "heartbeat renewal failed");
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_terminating_signal() -> i32 {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut int = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = term.recv() => 15,
        _ = int.recv() => 2,
    }
}

#[cfg(not(unix))]
async fn wait_for_terminating_signal() -> i32 {
    let _ = tokio::signal::ctrl_c().await;
    2
}

#[cfg(unix)]
fn forward_signal(pid: u32, signum: i32) {
    unsafe {
        libc::kill(pid as libc::pid_t, signum);
    }
}

#[cfg(not(unix))]
fn forward_signal(_pid: u32, _signum: i32) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> Identity {
        Identity { owner: "alice".into(), host: "m1".into(), pid: std::process::id() }
    }

    #[test]
    fn validate_argv_rejects_empty() {
        assert!(validate_argv(&[]).is_err());
        assert!(validate_argv(&["true".to_string()]).is_ok());
    }

    #[test]
    fn release_once_drop_releases_an_unreleased_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let i = id();
        engine::acquire(tmp.path(), "guarded", &AcquireOptions { ttl_sec: 0, metadata: None }, &i, false).unwrap();

        {
            let _guard = ReleaseOnce::new(tmp.path().to_path_buf(), "guarded".to_string(), i.clone());
            // Dropped here without an explicit `release()` call — simulates
            // an unwind between acquire and the supervisor's normal release.
        }

        assert!(crate::codec::read(&crate::root::lock_path(tmp.path(), "guarded")).unwrap().is_none());
    }

    #[test]
    fn release_once_drop_after_explicit_release_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let i = id();
        engine::acquire(tmp.path(), "guarded", &AcquireOptions { ttl_sec: 0, metadata: None }, &i, false).unwrap();
        let other = id();
        engine::acquire(tmp.path(), "other", &AcquireOptions { ttl_sec: 0, metadata: None }, &other, false).unwrap();

        {
            let guard = ReleaseOnce::new(tmp.path().to_path_buf(), "guarded".to_string(), i.clone());
            guard.release();
            // A second release (here, via Drop) must not touch "other"'s
            // lock or error just because "guarded" is already gone.
        }

        assert!(crate::codec::read(&crate::root::lock_path(tmp.path(), "other")).unwrap().is_some());
    }

    #[tokio::test]
    async fn releases_lock_on_normal_child_exit() {
        let tmp = tempfile::tempdir().unwrap();
        let result = run(
            tmp.path(),
            "guarded",
            AcquireOptions { ttl_sec: 0, metadata: None },
            GuardOptions { ttl_sec: 0, wait: false, timeout: None },
            id(),
            vec!["true".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(result, 0);
        assert!(crate::codec::read(&crate::root::lock_path(tmp.path(), "guarded")).unwrap().is_none());
    }

    #[tokio::test]
    async fn propagates_nonzero_child_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let result = run(
            tmp.path(),
            "guarded",
            AcquireOptions { ttl_sec: 0, metadata: None },
            GuardOptions { ttl_sec: 0, wait: false, timeout: None },
            id(),
            vec!["false".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(result, 1);
    }

    #[tokio::test]
    async fn frozen_name_blocks_guard_acquisition() {
        let tmp = tempfile::tempdir().unwrap();
        engine::freeze(tmp.path(), "f", 300, &id()).unwrap();
        let err = run(
            tmp.path(),
            "f",
            AcquireOptions { ttl_sec: 0, metadata: None },
            GuardOptions { ttl_sec: 0, wait: false, timeout: None },
            id(),
            vec!["true".to_string()],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LoktError::Frozen { .. }));
    }
}
