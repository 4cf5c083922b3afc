//! Error taxonomy for the lock protocol core.
//!
//! Each variant maps to exactly one exit code (see `exit_code`); the CLI
//! layer never re-derives exit codes from error text.

use std::path::PathBuf;
use thiserror::Error;

use crate::record::{FreezeRecord, LockRecord};

/// A snapshot of whichever record blocked an operation, for error display.
#[derive(Debug, Clone)]
pub struct HolderSnapshot {
    pub owner: String,
    pub host: String,
    pub pid: u32,
    pub lock_id: String,
}

impl From<&LockRecord> for HolderSnapshot {
    fn from(r: &LockRecord) -> Self {
        Self {
            owner: r.owner.clone(),
            host: r.host.clone(),
            pid: r.pid,
            lock_id: r.lock_id.clone(),
        }
    }
}

impl From<&FreezeRecord> for HolderSnapshot {
    fn from(r: &FreezeRecord) -> Self {
        Self {
            owner: r.owner.clone(),
            host: r.host.clone(),
            pid: r.pid,
            lock_id: r.lock_id.clone(),
        }
    }
}

impl std::fmt::Display for HolderSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{} (pid {}, lock_id {})", self.owner, self.host, self.pid, self.lock_id)
    }
}

#[derive(Debug, Error)]
pub enum LoktError {
    /// Input failed validation before any filesystem operation was attempted.
    #[error("usage error: {0}")]
    Usage(String),

    /// The lock is held by someone else and the caller did not ask to wait.
    #[error("held by {holder}")]
    Held { holder: HolderSnapshot },

    /// A freeze record blocks the requested guard acquisition.
    #[error("frozen by {holder}")]
    Frozen { holder: HolderSnapshot },

    /// No lock/freeze record exists at the canonical path.
    #[error("not found: {name}")]
    NotFound { name: String },

    /// Release/unfreeze attempted by an identity that does not own the record.
    #[error("not owner: held by {holder}")]
    NotOwner { holder: HolderSnapshot },

    /// `--break-stale` was requested against a record that is not stale.
    #[error("not stale: held by {holder}")]
    NotStale { holder: HolderSnapshot },

    /// The operation was interrupted before completing.
    #[error("canceled")]
    Canceled,

    /// The wait deadline elapsed before the lock became available.
    #[error("timeout waiting on {holder}")]
    Timeout { holder: HolderSnapshot },

    /// The on-disk record failed to parse.
    #[error("corrupted record at {path} ({size} bytes)")]
    Corrupted { path: PathBuf, size: u64 },

    /// Filesystem or I/O failure unrelated to lock semantics.
    #[error("operational error: {0}")]
    Operational(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl LoktError {
    /// Exit code per spec.md §6.7. The CLI's `main` is a single match on this.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoktError::Usage(_) => 64,
            LoktError::Held { .. } | LoktError::Frozen { .. } | LoktError::Timeout { .. } => 2,
            LoktError::NotFound { .. } => 3,
            LoktError::NotOwner { .. } => 4,
            LoktError::NotStale { .. }
            | LoktError::Canceled
            | LoktError::Operational(_)
            | LoktError::Corrupted { .. }
            | LoktError::Io { .. }
            | LoktError::Json { .. } => 1,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoktError::Io { path: path.into(), source }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        LoktError::Json { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, LoktError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn snap() -> HolderSnapshot {
        HolderSnapshot { owner: "alice".into(), host: "m1".into(), pid: 42, lock_id: "abc".into() }
    }

    #[test]
    fn exit_codes_match_spec_table() {
        assert_eq!(LoktError::Usage("x".into()).exit_code(), 64);
        assert_eq!(LoktError::Held { holder: snap() }.exit_code(), 2);
        assert_eq!(LoktError::Frozen { holder: snap() }.exit_code(), 2);
        assert_eq!(LoktError::Timeout { holder: snap() }.exit_code(), 2);
        assert_eq!(LoktError::NotFound { name: "x".into() }.exit_code(), 3);
        assert_eq!(LoktError::NotOwner { holder: snap() }.exit_code(), 4);
        assert_eq!(LoktError::NotStale { holder: snap() }.exit_code(), 1);
        assert_eq!(LoktError::Canceled.exit_code(), 1);
        assert_eq!(LoktError::Operational("x".into()).exit_code(), 1);
        assert_eq!(LoktError::Corrupted { path: "x".into(), size: 0 }.exit_code(), 1);
    }

    #[test]
    fn holder_snapshot_display() {
        let s = snap();
        assert_eq!(format!("{s}"), "alice@m1 (pid 42, lock_id abc)");
    }
}
