//! Background best-effort sweep of TTL-expired records — §4.6.
//!
//! Grounded on the teacher's `retention.rs` shape (read-all, filter by
//! expiry, report counts) — adapted: Lokt never archives, and never
//! removes dead-pid-only records, only TTL-expired ones.

use std::path::Path;

use chrono::Utc;

use crate::audit::{self, AuditEvent, EventKind};
use crate::codec;
use crate::root;

/// Commands that run the sweep before their main work — §4.6.
pub const SWEEP_ENABLED_COMMANDS: &[&str] =
    &["lock", "unlock", "status", "guard", "freeze", "unfreeze", "why", "exists"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepResult {
    pub locks_removed: usize,
    pub freezes_removed: usize,
}

/// Run the sweep unless `LOKT_NO_SWEEP` is set. Failures are swallowed —
/// sweep is best-effort only, per §4.6 and §7.
pub fn sweep_if_enabled(root_dir: &Path) -> SweepResult {
    if std::env::var("LOKT_NO_SWEEP").is_ok() {
        return SweepResult::default();
    }
    sweep(root_dir)
}

/// Enumerate `locks/` and `freezes/`, remove TTL-expired records durably.
/// Never touches dead-pid-only records (§4.6, §9 known limitation).
pub fn sweep(root_dir: &Path) -> SweepResult {
    let locks_removed = sweep_dir(&root::locks_dir(root_dir), root_dir);
    let freezes_removed = sweep_dir(&root::freezes_dir(root_dir), root_dir);
    let result = SweepResult { locks_removed, freezes_removed };

    if result.locks_removed + result.freezes_removed > 0 {
        let event = AuditEvent {
            ts: Utc::now(),
            event: EventKind::Sweep.as_str().to_string(),
            name: String::new(),
            owner: String::new(),
            host: String::new(),
            pid: std::process::id(),
            ttl_sec: None,
            extra: None,
        };
        let _ = audit::append(&root::audit_log_path(root_dir), &event, EventKind::Sweep.is_durable());
    }

    result
}

fn sweep_dir(dir: &Path, _root_dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else { return 0 };
    let mut removed = 0;
    let now = Utc::now();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match codec::read(&path) {
            Ok(Some(record)) if record.is_ttl_expired(now) => {
                codec::remove_best_effort(&path);
                removed += 1;
            }
            _ => {}
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{self, AcquireOptions};
    use crate::identity::Identity;
    use serial_test::serial;

    fn id(owner: &str, pid: u32) -> Identity {
        Identity { owner: owner.into(), host: "m1".into(), pid }
    }

    #[test]
    fn sweep_removes_ttl_expired_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", 1);
        let rec = engine::acquire(tmp.path(), "build", &AcquireOptions { ttl_sec: 1, metadata: None }, &a, false).unwrap();
        let mut expired = rec.clone();
        expired.expires_at = Some(Utc::now() - chrono::Duration::seconds(10));
        let path = root::lock_path(tmp.path(), "build");
        codec::atomic_write(&path, &expired).unwrap();

        let result = sweep(tmp.path());
        assert_eq!(result.locks_removed, 1);
        assert!(codec::read(&path).unwrap().is_none());
    }

    #[test]
    fn sweep_never_removes_dead_pid_only_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", 4_194_304); // bogus dead pid, no TTL
        engine::acquire(tmp.path(), "build", &AcquireOptions { ttl_sec: 0, metadata: None }, &a, false).unwrap();

        let result = sweep(tmp.path());
        assert_eq!(result.locks_removed, 0);
        assert!(codec::read(&root::lock_path(tmp.path(), "build")).unwrap().is_some());
    }

    #[test]
    #[serial]
    fn lokt_no_sweep_disables_sweep() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", 1);
        let rec = engine::acquire(tmp.path(), "build", &AcquireOptions { ttl_sec: 1, metadata: None }, &a, false).unwrap();
        let mut expired = rec.clone();
        expired.expires_at = Some(Utc::now() - chrono::Duration::seconds(10));
        let path = root::lock_path(tmp.path(), "build");
        codec::atomic_write(&path, &expired).unwrap();

        unsafe { std::env::set_var("LOKT_NO_SWEEP", "1") };
        let result = sweep_if_enabled(tmp.path());
        unsafe { std::env::remove_var("LOKT_NO_SWEEP") };

        assert_eq!(result, SweepResult::default());
        assert!(codec::read(&path).unwrap().is_some());
    }
}
