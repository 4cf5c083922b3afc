//! Lock Engine — Acquire/Release/Renew/Freeze/Unfreeze — §4.5.
//!
//! Grounded on `atm-agent-mcp/src/lock.rs` (exclusive-create-first-claim,
//! read-existing-then-branch-on-identity/staleness, single retry on a
//! losing race) and `atm-core/src/io/lock.rs` (backoff/retry idiom).

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;

use crate::audit::{self, AuditEvent, EventKind};
use crate::codec;
use crate::error::{HolderSnapshot, LoktError, Result};
use crate::identity::Identity;
use crate::liveness::{self, Liveness};
use crate::names::validate_name;
use crate::record::{LockRecord, MAX_METADATA_BYTES};
use crate::root;

#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    pub ttl_sec: u64,
    pub metadata: Option<HashMap<String, String>>,
}

fn validate_metadata(metadata: &Option<HashMap<String, String>>) -> Result<()> {
    let Some(m) = metadata else { return Ok(()) };
    let size: usize = m.iter().map(|(k, v)| k.len() + v.len()).sum();
    if size > MAX_METADATA_BYTES {
        return Err(LoktError::Usage(format!(
            "metadata exceeds {MAX_METADATA_BYTES} bytes"
        )));
    }
    Ok(())
}

fn new_lock_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn emit(root: &Path, kind: EventKind, name: &str, owner: &str, host: &str, pid: u32, ttl_sec: Option<u64>) {
    let event = AuditEvent {
        ts: Utc::now(),
        event: kind.as_str().to_string(),
        name: name.to_string(),
        owner: owner.to_string(),
        host: host.to_string(),
        pid,
        ttl_sec,
        extra: None,
    };
    if let Err(e) = audit::append(&root::audit_log_path(root), &event, kind.is_durable()) {
        tracing::warn!(error = %e, "audit write failed");
    }
}

/// Read the freeze record for `name`, if any. Removes it first if expired
/// — §4.5.1 step 2, §4.5.4.
fn check_freeze(root: &Path, name: &str) -> Result<Option<LockRecord>> {
    let path = root::freeze_path(root, name);
    match codec::read(&path) {
        Ok(Some(freeze)) => {
            if freeze.is_ttl_expired(Utc::now()) {
                codec::remove_best_effort(&path);
                Ok(None)
            } else {
                Ok(Some(freeze))
            }
        }
        Ok(None) => Ok(None),
        Err(LoktError::Corrupted { .. }) => {
            // A corrupt freeze record is not a blocking freeze.
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Acquire `name` under `identity` — §4.5.1. `guarded` selects whether the
/// freeze check applies: plain `lock` bypasses it, `guard` honors it
/// (§4.5.4 "freezes affect only guard acquisitions").
pub fn acquire(
    root_dir: &Path,
    name: &str,
    opts: &AcquireOptions,
    identity: &Identity,
    guarded: bool,
) -> Result<LockRecord> {
    validate_name(name)?;
    validate_metadata(&opts.metadata)?;
    root::ensure_root_layout(root_dir)?;

    if guarded {
        if let Some(freeze) = check_freeze(root_dir, name)? {
            let holder = HolderSnapshot::from(&freeze);
            emit(root_dir, EventKind::Deny, name, &identity.owner, &identity.host, identity.pid, None);
            return Err(LoktError::Frozen { holder });
        }
    }

    let path = root::lock_path(root_dir, name);
    let now = Utc::now();
    let fresh = LockRecord::new(
        name,
        new_lock_id(),
        identity.owner.clone(),
        identity.host.clone(),
        identity.pid,
        now,
        opts.ttl_sec,
        opts.metadata.clone(),
    );

    match codec::exclusive_create(&path, &fresh) {
        Ok(()) => {
            emit(root_dir, EventKind::Acquire, name, &identity.owner, &identity.host, identity.pid, Some(opts.ttl_sec));
            return Ok(fresh);
        }
        Err(e) if !codec::is_already_exists(&e) => return Err(e),
        Err(_) => {} // fall through to the existing-file branch below
    }

    resolve_contended_acquire(root_dir, &path, name, opts, identity, &fresh)
}

fn resolve_contended_acquire(
    root_dir: &Path,
    path: &Path,
    name: &str,
    opts: &AcquireOptions,
    identity: &Identity,
    fresh: &LockRecord,
) -> Result<LockRecord> {
    let existing = match codec::read(path) {
        Ok(Some(r)) => r,
        Ok(None) => {
            // Raced away between the failed create and this read; retry once.
            return retry_exclusive_create_once(root_dir, path, name, opts, identity, fresh);
        }
        Err(LoktError::Corrupted { .. }) => {
            codec::remove_best_effort(path);
            return retry_exclusive_create_once(root_dir, path, name, opts, identity, fresh);
        }
        Err(e) => return Err(e),
    };

    if identity.matches(&existing.owner, &existing.host, existing.pid) {
        // Re-entrant refresh: same identity, rewrite in place — §4.5.1 step 4.
        let refreshed = existing.renewed(Utc::now(), opts.ttl_sec, opts.metadata.clone());
        codec::atomic_write(path, &refreshed)?;
        emit(root_dir, EventKind::Acquire, name, &identity.owner, &identity.host, identity.pid, Some(opts.ttl_sec));
        return Ok(refreshed);
    }

    if existing.is_ttl_expired(Utc::now()) {
        codec::remove_best_effort(path);
        return retry_exclusive_create_once(root_dir, path, name, opts, identity, fresh);
    }

    let holder = HolderSnapshot::from(&existing);
    emit(root_dir, EventKind::Deny, name, &identity.owner, &identity.host, identity.pid, None);
    Err(LoktError::Held { holder })
}

fn retry_exclusive_create_once(
    root_dir: &Path,
    path: &Path,
    name: &str,
    opts: &AcquireOptions,
    identity: &Identity,
    fresh: &LockRecord,
) -> Result<LockRecord> {
    match codec::exclusive_create(path, fresh) {
        Ok(()) => {
            emit(root_dir, EventKind::Acquire, name, &identity.owner, &identity.host, identity.pid, Some(opts.ttl_sec));
            Ok(fresh.clone())
        }
        Err(e) if codec::is_already_exists(&e) => {
            // Lost the race a second time. Per §9, the single repair retry
            // is final: report whatever is there now as the winner, or
            // `Held(unknown)` if it vanished again before we could read it.
            let holder = match codec::read(path) {
                Ok(Some(r)) => HolderSnapshot::from(&r),
                _ => HolderSnapshot { owner: "unknown".into(), host: "unknown".into(), pid: 0, lock_id: "unknown".into() },
            };
            emit(root_dir, EventKind::Deny, name, &identity.owner, &identity.host, identity.pid, None);
            Err(LoktError::Held { holder })
        }
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReleaseOptions {
    pub force: bool,
    pub break_stale: bool,
}

/// Whether a lock record is stale: TTL-expired, or same-host-and-dead-pid —
/// Glossary "Stale", §4.5.2.
pub fn is_stale(record: &LockRecord, local_host: &str) -> bool {
    if record.is_ttl_expired(Utc::now()) {
        return true;
    }
    record.host == local_host && liveness::is_alive(record.pid, &record.host, local_host) == Liveness::Dead
}

/// Release `name` — §4.5.2. `force` and `break_stale` are mutually
/// exclusive; the CLI layer enforces that before calling in.
pub fn release(root_dir: &Path, name: &str, opts: &ReleaseOptions, identity: &Identity) -> Result<()> {
    validate_name(name)?;
    let path = root::lock_path(root_dir, name);
    let existing = codec::read(&path)?.ok_or_else(|| LoktError::NotFound { name: name.to_string() })?;

    if opts.force {
        codec::remove(&path)?;
        emit(root_dir, EventKind::ForceBreak, name, &identity.owner, &identity.host, identity.pid, None);
        return Ok(());
    }

    if opts.break_stale {
        if !is_stale(&existing, &identity.host) {
            return Err(LoktError::NotStale { holder: HolderSnapshot::from(&existing) });
        }
        codec::remove(&path)?;
        emit(root_dir, EventKind::BreakStale, name, &identity.owner, &identity.host, identity.pid, None);
        return Ok(());
    }

    if !identity.matches(&existing.owner, &existing.host, existing.pid) {
        return Err(LoktError::NotOwner { holder: HolderSnapshot::from(&existing) });
    }
    codec::remove(&path)?;
    emit(root_dir, EventKind::Release, name, &identity.owner, &identity.host, identity.pid, None);
    Ok(())
}

/// Bulk release by owner — §4.5.2. Silent on non-matching/unreadable files.
pub fn release_by_owner(root_dir: &Path, owner: &str, identity: &Identity) -> Result<Vec<String>> {
    let dir = root::locks_dir(root_dir);
    let mut released = Vec::new();
    let Ok(entries) = std::fs::read_dir(&dir) else { return Ok(released) };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(Some(record)) = codec::read(&path) else { continue };
        if record.owner != owner {
            continue;
        }
        if codec::remove(&path).is_ok() {
            emit(root_dir, EventKind::ForceBreak, &record.name, &identity.owner, &identity.host, identity.pid, None);
            released.push(record.name);
        }
    }
    Ok(released)
}

/// Renew `name` — §4.5.3. Identity mismatch is always an error; a caller
/// never renews someone else's lock.
pub fn renew(root_dir: &Path, name: &str, identity: &Identity) -> Result<LockRecord> {
    validate_name(name)?;
    let path = root::lock_path(root_dir, name);
    let existing = codec::read(&path)?.ok_or_else(|| LoktError::NotFound { name: name.to_string() })?;

    if !identity.matches(&existing.owner, &existing.host, existing.pid) {
        return Err(LoktError::NotOwner { holder: HolderSnapshot::from(&existing) });
    }

    let renewed = existing.renewed(Utc::now(), existing.ttl_sec, None);
    codec::atomic_write(&path, &renewed)?;
    emit(root_dir, EventKind::Renew, name, &identity.owner, &identity.host, identity.pid, Some(renewed.ttl_sec));
    Ok(renewed)
}

/// Freeze `name` — §4.5.4. Requires a strictly positive TTL.
pub fn freeze(root_dir: &Path, name: &str, ttl_sec: u64, identity: &Identity) -> Result<LockRecord> {
    validate_name(name)?;
    if ttl_sec == 0 {
        return Err(LoktError::Usage("freeze requires a positive --ttl".into()));
    }
    root::ensure_root_layout(root_dir)?;
    let path = root::freeze_path(root_dir, name);
    let now = Utc::now();
    let fresh = LockRecord::new(name, new_lock_id(), identity.owner.clone(), identity.host.clone(), identity.pid, now, ttl_sec, None);

    match codec::exclusive_create(&path, &fresh) {
        Ok(()) => {
            emit(root_dir, EventKind::Freeze, name, &identity.owner, &identity.host, identity.pid, Some(ttl_sec));
            Ok(fresh)
        }
        Err(e) if codec::is_already_exists(&e) => {
            let existing = codec::read(&path)?;
            match existing {
                Some(r) if !r.is_ttl_expired(now) => Err(LoktError::Held { holder: HolderSnapshot::from(&r) }),
                _ => {
                    codec::remove_best_effort(&path);
                    codec::exclusive_create(&path, &fresh)?;
                    emit(root_dir, EventKind::Freeze, name, &identity.owner, &identity.host, identity.pid, Some(ttl_sec));
                    Ok(fresh)
                }
            }
        }
        Err(e) => Err(e),
    }
}

/// Unfreeze `name` — §4.5.4.
pub fn unfreeze(root_dir: &Path, name: &str, force: bool, identity: &Identity) -> Result<()> {
    validate_name(name)?;
    let path = root::freeze_path(root_dir, name);
    let existing = codec::read(&path)?.ok_or_else(|| LoktError::NotFound { name: name.to_string() })?;

    if !force && !identity.matches(&existing.owner, &existing.host, existing.pid) {
        return Err(LoktError::NotOwner { holder: HolderSnapshot::from(&existing) });
    }

    codec::remove(&path)?;
    let kind = if force { EventKind::ForceUnfreeze } else { EventKind::Unfreeze };
    emit(root_dir, kind, name, &identity.owner, &identity.host, identity.pid, None);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(owner: &str, pid: u32) -> Identity {
        Identity { owner: owner.into(), host: "m1".into(), pid }
    }

    fn opts(ttl: u64) -> AcquireOptions {
        AcquireOptions { ttl_sec: ttl, metadata: None }
    }

    #[test]
    fn acquire_then_release_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let i = id("alice", 1);
        let rec = acquire(tmp.path(), "build", &opts(300), &i, false).unwrap();
        assert_eq!(rec.owner, "alice");
        release(tmp.path(), "build", &ReleaseOptions::default(), &i).unwrap();
        let err = release(tmp.path(), "build", &ReleaseOptions::default(), &i).unwrap_err();
        assert!(matches!(err, LoktError::NotFound { .. }));
    }

    #[test]
    fn second_acquirer_is_held() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", 1);
        let b = id("bob", 2);
        acquire(tmp.path(), "build", &opts(300), &a, false).unwrap();
        let err = acquire(tmp.path(), "build", &opts(300), &b, false).unwrap_err();
        assert!(matches!(err, LoktError::Held { .. }));
    }

    #[test]
    fn reentrant_refresh_preserves_lock_id() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", 1);
        let first = acquire(tmp.path(), "build", &opts(300), &a, false).unwrap();
        let second = acquire(tmp.path(), "build", &opts(600), &a, false).unwrap();
        assert_eq!(first.lock_id, second.lock_id);
        assert_eq!(second.ttl_sec, 600);
    }

    #[test]
    fn expired_lock_is_reclaimed_by_new_acquirer() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", 1);
        let rec = acquire(tmp.path(), "build", &opts(1), &a, false).unwrap();
        // Force expiry by rewriting expires_at into the past.
        let mut expired = rec.clone();
        expired.expires_at = Some(Utc::now() - chrono::Duration::seconds(10));
        let path = root::lock_path(tmp.path(), "build");
        codec::atomic_write(&path, &expired).unwrap();

        let b = id("bob", 2);
        let won = acquire(tmp.path(), "build", &opts(300), &b, false).unwrap();
        assert_eq!(won.owner, "bob");
        assert_ne!(won.lock_id, rec.lock_id);
    }

    #[test]
    fn release_by_non_owner_is_not_owner() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", 1);
        let b = id("bob", 2);
        acquire(tmp.path(), "build", &opts(300), &a, false).unwrap();
        let err = release(tmp.path(), "build", &ReleaseOptions::default(), &b).unwrap_err();
        assert!(matches!(err, LoktError::NotOwner { .. }));
    }

    #[test]
    fn force_release_ignores_ownership() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", 1);
        let b = id("bob", 2);
        acquire(tmp.path(), "build", &opts(300), &a, false).unwrap();
        release(tmp.path(), "build", &ReleaseOptions { force: true, break_stale: false }, &b).unwrap();
    }

    #[test]
    fn break_stale_rejects_live_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", std::process::id());
        acquire(tmp.path(), "build", &opts(0), &a, false).unwrap();
        let b = id("bob", 2);
        let err = release(tmp.path(), "build", &ReleaseOptions { force: false, break_stale: true }, &b).unwrap_err();
        assert!(matches!(err, LoktError::NotStale { .. }));
    }

    #[test]
    fn renew_preserves_lock_id_and_advances_expiry() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", 1);
        let rec = acquire(tmp.path(), "build", &opts(300), &a, false).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let renewed = renew(tmp.path(), "build", &a).unwrap();
        assert_eq!(rec.lock_id, renewed.lock_id);
        assert!(renewed.expires_at.unwrap() >= rec.expires_at.unwrap());
    }

    #[test]
    fn renew_by_non_owner_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", 1);
        let b = id("bob", 2);
        acquire(tmp.path(), "build", &opts(300), &a, false).unwrap();
        let err = renew(tmp.path(), "build", &b).unwrap_err();
        assert!(matches!(err, LoktError::NotOwner { .. }));
    }

    #[test]
    fn freeze_blocks_guard_not_plain_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", 1);
        freeze(tmp.path(), "f", 300, &a).unwrap();

        let b = id("bob", 2);
        let err = acquire(tmp.path(), "f", &opts(300), &b, true).unwrap_err();
        assert!(matches!(err, LoktError::Frozen { .. }));

        // Plain lock bypasses the freeze check.
        acquire(tmp.path(), "f", &opts(300), &b, false).unwrap();
    }

    #[test]
    fn freeze_requires_positive_ttl() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", 1);
        let err = freeze(tmp.path(), "f", 0, &a).unwrap_err();
        assert!(matches!(err, LoktError::Usage(_)));
    }

    #[test]
    fn unfreeze_then_guard_succeeds() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", 1);
        freeze(tmp.path(), "f", 300, &a).unwrap();
        unfreeze(tmp.path(), "f", false, &a).unwrap();
        let b = id("bob", 2);
        acquire(tmp.path(), "f", &opts(300), &b, true).unwrap();
    }

    #[test]
    fn metadata_over_cap_is_usage_error() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", 1);
        let mut meta = HashMap::new();
        meta.insert("k".repeat(5000), "v".to_string());
        let err = acquire(tmp.path(), "build", &AcquireOptions { ttl_sec: 0, metadata: Some(meta) }, &a, false).unwrap_err();
        assert!(matches!(err, LoktError::Usage(_)));
    }
}
