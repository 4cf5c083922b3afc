//! Introspection — §4.8, SPEC_FULL.md §C.
//!
//! Grounded on the teacher's `commands/status.rs` (age formatting, dual
//! JSON/text output shapes) and `commands/tail.rs` (poll idiom reused by
//! `audit::follow`). This module is output-format-neutral: it returns
//! structured data the `lokt` CLI serializes or pretty-prints.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::codec;
use crate::error::{LoktError, Result};
use crate::liveness::{self, Liveness};
use crate::names::validate_name;
use crate::record::LockRecord;
use crate::root;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PidStatus {
    Alive,
    Dead,
    Unknown,
}

impl From<Liveness> for PidStatus {
    fn from(l: Liveness) -> Self {
        match l {
            Liveness::Alive => PidStatus::Alive,
            Liveness::Dead => PidStatus::Dead,
            Liveness::Unknown => PidStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub name: String,
    pub kind: &'static str,
    pub owner: String,
    pub host: String,
    pub pid: u32,
    pub lock_id: String,
    pub age_sec: i64,
    pub remaining_sec: Option<i64>,
    pub expired: bool,
    pub pid_status: PidStatus,
}

fn entry_from_record(name: &str, kind: &'static str, record: &LockRecord, local_host: &str, now: DateTime<Utc>) -> StatusEntry {
    let age_sec = (now - record.acquired_ts).num_seconds().max(0);
    let remaining_sec = record.expires_at.map(|exp| (exp - now).num_seconds());
    StatusEntry {
        name: name.to_string(),
        kind,
        owner: record.owner.clone(),
        host: record.host.clone(),
        pid: record.pid,
        lock_id: record.lock_id.clone(),
        age_sec,
        remaining_sec,
        expired: record.is_ttl_expired(now),
        pid_status: liveness::is_alive(record.pid, &record.host, local_host).into(),
    }
}

/// Enumerate every record under `dir`, skipping (not failing on) corrupted
/// ones — `status` reports what it can read, §4.8.
fn list_dir(dir: &Path, kind: &'static str, local_host: &str, now: DateTime<Utc>) -> Vec<StatusEntry> {
    let Ok(entries) = std::fs::read_dir(dir) else { return Vec::new() };
    let mut out = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        if let Ok(Some(record)) = codec::read(&path) {
            out.push(entry_from_record(&name, kind, &record, local_host, now));
        }
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

/// `status` with no name: enumerate all locks and freezes.
pub fn status_all(root_dir: &Path, local_host: &str) -> Vec<StatusEntry> {
    let now = Utc::now();
    let mut entries = list_dir(&root::locks_dir(root_dir), "lock", local_host, now);
    entries.extend(list_dir(&root::freezes_dir(root_dir), "freeze", local_host, now));
    entries
}

/// `status <name>`: exactly one record or `NotFound` — §4.8.
pub fn status_one(root_dir: &Path, name: &str, local_host: &str) -> Result<StatusEntry> {
    validate_name(name)?;
    let now = Utc::now();
    if let Some(record) = codec::read(&root::lock_path(root_dir, name))? {
        return Ok(entry_from_record(name, "lock", &record, local_host, now));
    }
    if let Some(record) = codec::read(&root::freeze_path(root_dir, name))? {
        return Ok(entry_from_record(name, "freeze", &record, local_host, now));
    }
    Err(LoktError::NotFound { name: name.to_string() })
}

/// `status --prune-expired`: remove TTL-expired records, report the count.
/// Shares removal semantics with `sweep`, but runs on explicit request and
/// reports what it did rather than running silently in the background.
pub fn prune_expired(root_dir: &Path) -> usize {
    crate::sweep::sweep(root_dir).locks_removed
}

/// `exists <name>`: success iff a lock record exists at the canonical path.
pub fn exists(root_dir: &Path, name: &str) -> Result<()> {
    validate_name(name)?;
    match codec::read(&root::lock_path(root_dir, name))? {
        Some(_) => Ok(()),
        None => Err(LoktError::NotFound { name: name.to_string() }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Free,
    SelfHeld,
    Held,
    Frozen,
    Expired,
    DeadPid,
    Corrupted,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnosis {
    pub name: String,
    pub reasons: Vec<Reason>,
    pub blocked: bool,
    pub suggested_commands: Vec<String>,
}

/// `why <name>` — §4.8. Diagnoses both the lock and freeze records for
/// `name`; `blocked` is true iff any reason besides `free`/`self-held`
/// applies to either.
pub fn why(root_dir: &Path, name: &str, identity: &crate::identity::Identity) -> Result<Diagnosis> {
    validate_name(name)?;
    let mut reasons = Vec::new();
    let mut suggested = Vec::new();

    let lock_path = root::lock_path(root_dir, name);
    match codec::read(&lock_path) {
        Ok(None) => reasons.push(Reason::Free),
        Ok(Some(record)) => {
            if identity.matches(&record.owner, &record.host, record.pid) {
                reasons.push(Reason::SelfHeld);
            } else {
                reasons.push(Reason::Held);
                suggested.push(format!("lokt status {name}"));
            }
            if record.is_ttl_expired(Utc::now()) {
                reasons.push(Reason::Expired);
                suggested.push(format!("lokt unlock {name} --break-stale"));
            } else if liveness::is_alive(record.pid, &record.host, &identity.host) == Liveness::Dead {
                reasons.push(Reason::DeadPid);
                suggested.push(format!("lokt unlock {name} --break-stale"));
            }
        }
        Err(LoktError::Corrupted { .. }) => {
            reasons.push(Reason::Corrupted);
            suggested.push(format!("lokt unlock {name} --force"));
        }
        Err(e) => return Err(e),
    }

    let freeze_path = root::freeze_path(root_dir, name);
    if let Some(freeze) = codec::read(&freeze_path)? {
        if !freeze.is_ttl_expired(Utc::now()) {
            reasons.push(Reason::Frozen);
            suggested.push(format!("lokt unfreeze {name}"));
        }
    }

    let blocked = reasons.iter().any(|r| !matches!(r, Reason::Free | Reason::SelfHeld));
    Ok(Diagnosis { name: name.to_string(), reasons, blocked, suggested_commands: suggested })
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub root: String,
    pub writable: bool,
    pub round_trip_ok: bool,
    pub clock_skew_sec: Option<i64>,
    pub warnings: Vec<String>,
}

/// `doctor` — SPEC_FULL.md §C. A best-effort environment sanity check, not
/// a full filesystem-capability matrix (open question, see DESIGN.md):
/// root writability, an exclusive-create/rename round trip, and a coarse
/// clock-skew check against the root directory's mtime.
pub fn doctor(root_dir: &Path) -> Result<DoctorReport> {
    let mut warnings = Vec::new();

    root::ensure_root_layout(root_dir)?;
    let writable = probe_writable(root_dir);
    if !writable {
        warnings.push(format!("{} is not writable", root_dir.display()));
    }

    let round_trip_ok = probe_round_trip(root_dir);
    if !round_trip_ok {
        warnings.push("exclusive-create/rename round trip failed; filesystem may not support the atomicity this tool depends on (NFS/FUSE mounts are known to be unreliable here)".to_string());
    }

    let clock_skew_sec = clock_skew(root_dir);
    if let Some(skew) = clock_skew_sec {
        if skew.abs() > 300 {
            warnings.push(format!("system clock differs from the root directory's mtime by {skew}s; TTL expiry may misbehave"));
        }
    }

    Ok(DoctorReport { root: root_dir.display().to_string(), writable, round_trip_ok, clock_skew_sec, warnings })
}

fn probe_writable(root_dir: &Path) -> bool {
    let probe = root_dir.join(".lokt-doctor-probe");
    let ok = std::fs::write(&probe, b"probe").is_ok();
    let _ = std::fs::remove_file(&probe);
    ok
}

fn probe_round_trip(root_dir: &Path) -> bool {
    let name = "__doctor_probe__";
    let record = LockRecord::new(name, "doctor".into(), "doctor".into(), "doctor".into(), std::process::id(), Utc::now(), 1, None);
    let path = root::lock_path(root_dir, name);
    let created = codec::exclusive_create(&path, &record).is_ok();
    let renewed = created && codec::atomic_write(&path, &record.renewed(Utc::now(), 1, None)).is_ok();
    let _ = codec::remove(&path);
    created && renewed
}

fn clock_skew(root_dir: &Path) -> Option<i64> {
    let meta = std::fs::metadata(root_dir).ok()?;
    let mtime: DateTime<Utc> = meta.modified().ok()?.into();
    Some((Utc::now() - mtime).num_seconds())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{self, AcquireOptions};
    use crate::identity::Identity;

    fn id(owner: &str, pid: u32) -> Identity {
        Identity { owner: owner.into(), host: "m1".into(), pid }
    }

    #[test]
    fn status_one_reports_age_and_remaining() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", 1);
        engine::acquire(tmp.path(), "build", &AcquireOptions { ttl_sec: 300, metadata: None }, &a, false).unwrap();
        let entry = status_one(tmp.path(), "build", "m1").unwrap();
        assert_eq!(entry.owner, "alice");
        assert!(entry.remaining_sec.unwrap() <= 300);
        assert!(!entry.expired);
    }

    #[test]
    fn status_one_missing_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(status_one(tmp.path(), "nope", "m1").unwrap_err(), LoktError::NotFound { .. }));
    }

    #[test]
    fn status_all_lists_locks_and_freezes() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", 1);
        engine::acquire(tmp.path(), "build", &AcquireOptions::default(), &a, false).unwrap();
        engine::freeze(tmp.path(), "deploy", 300, &a).unwrap();
        let all = status_all(tmp.path(), "m1");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn why_reports_free_for_untouched_name() {
        let tmp = tempfile::tempdir().unwrap();
        let d = why(tmp.path(), "build", &id("alice", 1)).unwrap();
        assert_eq!(d.reasons, vec![Reason::Free]);
        assert!(!d.blocked);
    }

    #[test]
    fn why_reports_self_held_as_not_blocked() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", std::process::id());
        engine::acquire(tmp.path(), "build", &AcquireOptions::default(), &a, false).unwrap();
        let d = why(tmp.path(), "build", &a).unwrap();
        assert_eq!(d.reasons, vec![Reason::SelfHeld]);
        assert!(!d.blocked);
    }

    #[test]
    fn why_reports_held_by_other_as_blocked() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", std::process::id());
        engine::acquire(tmp.path(), "build", &AcquireOptions::default(), &a, false).unwrap();
        let d = why(tmp.path(), "build", &id("bob", 2)).unwrap();
        assert!(d.reasons.contains(&Reason::Held));
        assert!(d.blocked);
        assert!(!d.suggested_commands.is_empty());
    }

    #[test]
    fn why_reports_frozen() {
        let tmp = tempfile::tempdir().unwrap();
        let a = id("alice", 1);
        engine::freeze(tmp.path(), "deploy", 300, &a).unwrap();
        let d = why(tmp.path(), "deploy", &id("bob", 2)).unwrap();
        assert!(d.reasons.contains(&Reason::Frozen));
        assert!(d.blocked);
    }

    #[test]
    fn exists_matches_lock_presence() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(exists(tmp.path(), "build").is_err());
        let a = id("alice", 1);
        engine::acquire(tmp.path(), "build", &AcquireOptions::default(), &a, false).unwrap();
        assert!(exists(tmp.path(), "build").is_ok());
    }

    #[test]
    fn doctor_reports_writable_root() {
        let tmp = tempfile::tempdir().unwrap();
        let report = doctor(tmp.path()).unwrap();
        assert!(report.writable);
        assert!(report.round_trip_ok);
    }
}
