//! Lockfile codec — §4.1.
//!
//! Grounded on the teacher's `io/atomic.rs` (platform-`cfg` structuring),
//! `io/inbox.rs` (temp+fsync+rename sequence), and `atm-agent-mcp/src/lock.rs`
//! (exclusive-create-first-claim semantics). Unlike the teacher's inbox
//! writer, this codec never merges concurrent writers: renewal is
//! same-identity-only, so a plain atomic-write suffices.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::{LoktError, Result};
use crate::record::LockRecord;

/// Read and parse a record at `path`. Returns `Ok(None)` if the path doesn't
/// exist. Parse failures return `LoktError::Corrupted` carrying the raw
/// byte count, per §4.1.
pub fn read(path: &Path) -> Result<Option<LockRecord>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LoktError::io(path, e)),
    };
    match serde_json::from_slice::<LockRecord>(&bytes) {
        Ok(r) => Ok(Some(r)),
        Err(_) => Err(LoktError::Corrupted { path: path.to_path_buf(), size: bytes.len() as u64 }),
    }
}

/// `exclusive-create(path, record)` — create-if-absent-and-fail-if-present.
/// Returns `Ok(())` on success; `Err(Operational)` wrapping `AlreadyExists`
/// is surfaced distinctly so callers can branch on "held" vs other I/O
/// failures via `is_already_exists`.
pub fn exclusive_create(path: &Path, record: &LockRecord) -> Result<()> {
    let body = serialize(record)?;
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(LoktError::Operational(format!("{} already exists", path.display())));
        }
        Err(e) => return Err(LoktError::io(path, e)),
    };
    file.write_all(&body).map_err(|e| LoktError::io(path, e))?;
    file.sync_all().map_err(|e| LoktError::io(path, e))?;
    drop(file);
    fsync_parent(path)?;
    Ok(())
}

pub fn is_already_exists(err: &LoktError) -> bool {
    matches!(err, LoktError::Operational(msg) if msg.ends_with("already exists"))
}

/// `atomic-write(path, record)` — write-temp, fsync, rename, fsync-parent.
/// Used for renewal and re-entrant refresh, where the caller already knows
/// it legitimately owns the record (§4.5.1 step 4, §4.5.3).
pub fn atomic_write(path: &Path, record: &LockRecord) -> Result<()> {
    let body = serialize(record)?;
    let tmp_path = tmp_sibling(path);

    let write_result = (|| -> Result<()> {
        let mut tmp = File::create(&tmp_path).map_err(|e| LoktError::io(&tmp_path, e))?;
        tmp.write_all(&body).map_err(|e| LoktError::io(&tmp_path, e))?;
        tmp.sync_all().map_err(|e| LoktError::io(&tmp_path, e))?;
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(LoktError::io(path, e));
    }

    fsync_parent(path)?;
    Ok(())
}

/// Remove a record durably: unlink, then fsync the parent directory —
/// §4.5.2, §9 ("open parent, unlink, fsync parent").
pub fn remove(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LoktError::NotFound { name: path_stem(path) });
        }
        Err(e) => return Err(LoktError::io(path, e)),
    }
    fsync_parent(path)
}

/// Best-effort removal used by repair/sweep paths where "not found" is not
/// an error (another racer may have already removed it).
pub fn remove_best_effort(path: &Path) {
    let _ = fs::remove_file(path);
    let _ = fsync_parent(path);
}

fn path_stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

fn serialize(record: &LockRecord) -> Result<Vec<u8>> {
    serde_json::to_vec(record).map_err(|e| LoktError::json(record.name.clone(), e))
}

fn tmp_sibling(path: &Path) -> std::path::PathBuf {
    let pid = std::process::id();
    let nonce: u64 = {
        // A per-process counter would need shared state; process id + address
        // of a stack local is sufficient entropy to avoid same-process
        // collisions for sibling temp files within a single invocation.
        let x = &pid as *const _ as u64;
        x ^ (pid as u64)
    };
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!("{file_name}.tmp-{pid}-{nonce:x}"))
}

#[cfg(unix)]
fn fsync_parent(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else { return Ok(()) };
    let dir = File::open(parent).map_err(|e| LoktError::io(parent, e))?;
    dir.sync_all().map_err(|e| LoktError::io(parent, e))
}

#[cfg(not(unix))]
fn fsync_parent(_path: &Path) -> Result<()> {
    // Directory fsync has no equivalent on non-Unix targets; rename is the
    // durability boundary there.
    Ok(())
}
