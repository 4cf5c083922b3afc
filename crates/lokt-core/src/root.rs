//! Root-directory discovery — §6.2.
//!
//! Precedence: `LOKT_ROOT` env var, then `git rev-parse --git-common-dir`
//! joined with `/lokt`, then `<cwd>/.lokt`. Grounded on the teacher's
//! env-var-first idiom (`home.rs`) and its git-subprocess pattern
//! (`atm-agent-mcp/src/context.rs`), adapted to a synchronous
//! `std::process::Command` since lokt commands are short-lived and
//! entirely synchronous outside the guard supervisor.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{LoktError, Result};

/// Resolve the lock-store root directory, in strict precedence order.
pub fn discover_root(cwd: &Path) -> PathBuf {
    if let Ok(v) = std::env::var("LOKT_ROOT") {
        if !v.is_empty() {
            return PathBuf::from(v);
        }
    }

    if let Some(git_common_dir) = git_common_dir(cwd) {
        let joined = if git_common_dir.is_absolute() {
            git_common_dir
        } else {
            cwd.join(git_common_dir)
        };
        return joined.join("lokt");
    }

    cwd.join(".lokt")
}

fn git_common_dir(cwd: &Path) -> Option<PathBuf> {
    let output = Command::new("git")
        .args(["rev-parse", "--git-common-dir"])
        .current_dir(cwd)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let s = String::from_utf8(output.stdout).ok()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

/// Ensure `root/locks` and `root/freezes` exist with mode 0700, creating
/// them on demand. Mutating commands call this before touching either
/// subdirectory; read-only introspection does not.
pub fn ensure_root_layout(root: &Path) -> Result<()> {
    for sub in ["locks", "freezes"] {
        let dir = root.join(sub);
        create_dir_0700(&dir)?;
    }
    Ok(())
}

#[cfg(unix)]
fn create_dir_0700(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    if dir.exists() {
        return Ok(());
    }
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(|e| LoktError::io(dir, e))
}

#[cfg(not(unix))]
fn create_dir_0700(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|e| LoktError::io(dir, e))
}

pub fn locks_dir(root: &Path) -> PathBuf {
    root.join("locks")
}

pub fn freezes_dir(root: &Path) -> PathBuf {
    root.join("freezes")
}

pub fn audit_log_path(root: &Path) -> PathBuf {
    root.join("audit.log")
}

pub fn lock_path(root: &Path, name: &str) -> PathBuf {
    locks_dir(root).join(format!("{name}.json"))
}

pub fn freeze_path(root: &Path, name: &str) -> PathBuf {
    freezes_dir(root).join(format!("{name}.json"))
}
