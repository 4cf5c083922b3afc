//! Append-only audit journal — §4.4, §6.4.
//!
//! Grounded on the teacher's `event_log.rs` (JSONL append writer shape,
//! adapted: the audit log is append-only forever, no rotation — spec.md
//! names no rotation policy) and `commands/tail.rs` (truncation-aware
//! follow loop).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LoktError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Acquire,
    Renew,
    Release,
    Deny,
    Freeze,
    Unfreeze,
    ForceBreak,
    ForceUnfreeze,
    BreakStale,
    Sweep,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Acquire => "acquire",
            EventKind::Renew => "renew",
            EventKind::Release => "release",
            EventKind::Deny => "deny",
            EventKind::Freeze => "freeze",
            EventKind::Unfreeze => "unfreeze",
            EventKind::ForceBreak => "force-break",
            EventKind::ForceUnfreeze => "force-unfreeze",
            EventKind::BreakStale => "break-stale",
            EventKind::Sweep => "sweep",
        }
    }

    /// Whether this event kind reflects a visible state change requiring a
    /// durable (fsync'd) write before the causing operation returns — §4.4.
    pub fn is_durable(&self) -> bool {
        !matches!(self, EventKind::Deny | EventKind::Renew | EventKind::Sweep)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub ts: DateTime<Utc>,
    pub event: String,
    pub name: String,
    pub owner: String,
    pub host: String,
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_sec: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<HashMap<String, Value>>,
}

/// Append one event to `<root>/audit.log`. `durable` controls whether the
/// write is fsync'd before returning (see `EventKind::is_durable`).
/// Failures are the caller's to decide whether to swallow — the engine
/// swallows audit-write failures per §7, but the function itself reports
/// them so callers can log at `warn`.
pub fn append(log_path: &Path, event: &AuditEvent, durable: bool) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LoktError::io(parent, e))?;
    }
    let mut line = serde_json::to_string(event).map_err(|e| LoktError::json(log_path, e))?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| LoktError::io(log_path, e))?;

    file.write_all(line.as_bytes()).map_err(|e| LoktError::io(log_path, e))?;
    if durable {
        file.sync_all().map_err(|e| LoktError::io(log_path, e))?;
    }
    Ok(())
}

/// Parse `since` as either a relative duration (`1h30m`, `45m`, `2d`) or an
/// RFC3339 absolute timestamp.
pub fn parse_since(s: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    let dur = parse_relative_duration(s)?;
    Ok(now - dur)
}

fn parse_relative_duration(s: &str) -> Result<chrono::Duration> {
    let mut total = chrono::Duration::zero();
    let mut num = String::new();
    let mut saw_any = false;
    for c in s.chars() {
        if c.is_ascii_digit() {
            num.push(c);
            continue;
        }
        let n: i64 = num
            .parse()
            .map_err(|_| LoktError::Usage(format!("invalid duration '{s}'")))?;
        num.clear();
        let unit = match c {
            'd' => chrono::Duration::days(n),
            'h' => chrono::Duration::hours(n),
            'm' => chrono::Duration::minutes(n),
            's' => chrono::Duration::seconds(n),
            _ => return Err(LoktError::Usage(format!("invalid duration unit '{c}' in '{s}'"))),
        };
        total = total + unit;
        saw_any = true;
    }
    if !num.is_empty() || !saw_any {
        return Err(LoktError::Usage(format!("invalid duration '{s}'")));
    }
    Ok(total)
}

/// Historical query: stream the file, parse each line, drop malformed lines
/// silently, filter by `since` and optionally by `name` — §4.4.
pub fn query(
    log_path: &Path,
    since: Option<DateTime<Utc>>,
    name_filter: Option<&str>,
) -> Result<Vec<AuditEvent>> {
    let file = match File::open(log_path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LoktError::io(log_path, e)),
    };
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for line in reader.lines() {
        let Ok(line) = line else { continue };
        if line.trim().is_empty() {
            continue;
        }
        let Ok(ev) = serde_json::from_str::<AuditEvent>(&line) else { continue };
        if let Some(since) = since {
            if ev.ts < since {
                continue;
            }
        }
        if let Some(n) = name_filter {
            if ev.name != n {
                continue;
            }
        }
        out.push(ev);
    }
    Ok(out)
}

/// Cancellation hook for `follow`. A closure is used rather than a
/// dedicated trait to keep the sync/async boundary thin — the CLI layer
/// wires this to a signal-aware flag.
pub trait ShouldStop {
    fn should_stop(&self) -> bool;
}

impl<F: Fn() -> bool> ShouldStop for F {
    fn should_stop(&self) -> bool {
        self()
    }
}

/// Follow/tail mode — §4.4. Polls at ~200ms, detects truncation (seek to 0
/// and resume) and rotation/deletion (stat fails not-found, reopen on
/// reappearance), applies the name filter, and calls `on_event` for each
/// matching line. Returns when `stop.should_stop()` becomes true.
pub fn follow(
    log_path: &Path,
    name_filter: Option<&str>,
    stop: &impl ShouldStop,
    mut on_event: impl FnMut(&AuditEvent),
) -> Result<()> {
    let poll_interval = Duration::from_millis(200);
    let mut file: Option<File> = None;
    let mut pos: u64 = 0;

    loop {
        if stop.should_stop() {
            return Ok(());
        }

        match &mut file {
            None => {
                if let Ok(f) = File::open(log_path) {
                    let mut f = f;
                    pos = f.seek(SeekFrom::End(0)).unwrap_or(0);
                    file = Some(f);
                } else {
                    std::thread::sleep(poll_interval);
                    continue;
                }
            }
            Some(f) => {
                let len = match f.metadata() {
                    Ok(m) => m.len(),
                    Err(_) => {
                        // Rotation/deletion: stat failed. Drop the handle and
                        // reopen next tick when the path reappears.
                        file = None;
                        pos = 0;
                        std::thread::sleep(poll_interval);
                        continue;
                    }
                };

                if len < pos {
                    // Truncation: seek to 0 and resume.
                    pos = 0;
                }

                if f.seek(SeekFrom::Start(pos)).is_err() {
                    file = None;
                    pos = 0;
                    std::thread::sleep(poll_interval);
                    continue;
                }

                let mut buf = String::new();
                if f.read_to_string(&mut buf).is_ok() {
                    let mut consumed = 0u64;
                    for line in buf.split_inclusive('\n') {
                        if !line.ends_with('\n') {
                            break; // incomplete trailing line; wait for more
                        }
                        consumed += line.len() as u64;
                        let trimmed = line.trim_end();
                        if trimmed.is_empty() {
                            continue;
                        }
                        if let Ok(ev) = serde_json::from_str::<AuditEvent>(trimmed) {
                            if name_filter.is_none_or(|n| ev.name == n) {
                                on_event(&ev);
                            }
                        }
                    }
                    pos += consumed;
                }
            }
        }

        std::thread::sleep(poll_interval);
    }
}
