//! Shared CLI plumbing: flags common to `lock`/`guard` (§6.5), root/identity
//! resolution, and the duration/`--meta` parsers behind them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use lokt_core::error::LoktError;
use lokt_core::identity::Identity;

/// Flags shared by `lock` and `guard` — §6.5.
#[derive(Args, Debug, Clone, Default)]
pub struct LockFlags {
    /// Lease duration before the lock is considered stale (e.g. "300", "5m", "1h30m")
    #[arg(long)]
    pub ttl: Option<String>,

    /// Block until the lock becomes available instead of failing immediately
    #[arg(long)]
    pub wait: bool,

    /// Give up waiting after this long; requires --wait
    #[arg(long)]
    pub timeout: Option<String>,

    /// Emit machine-readable JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,

    /// Attach metadata as key=value (repeatable; last value for a key wins)
    #[arg(long = "meta", value_parser = parse_meta_pair)]
    pub meta: Vec<(String, String)>,
}

impl LockFlags {
    pub fn ttl_sec(&self) -> Result<u64, LoktError> {
        match &self.ttl {
            None => Ok(0),
            Some(s) => {
                let secs = parse_duration_secs(s)?;
                if secs == 0 {
                    return Err(LoktError::Usage("--ttl must be positive".into()));
                }
                Ok(secs)
            }
        }
    }

    pub fn timeout_duration(&self) -> Result<Option<Duration>, LoktError> {
        match &self.timeout {
            None => {
                if !self.wait {
                    return Ok(None);
                }
                Ok(None)
            }
            Some(_) if !self.wait => Err(LoktError::Usage("--timeout requires --wait".into())),
            Some(s) => {
                let secs = parse_duration_secs(s)?;
                if secs == 0 {
                    return Err(LoktError::Usage("--timeout must be positive".into()));
                }
                Ok(Some(Duration::from_secs(secs)))
            }
        }
    }

    pub fn metadata(&self) -> Option<HashMap<String, String>> {
        if self.meta.is_empty() {
            return None;
        }
        let mut map = HashMap::new();
        for (k, v) in &self.meta {
            map.insert(k.clone(), v.clone());
        }
        Some(map)
    }
}

fn parse_meta_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("invalid --meta '{s}', expected key=value")),
    }
}

/// Parse a bare integer ("300") or a composite suffixed duration
/// ("1h30m", "45m", "2d") into whole seconds.
pub fn parse_duration_secs(s: &str) -> Result<u64, LoktError> {
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(secs);
    }

    let mut total: u64 = 0;
    let mut num = String::new();
    let mut saw_any = false;
    for c in s.chars() {
        if c.is_ascii_digit() {
            num.push(c);
            continue;
        }
        let n: u64 = num.parse().map_err(|_| LoktError::Usage(format!("invalid duration '{s}'")))?;
        num.clear();
        let secs = match c {
            'd' => n * 86_400,
            'h' => n * 3_600,
            'm' => n * 60,
            's' => n,
            _ => return Err(LoktError::Usage(format!("invalid duration unit '{c}' in '{s}'"))),
        };
        total += secs;
        saw_any = true;
    }
    if !num.is_empty() || !saw_any {
        return Err(LoktError::Usage(format!("invalid duration '{s}'")));
    }
    Ok(total)
}

/// Resolve the lock-store root per §6.2.
pub fn resolve_root() -> Result<PathBuf, LoktError> {
    let cwd = std::env::current_dir().map_err(|e| LoktError::io(".", e))?;
    Ok(lokt_core::root::discover_root(&cwd))
}

pub fn resolve_identity() -> Identity {
    Identity::current()
}

/// Run the background sweep before a sweep-enabled command's main work —
/// §4.6. Failures are never surfaced; sweep is best-effort.
pub fn maybe_sweep(root: &std::path::Path) {
    lokt_core::sweep::sweep_if_enabled(root);
}

/// Print an error the way both `--json` and text modes expect, and return
/// its exit code — the single place the CLI maps `LoktError` to process
/// exit status, per §6.7/§7.
pub fn report_error(err: &LoktError, json: bool) -> i32 {
    if json {
        let body = serde_json::json!({ "error": err.to_string() });
        eprintln!("{}", serde_json::to_string(&body).unwrap_or_else(|_| err.to_string()));
    } else {
        eprintln!("lokt: {err}");
    }
    err.exit_code()
}
