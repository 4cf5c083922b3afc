//! `lokt audit` — query or follow the audit journal (§4.4).
//!
//! Grounded on the teacher's `commands/tail.rs` follow-poll idiom, reused
//! one layer down in `lokt_core::audit::follow`. The SIGINT/SIGTERM flag
//! below is grounded on the same `kill(pid, 0)`-style raw `libc` signal use
//! already in `lokt_core::liveness`/`lokt_core::guard`, scoped to this
//! command since `audit --follow` runs synchronously with no tokio runtime.

use std::sync::atomic::{AtomicBool, Ordering};

use clap::Args;
use lokt_core::audit;

use super::common;

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Restrict to events for this lock/freeze name
    pub name: Option<String>,

    /// Only show events at or after this time: RFC3339, or relative like "1h30m"
    #[arg(long)]
    pub since: Option<String>,

    /// Stream new events as they're appended, like `tail -f`
    #[arg(long)]
    pub follow: bool,

    /// Emit machine-readable JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: AuditArgs) -> i32 {
    let json = args.json;
    match run(&args) {
        Ok(()) => 0,
        Err(e) => common::report_error(&e, json),
    }
}

fn run(args: &AuditArgs) -> lokt_core::Result<()> {
    let root = common::resolve_root()?;
    let log_path = lokt_core::root::audit_log_path(&root);
    let json = args.json;

    if args.follow {
        let stop_flag = install_stop_flag();
        let stop = || stop_flag.load(Ordering::Relaxed);
        return audit::follow(&log_path, args.name.as_deref(), &stop, |event| print_event(event, json));
    }

    let since = match &args.since {
        Some(s) => Some(audit::parse_since(s, chrono::Utc::now())?),
        None => None,
    };
    let events = audit::query(&log_path, since, args.name.as_deref())?;
    for event in &events {
        print_event(event, json);
    }
    Ok(())
}

fn print_event(event: &audit::AuditEvent, json: bool) {
    if json {
        println!("{}", serde_json::to_string(event).unwrap_or_default());
    } else {
        println!("{} {} name={} owner={}@{} pid={}", event.ts.to_rfc3339(), event.event, event.name, event.owner, event.host, event.pid);
    }
}

// extern "C" signal handlers can't capture state, so the flag they flip has
// to be a process-wide static; `install_stop_flag` just hands back a
// reference to it.
static STOP: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_signal(_signum: libc::c_int) {
    STOP.store(true, Ordering::Relaxed);
}

/// Install SIGINT/SIGTERM handlers that flip a shared flag, so `--follow`'s
/// poll loop can exit cleanly on interrupt — §4.4/§5.
#[cfg(unix)]
fn install_stop_flag() -> &'static AtomicBool {
    unsafe {
        libc::signal(libc::SIGINT, on_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_signal as libc::sighandler_t);
    }
    &STOP
}

#[cfg(not(unix))]
fn install_stop_flag() -> &'static AtomicBool {
    &STOP
}
