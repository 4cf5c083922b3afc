//! `lokt status` — enumerate or inspect lock/freeze records (§4.8).
//!
//! Grounded on the teacher's `commands/status.rs` dual JSON/text output
//! shape and age-formatting idiom.

use clap::Args;
use lokt_core::introspect::{self, StatusEntry};

use super::common;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Name to inspect; omit to list every lock and freeze
    pub name: Option<String>,

    /// Emit machine-readable JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,

    /// Remove TTL-expired records as a side effect and report how many
    #[arg(long = "prune-expired")]
    pub prune_expired: bool,
}

pub fn execute(args: StatusArgs) -> i32 {
    let json = args.json;
    match run(&args) {
        Ok(Output::One(entry)) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&entry).unwrap_or_default());
            } else {
                print_text(&entry);
            }
            0
        }
        Ok(Output::Many(entries, pruned)) => {
            if json {
                let body = serde_json::json!({ "entries": entries, "pruned": pruned });
                println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
            } else {
                if let Some(n) = pruned {
                    println!("pruned {n} expired record(s)");
                }
                for e in &entries {
                    print_text(e);
                }
                if entries.is_empty() {
                    println!("no locks or freezes held");
                }
            }
            0
        }
        Err(e) => common::report_error(&e, json),
    }
}

enum Output {
    /// A single-name lookup — §4.8 "a single-name form returns exactly one
    /// record". Serialized as a bare object, never array- or envelope-wrapped.
    One(StatusEntry),
    /// The no-name listing form — §4.8 "`--json` emits an array of records".
    Many(Vec<StatusEntry>, Option<usize>),
}

fn run(args: &StatusArgs) -> lokt_core::Result<Output> {
    let root = common::resolve_root()?;
    common::maybe_sweep(&root);
    let identity = common::resolve_identity();

    if let Some(name) = &args.name {
        // --prune-expired has no bearing on a single-name lookup: pruning is
        // a listing-wide side effect, so run it first for consistency, then
        // look the name up fresh.
        if args.prune_expired {
            introspect::prune_expired(&root);
        }
        let entry = introspect::status_one(&root, name, &identity.host)?;
        return Ok(Output::One(entry));
    }

    let pruned = if args.prune_expired { Some(introspect::prune_expired(&root)) } else { None };
    let entries = introspect::status_all(&root, &identity.host);
    Ok(Output::Many(entries, pruned))
}

fn print_text(e: &StatusEntry) {
    let remaining = match e.remaining_sec {
        Some(r) if r >= 0 => format!("{r}s remaining"),
        Some(_) => "expired".to_string(),
        None => "no TTL".to_string(),
    };
    println!(
        "{:<8} {:<20} owner={:<12} host={:<12} pid={:<8} age={}s {} pid={:?}",
        e.kind, e.name, e.owner, e.host, e.pid, e.age_sec, remaining, e.pid_status
    );
}
