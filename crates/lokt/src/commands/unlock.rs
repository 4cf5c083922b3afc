//! `lokt unlock` — release a named lock, or bulk-release by owner (§4.5.2, §6.5).

use clap::Args;
use lokt_core::engine::{self, ReleaseOptions};

use super::common;

#[derive(Args, Debug)]
pub struct UnlockArgs {
    /// Name of the lock to release. Omit when using --owner or --all-mine.
    pub name: Option<String>,

    /// Release regardless of ownership
    #[arg(long)]
    pub force: bool,

    /// Release only if the lock is stale (TTL-expired or dead-pid); error otherwise
    #[arg(long = "break-stale")]
    pub break_stale: bool,

    /// Release every lock owned by the given owner, instead of one by name
    #[arg(long, conflicts_with = "all_mine")]
    pub owner: Option<String>,

    /// Release every lock owned by the current identity's owner
    #[arg(long = "all-mine")]
    pub all_mine: bool,

    /// Emit machine-readable JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: UnlockArgs) -> i32 {
    let json = args.json;
    match run(&args) {
        Ok(released) => {
            print_result(&released, json);
            0
        }
        Err(e) => common::report_error(&e, json),
    }
}

enum Released {
    One(String),
    Many(Vec<String>),
}

fn print_result(released: &Released, json: bool) {
    match released {
        Released::One(name) => {
            if json {
                println!("{}", serde_json::json!({ "released": name }));
            } else {
                println!("released '{name}'");
            }
        }
        Released::Many(names) => {
            if json {
                println!("{}", serde_json::json!({ "released": names }));
            } else {
                println!("released {} lock(s): {}", names.len(), names.join(", "));
            }
        }
    }
}

fn run(args: &UnlockArgs) -> lokt_core::Result<Released> {
    if args.force && args.break_stale {
        return Err(lokt_core::LoktError::Usage("--force and --break-stale are mutually exclusive".into()));
    }
    let bulk = args.owner.is_some() || args.all_mine;
    if bulk && args.name.is_some() {
        return Err(lokt_core::LoktError::Usage(
            "a lock name and --owner/--all-mine are mutually exclusive".into(),
        ));
    }
    if bulk && (args.force || args.break_stale) {
        return Err(lokt_core::LoktError::Usage(
            "--owner/--all-mine cannot be combined with --force or --break-stale".into(),
        ));
    }

    let root = common::resolve_root()?;
    common::maybe_sweep(&root);
    let identity = common::resolve_identity();

    if bulk {
        let owner = args.owner.clone().unwrap_or_else(|| identity.owner.clone());
        let released = engine::release_by_owner(&root, &owner, &identity)?;
        return Ok(Released::Many(released));
    }

    let name = args
        .name
        .as_deref()
        .ok_or_else(|| lokt_core::LoktError::Usage("unlock requires a lock name, or --owner/--all-mine".into()))?;
    let opts = ReleaseOptions { force: args.force, break_stale: args.break_stale };
    engine::release(&root, name, &opts, &identity)?;
    Ok(Released::One(name.to_string()))
}
