//! `lokt freeze` — block a name from being guard-acquired (§4.5.4).

use clap::Args;
use lokt_core::engine;

use super::common;

#[derive(Args, Debug)]
pub struct FreezeArgs {
    /// Name to freeze
    pub name: String,

    /// How long the freeze lasts (e.g. "300", "5m", "1h")
    #[arg(long)]
    pub ttl: String,

    /// Emit machine-readable JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: FreezeArgs) -> i32 {
    let json = args.json;
    match run(&args) {
        Ok(record) => {
            if json {
                println!("{}", serde_json::to_string(&record).unwrap_or_default());
            } else {
                println!("froze '{}' for {}s", record.name, record.ttl_sec);
            }
            0
        }
        Err(e) => common::report_error(&e, json),
    }
}

fn run(args: &FreezeArgs) -> lokt_core::Result<lokt_core::LockRecord> {
    let ttl_sec = common::parse_duration_secs(&args.ttl)?;
    let root = common::resolve_root()?;
    common::maybe_sweep(&root);
    let identity = common::resolve_identity();
    engine::freeze(&root, &args.name, ttl_sec, &identity)
}
