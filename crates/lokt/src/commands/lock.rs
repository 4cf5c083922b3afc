//! `lokt lock` — acquire a named lock (§4.5.1, §6.5).

use clap::Args;
use lokt_core::engine::{self, AcquireOptions};
use lokt_core::wait;

use super::common::{self, LockFlags};

#[derive(Args, Debug)]
pub struct LockArgs {
    /// Name of the lock to acquire
    pub name: String,

    #[command(flatten)]
    pub flags: LockFlags,
}

pub fn execute(args: LockArgs) -> i32 {
    let json = args.flags.json;
    match run(args) {
        Ok(record) => {
            if json {
                println!("{}", serde_json::to_string(&record).unwrap_or_default());
            } else {
                println!("acquired '{}' (lock_id {})", record.name, record.lock_id);
            }
            0
        }
        Err(e) => common::report_error(&e, json),
    }
}

fn run(args: LockArgs) -> lokt_core::Result<lokt_core::LockRecord> {
    let ttl_sec = args.flags.ttl_sec()?;
    let timeout = args.flags.timeout_duration()?;
    let root = common::resolve_root()?;
    common::maybe_sweep(&root);
    let identity = common::resolve_identity();
    let opts = AcquireOptions { ttl_sec, metadata: args.flags.metadata() };

    if args.flags.wait {
        let deadline = timeout.unwrap_or(wait::DEFAULT_TIMEOUT);
        wait::wait_for_acquire(&root, &args.name, &opts, &identity, false, deadline, &|| false)
    } else {
        engine::acquire(&root, &args.name, &opts, &identity, false)
    }
}
