//! `lokt guard` — acquire a lock, run a child under it, release on every
//! exit path (§4.7). Builds the multi-threaded runtime the heartbeat/
//! signal/child-wait task mesh needs and blocks on it.

use clap::Args;
use lokt_core::engine::AcquireOptions;
use lokt_core::guard::{self, GuardOptions};

use super::common::{self, LockFlags};

#[derive(Args, Debug)]
pub struct GuardArgs {
    /// Name of the lock to guard
    pub name: String,

    #[command(flatten)]
    pub flags: LockFlags,

    /// The command to run under the lock, after `--`
    #[arg(last = true)]
    pub command: Vec<String>,
}

pub fn execute(args: GuardArgs) -> i32 {
    let json = args.flags.json;
    match try_run(args) {
        Ok(code) => code,
        Err(e) => common::report_error(&e, json),
    }
}

fn try_run(args: GuardArgs) -> lokt_core::Result<i32> {
    guard::validate_argv(&args.command)?;
    let ttl_sec = args.flags.ttl_sec()?;
    let timeout = args.flags.timeout_duration()?;
    let root = common::resolve_root()?;
    common::maybe_sweep(&root);
    let identity = common::resolve_identity();

    let lock_opts = AcquireOptions { ttl_sec, metadata: args.flags.metadata() };
    let guard_opts = GuardOptions { ttl_sec, wait: args.flags.wait, timeout };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| lokt_core::LoktError::Operational(format!("failed to start async runtime: {e}")))?;

    runtime.block_on(guard::run(&root, &args.name, lock_opts, guard_opts, identity, args.command))
}
