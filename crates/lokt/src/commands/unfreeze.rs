//! `lokt unfreeze` — remove a freeze (§4.5.4).

use clap::Args;
use lokt_core::engine;

use super::common;

#[derive(Args, Debug)]
pub struct UnfreezeArgs {
    /// Name to unfreeze
    pub name: String,

    /// Unfreeze regardless of ownership
    #[arg(long)]
    pub force: bool,

    /// Emit machine-readable JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: UnfreezeArgs) -> i32 {
    let json = args.json;
    match run(&args) {
        Ok(()) => {
            if json {
                println!("{}", serde_json::json!({ "unfrozen": args.name }));
            } else {
                println!("unfroze '{}'", args.name);
            }
            0
        }
        Err(e) => common::report_error(&e, json),
    }
}

fn run(args: &UnfreezeArgs) -> lokt_core::Result<()> {
    let root = common::resolve_root()?;
    common::maybe_sweep(&root);
    let identity = common::resolve_identity();
    engine::unfreeze(&root, &args.name, args.force, &identity)
}
