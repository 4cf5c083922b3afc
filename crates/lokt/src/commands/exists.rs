//! `lokt exists` — check whether a named lock exists (§4.8).

use clap::Args;

use super::common;

#[derive(Args, Debug)]
pub struct ExistsArgs {
    /// Name to check
    pub name: String,

    /// Emit machine-readable JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: ExistsArgs) -> i32 {
    let json = args.json;
    match run(&args) {
        Ok(()) => {
            if json {
                println!("{}", serde_json::json!({ "exists": true, "name": args.name }));
            } else {
                println!("'{}' exists", args.name);
            }
            0
        }
        Err(e) => common::report_error(&e, json),
    }
}

fn run(args: &ExistsArgs) -> lokt_core::Result<()> {
    let root = common::resolve_root()?;
    common::maybe_sweep(&root);
    lokt_core::introspect::exists(&root, &args.name)
}
