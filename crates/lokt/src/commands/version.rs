//! `lokt version` — print crate version (§6.5, SPEC_FULL.md §C).

use clap::Args;

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Emit machine-readable JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: VersionArgs) -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    if args.json {
        println!("{}", serde_json::json!({ "version": version }));
    } else {
        println!("lokt {version}");
    }
    0
}
