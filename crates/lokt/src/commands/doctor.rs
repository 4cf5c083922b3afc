//! `lokt doctor` — sanity-check the lock-store root (SPEC_FULL.md §C).

use clap::Args;

use super::common;

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Emit machine-readable JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: DoctorArgs) -> i32 {
    let json = args.json;
    match run() {
        Ok(report) => {
            let warnings = report.warnings.len();
            if json {
                println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
            } else {
                println!("root: {}", report.root);
                println!("writable: {}", report.writable);
                println!("round-trip ok: {}", report.round_trip_ok);
                if let Some(skew) = report.clock_skew_sec {
                    println!("clock skew vs root mtime: {skew}s");
                }
                for w in &report.warnings {
                    println!("warning: {w}");
                }
                if warnings == 0 {
                    println!("no problems found");
                }
            }
            if warnings > 0 { 1 } else { 0 }
        }
        Err(e) => common::report_error(&e, json),
    }
}

fn run() -> lokt_core::Result<lokt_core::introspect::DoctorReport> {
    let root = common::resolve_root()?;
    lokt_core::introspect::doctor(&root)
}
