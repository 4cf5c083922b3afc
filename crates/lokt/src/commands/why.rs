//! `lokt why` — diagnose why a name is (or isn't) blocked (§4.8).

use clap::Args;

use super::common;

#[derive(Args, Debug)]
pub struct WhyArgs {
    /// Name to diagnose
    pub name: String,

    /// Emit machine-readable JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: WhyArgs) -> i32 {
    let json = args.json;
    match run(&args) {
        Ok(diagnosis) => {
            let blocked = diagnosis.blocked;
            if json {
                println!("{}", serde_json::to_string_pretty(&diagnosis).unwrap_or_default());
            } else {
                let color = use_color();
                let reasons: Vec<String> = diagnosis.reasons.iter().map(|r| format!("{r:?}")).collect();
                println!("{}: {}", diagnosis.name, reasons.join(", "));
                for cmd in &diagnosis.suggested_commands {
                    if color {
                        println!("  try: \x1b[36m{cmd}\x1b[0m");
                    } else {
                        println!("  try: {cmd}");
                    }
                }
            }
            if blocked { 2 } else { 0 }
        }
        Err(e) => common::report_error(&e, json),
    }
}

fn run(args: &WhyArgs) -> lokt_core::Result<lokt_core::introspect::Diagnosis> {
    let root = common::resolve_root()?;
    common::maybe_sweep(&root);
    let identity = common::resolve_identity();
    lokt_core::introspect::why(&root, &args.name, &identity)
}

/// Cosmetic only — never affects `--json` output or exit codes.
fn use_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::io::IsTerminal::is_terminal(&std::io::stdout())
}
