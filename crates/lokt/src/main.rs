//! lokt - decentralized, file-based named mutex coordination
//!
//! A thin CLI over `lokt-core`'s filesystem-atomicity-based lock engine:
//! acquire, release, renew, freeze, guard a child process, and inspect
//! lock/freeze state, all coordinated through plain files under a
//! discovered root directory — no daemon, no network service.

use clap::Parser;

mod commands;

use commands::Cli;

fn main() {
    lokt_core::logging::init();
    let cli = Cli::parse();
    let code = cli.execute();
    std::process::exit(code);
}
