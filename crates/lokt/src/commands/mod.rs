//! CLI command dispatch and execution — mirrors the teacher's
//! `atm/src/commands/mod.rs` `Cli`/`Commands` shape.

use clap::{Parser, Subcommand};

mod audit;
mod common;
mod doctor;
mod exists;
mod freeze;
mod guard;
mod lock;
mod status;
mod unfreeze;
mod unlock;
mod version;
mod why;

/// lokt - decentralized, file-based named mutex coordination
#[derive(Parser, Debug)]
#[command(
    name = "lokt",
    version,
    about = "Decentralized, file-based named mutex coordination",
    long_about = "Filesystem-atomicity-based named-mutex locks coordinated across \
                  independent processes with no daemon and no network service."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Acquire a named lock
    Lock(lock::LockArgs),

    /// Release a named lock
    Unlock(unlock::UnlockArgs),

    /// Show lock/freeze status
    Status(status::StatusArgs),

    /// Acquire a lock, run a child command under it, and release on exit
    Guard(guard::GuardArgs),

    /// Block a name from being guard-acquired
    Freeze(freeze::FreezeArgs),

    /// Remove a freeze
    Unfreeze(unfreeze::UnfreezeArgs),

    /// Query or follow the audit journal
    Audit(audit::AuditArgs),

    /// Diagnose why a name is (or isn't) blocked
    Why(why::WhyArgs),

    /// Sanity-check the lock-store root
    Doctor(doctor::DoctorArgs),

    /// Check whether a named lock exists
    Exists(exists::ExistsArgs),

    /// Print version information
    Version(version::VersionArgs),
}

impl Cli {
    /// Execute the CLI command, returning the process exit code — §6.7.
    pub fn execute(self) -> i32 {
        match self.command {
            Commands::Lock(args) => lock::execute(args),
            Commands::Unlock(args) => unlock::execute(args),
            Commands::Status(args) => status::execute(args),
            Commands::Guard(args) => guard::execute(args),
            Commands::Freeze(args) => freeze::execute(args),
            Commands::Unfreeze(args) => unfreeze::execute(args),
            Commands::Audit(args) => audit::execute(args),
            Commands::Why(args) => why::execute(args),
            Commands::Doctor(args) => doctor::execute(args),
            Commands::Exists(args) => exists::execute(args),
            Commands::Version(args) => version::execute(args),
        }
    }
}
