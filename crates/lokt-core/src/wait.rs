//! Bounded-wait acquisition — §4.6.
//!
//! Grounded on the teacher's `io/lock.rs` exponential-backoff shape
//! (retried exclusive-create, doubling interval) and `commands/wait.rs`'s
//! `Instant`-deadline / result-enum idiom.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::engine::{self, AcquireOptions};
use crate::error::{HolderSnapshot, LoktError, Result};
use crate::identity::Identity;
use crate::record::LockRecord;

const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Cancellation hook, checked at every suspension point (the sleep between
/// retries) — §5 "Suspension points".
pub trait Cancellation {
    fn is_canceled(&self) -> bool;
}

impl<F: Fn() -> bool> Cancellation for F {
    fn is_canceled(&self) -> bool {
        self()
    }
}

/// Attempt `acquire` repeatedly with exponential backoff (50ms → 1s cap)
/// until success, cancellation, or `deadline` elapses — §4.6.
pub fn wait_for_acquire(
    root_dir: &Path,
    name: &str,
    opts: &AcquireOptions,
    identity: &Identity,
    guarded: bool,
    deadline: Duration,
    cancel: &impl Cancellation,
) -> Result<LockRecord> {
    let start = Instant::now();
    let mut backoff = INITIAL_BACKOFF;
    let mut last_holder: Option<HolderSnapshot> = None;

    loop {
        match engine::acquire(root_dir, name, opts, identity, guarded) {
            Ok(record) => return Ok(record),
            Err(LoktError::Held { holder }) | Err(LoktError::Frozen { holder }) => {
                last_holder = Some(holder);
            }
            Err(other) => return Err(other),
        }

        if cancel.is_canceled() {
            return Err(LoktError::Canceled);
        }

        if start.elapsed() >= deadline {
            let holder = last_holder.unwrap_or(HolderSnapshot {
                owner: "unknown".into(),
                host: "unknown".into(),
                pid: 0,
                lock_id: "unknown".into(),
            });
            return Err(LoktError::Timeout { holder });
        }

        let remaining = deadline.saturating_sub(start.elapsed());
        std::thread::sleep(backoff.min(remaining));
        backoff = (backoff * 2).min(MAX_BACKOFF);

        if cancel.is_canceled() {
            return Err(LoktError::Canceled);
        }
    }
}
