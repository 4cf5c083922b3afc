//! Core library for `lokt`: a decentralized, filesystem-atomicity-based
//! named-mutex coordination service. See `SPEC_FULL.md` at the workspace
//! root for the full component design; each module doc comment names the
//! spec section and corpus file it is grounded on.

pub mod audit;
pub mod codec;
pub mod engine;
pub mod error;
pub mod guard;
pub mod identity;
pub mod introspect;
pub mod liveness;
pub mod logging;
pub mod names;
pub mod record;
pub mod root;
pub mod sweep;
pub mod wait;

pub use error::{LoktError, Result};
pub use identity::Identity;
pub use record::{FreezeRecord, LockRecord};
