//! Sync Protocol Module
//!
//! Keeps every participant's table converging on the same state.
//!
//! ## Algorithm
//! - Every mutation carries `(path, value, version, originator)`
//! - A remote mutation is applied iff its stamp beats the local one
//!   (see [`merge::resolve`]); otherwise it is discarded
//! - Local mutations bump the version by one and are queued for every
//!   peer without waiting for acknowledgement
//! - A server relays each applied remote mutation to its other peers
//!
//! Conflict resolution is keyed on the per-entry counter, never on
//! wall-clock time.

mod engine;
pub mod merge;
mod peers;
mod stamp;

pub use engine::{Role, SyncEngine};
pub use merge::{resolve, MergeDecision};
pub use peers::{PeerId, PeerSet};
pub use stamp::{NodeId, Stamp};
