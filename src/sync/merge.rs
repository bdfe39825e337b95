//! Concurrent update resolution
//!
//! Last-writer-wins on a monotonically increasing per-entry version.
//! Two different originators can produce the same version concurrently;
//! the higher originator id wins so that every replica picks the same
//! survivor. Tombstones take part like live values.

use super::Stamp;

/// Outcome of comparing a remote mutation against local state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// Overwrite local state and adopt the remote stamp
    Apply,

    /// Local state is at least as new
    Discard,
}

/// Decide whether a remote mutation with stamp `remote` replaces `local`
///
/// `local` is `None` when the path has never been seen.
pub fn resolve(local: Option<Stamp>, remote: Stamp) -> MergeDecision {
    match local {
        None => MergeDecision::Apply,
        Some(local) if remote > local => MergeDecision::Apply,
        Some(_) => MergeDecision::Discard,
    }
}
