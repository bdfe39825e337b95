//! Version stamps and node identity

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a participant, used as the originator of mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    /// A fresh random identity
    pub fn random() -> Self {
        NodeId(Uuid::new_v4())
    }

    pub fn from_u128(raw: u128) -> Self {
        NodeId(Uuid::from_u128(raw))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The ordering key of a mutation
///
/// Ordered by version first, then by originator for equal versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp {
    pub version: u64,
    pub origin: NodeId,
}

impl Stamp {
    pub fn new(version: u64, origin: NodeId) -> Self {
        Self { version, origin }
    }
}
