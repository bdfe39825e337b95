//! Entry flags

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Flag bits carried with every entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EntryFlags(u8);

impl EntryFlags {
    pub const NONE: EntryFlags = EntryFlags(0x00);

    /// Survives a client-side disconnect reset and is written to snapshot files
    pub const PERSISTENT: EntryFlags = EntryFlags(0x01);

    /// A server drops updates and deletes for this entry coming from clients
    pub const READ_ONLY: EntryFlags = EntryFlags(0x02);

    const KNOWN: u8 = 0x03;

    /// Build from raw bits, dropping unknown ones
    pub fn from_bits(bits: u8) -> Self {
        EntryFlags(bits & Self::KNOWN)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: EntryFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn with(self, other: EntryFlags) -> Self {
        EntryFlags(self.0 | other.0)
    }

    pub fn without(self, other: EntryFlags) -> Self {
        EntryFlags(self.0 & !other.0)
    }

    pub fn is_persistent(&self) -> bool {
        self.contains(Self::PERSISTENT)
    }

    pub fn is_read_only(&self) -> bool {
        self.contains(Self::READ_ONLY)
    }
}

impl BitOr for EntryFlags {
    type Output = EntryFlags;

    fn bitor(self, rhs: EntryFlags) -> EntryFlags {
        self.with(rhs)
    }
}
