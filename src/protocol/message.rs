//! Message definitions
//!
//! Every message body is a serde struct; the frame header carries the type.

use serde::{Deserialize, Serialize};

use crate::entry::EntryFlags;
use crate::sync::{NodeId, Role};
use crate::value::Value;

/// Message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Keepalive = 0x00,
    Hello = 0x01,
    SnapshotDone = 0x03,
    EntryUpdate = 0x10,
    EntryDelete = 0x13,
}

impl MessageType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(MessageType::Keepalive),
            0x01 => Some(MessageType::Hello),
            0x03 => Some(MessageType::SnapshotDone),
            0x10 => Some(MessageType::EntryUpdate),
            0x13 => Some(MessageType::EntryDelete),
            _ => None,
        }
    }
}

/// Handshake, the first frame each side sends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    pub node_id: NodeId,
    pub name: String,
    pub role: Role,
}

/// Create or overwrite an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub path: String,
    pub value: Value,
    pub version: u64,
    pub flags: EntryFlags,
    pub origin: NodeId,
}

/// Delete an entry, leaving a tombstone at `version`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDelete {
    pub path: String,
    pub version: u64,
    pub origin: NodeId,
}

/// A decoded message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Idle-link heartbeat
    Keepalive,

    Hello(Hello),

    /// End of the initial full-state exchange
    SnapshotDone,

    Update(EntryUpdate),

    Delete(EntryDelete),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Keepalive => MessageType::Keepalive,
            Message::Hello(_) => MessageType::Hello,
            Message::SnapshotDone => MessageType::SnapshotDone,
            Message::Update(_) => MessageType::EntryUpdate,
            Message::Delete(_) => MessageType::EntryDelete,
        }
    }
}
