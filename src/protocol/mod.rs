//! Protocol Module
//!
//! Defines the wire protocol spoken between peers.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬──────────┬─────────────────────────────┐
//! │ Type (1) │ Len (4)  │ CRC (4)  │     Payload (bincode)       │
//! └──────────┴──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Message Types
//! - 0x00: KEEPALIVE      - Payload: empty
//! - 0x01: HELLO          - Payload: node id, name, role
//! - 0x03: SNAPSHOT_DONE  - Payload: empty
//! - 0x10: ENTRY_UPDATE   - Payload: path, value, version, flags, origin
//! - 0x13: ENTRY_DELETE   - Payload: path, version, origin
//!
//! ### Error Handling
//! - Unknown type, CRC mismatch, bad payload: the frame was read in full,
//!   so it is dropped and the stream stays usable
//! - Oversized length or EOF mid-frame: the stream is unusable

mod codec;
mod message;

pub use codec::{
    decode_frame, decode_message, encode_message, read_frame, read_message, write_message, Frame,
    HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use message::{EntryDelete, EntryUpdate, Hello, Message, MessageType};
