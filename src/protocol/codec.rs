//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! Reading is split in two steps so callers can tell a bad frame (drop it,
//! keep going) from a broken stream (close the connection):
//! - [`read_frame`] pulls one length-delimited frame off the stream
//! - [`decode_frame`] checks the CRC and decodes the payload

use std::io::{Read, Write};

use bytes::{BufMut, BytesMut};

use super::{EntryDelete, EntryUpdate, Hello, Message, MessageType};
use crate::error::{Result, SyncError};

/// Header size: 1 byte type + 4 bytes length + 4 bytes CRC
pub const HEADER_SIZE: usize = 9;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// A raw frame as read off the stream
#[derive(Debug, Clone)]
pub struct Frame {
    pub type_byte: u8,
    pub crc: u32,
    pub payload: Vec<u8>,
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a message to bytes
///
/// Format: type (1) + payload_len (4) + crc (4) + payload
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    let payload = match message {
        Message::Keepalive | Message::SnapshotDone => Vec::new(),
        Message::Hello(hello) => bincode::serialize(hello)?,
        Message::Update(update) => bincode::serialize(update)?,
        Message::Delete(delete) => bincode::serialize(delete)?,
    };

    if payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(SyncError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_u8(message.message_type() as u8);
    buf.put_u32(payload.len() as u32);
    buf.put_u32(crc32fast::hash(&payload));
    buf.put_slice(&payload);

    Ok(buf.to_vec())
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a message from a complete byte buffer
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    if bytes.len() < HEADER_SIZE {
        return Err(SyncError::Protocol(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let (type_byte, payload_len, crc) = parse_header(&bytes[..HEADER_SIZE])?;

    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(SyncError::Protocol(format!(
            "Incomplete payload: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    decode_frame(&Frame {
        type_byte,
        crc,
        payload: bytes[HEADER_SIZE..total_len].to_vec(),
    })
}

/// Validate and decode a frame
pub fn decode_frame(frame: &Frame) -> Result<Message> {
    let actual = crc32fast::hash(&frame.payload);
    if actual != frame.crc {
        return Err(SyncError::Protocol(format!(
            "CRC mismatch: header 0x{:08x}, payload 0x{:08x}",
            frame.crc, actual
        )));
    }

    let message_type = MessageType::from_byte(frame.type_byte).ok_or_else(|| {
        SyncError::Protocol(format!("Unknown message type: 0x{:02x}", frame.type_byte))
    })?;

    let payload = frame.payload.as_slice();
    let message = match message_type {
        MessageType::Keepalive => {
            expect_empty(payload, "KEEPALIVE")?;
            Message::Keepalive
        }
        MessageType::SnapshotDone => {
            expect_empty(payload, "SNAPSHOT_DONE")?;
            Message::SnapshotDone
        }
        MessageType::Hello => Message::Hello(decode_body::<Hello>(payload, "HELLO")?),
        MessageType::EntryUpdate => {
            Message::Update(decode_body::<EntryUpdate>(payload, "ENTRY_UPDATE")?)
        }
        MessageType::EntryDelete => {
            Message::Delete(decode_body::<EntryDelete>(payload, "ENTRY_DELETE")?)
        }
    };

    Ok(message)
}

fn parse_header(header: &[u8]) -> Result<(u8, usize, u32)> {
    let type_byte = header[0];
    let payload_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    let crc = u32::from_be_bytes([header[5], header[6], header[7], header[8]]);

    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(SyncError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    Ok((type_byte, payload_len as usize, crc))
}

fn expect_empty(payload: &[u8], name: &str) -> Result<()> {
    if !payload.is_empty() {
        return Err(SyncError::Protocol(format!(
            "{} message: unexpected payload of {} bytes",
            name,
            payload.len()
        )));
    }
    Ok(())
}

fn decode_body<T: serde::de::DeserializeOwned>(payload: &[u8], name: &str) -> Result<T> {
    bincode::deserialize(payload)
        .map_err(|e| SyncError::Protocol(format!("{} message: bad payload: {}", name, e)))
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one complete frame from a stream
///
/// Blocks until the frame is complete. An error here leaves the stream in an
/// unknown position and the connection should be closed.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let (type_byte, payload_len, crc) = parse_header(&header)?;

    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        reader.read_exact(&mut payload)?;
    }

    Ok(Frame {
        type_byte,
        crc,
        payload,
    })
}

/// Read and decode one message
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message> {
    let frame = read_frame(reader)?;
    decode_frame(&frame)
}

/// Write a message to a stream
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    let bytes = encode_message(message)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
