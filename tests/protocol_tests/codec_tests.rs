//! Codec Tests
//!
//! Tests for message framing and decoding, including malformed input.

use std::io::Cursor;

use tablesync::protocol::{
    decode_frame, decode_message, encode_message, read_frame, read_message, write_message,
    EntryDelete, EntryUpdate, Hello, Message, MessageType, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
use tablesync::sync::{NodeId, Role};
use tablesync::{EntryFlags, SyncError, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn sample_update(value: Value) -> Message {
    Message::Update(EntryUpdate {
        path: "SmartDashboard/robotTime".to_string(),
        value,
        version: 42,
        flags: EntryFlags::PERSISTENT,
        origin: NodeId::from_u128(7),
    })
}

fn is_protocol_error<T: std::fmt::Debug>(result: &tablesync::Result<T>) -> bool {
    matches!(result, Err(SyncError::Protocol(_)))
}

// =============================================================================
// Framing Tests
// =============================================================================

#[test]
fn test_header_layout() {
    let message = sample_update(Value::Double(5.0));
    let encoded = encode_message(&message).unwrap();

    let payload_len = u32::from_be_bytes([encoded[1], encoded[2], encoded[3], encoded[4]]);
    let crc = u32::from_be_bytes([encoded[5], encoded[6], encoded[7], encoded[8]]);

    assert_eq!(encoded[0], MessageType::EntryUpdate as u8);
    assert_eq!(encoded.len(), HEADER_SIZE + payload_len as usize);
    assert_eq!(crc, crc32fast::hash(&encoded[HEADER_SIZE..]));
}

#[test]
fn test_empty_messages_have_no_payload() {
    for message in [Message::Keepalive, Message::SnapshotDone] {
        let encoded = encode_message(&message).unwrap();
        assert_eq!(encoded.len(), HEADER_SIZE);
        assert_eq!(decode_message(&encoded).unwrap(), message);
    }
}

#[test]
fn test_type_bytes() {
    assert_eq!(Message::Keepalive.message_type() as u8, 0x00);
    assert_eq!(MessageType::from_byte(0x01), Some(MessageType::Hello));
    assert_eq!(MessageType::from_byte(0x03), Some(MessageType::SnapshotDone));
    assert_eq!(MessageType::from_byte(0x13), Some(MessageType::EntryDelete));
    assert_eq!(MessageType::from_byte(0x7f), None);
}

// =============================================================================
// Message Decoding Tests
// =============================================================================

#[test]
fn test_encode_decode_hello() {
    let message = Message::Hello(Hello {
        node_id: NodeId::from_u128(3),
        name: "driver-station".to_string(),
        role: Role::Client,
    });

    let decoded = decode_message(&encode_message(&message).unwrap()).unwrap();

    assert_eq!(decoded, message);
}

#[test]
fn test_encode_decode_update_with_empty_values() {
    let values = [
        Value::String(String::new()),
        Value::StringArray(Vec::new()),
        Value::DoubleArray(Vec::new()),
        Value::Raw(Vec::new()),
    ];

    for value in values {
        let message = sample_update(value);
        let decoded = decode_message(&encode_message(&message).unwrap()).unwrap();
        assert_eq!(decoded, message);
    }
}

#[test]
fn test_encode_decode_delete() {
    let message = Message::Delete(EntryDelete {
        path: "a/b".to_string(),
        version: 9,
        origin: NodeId::from_u128(2),
    });

    let decoded = decode_message(&encode_message(&message).unwrap()).unwrap();

    match decoded {
        Message::Delete(delete) => {
            assert_eq!(delete.path, "a/b");
            assert_eq!(delete.version, 9);
        }
        _ => panic!("Expected DELETE message"),
    }
}

// =============================================================================
// Malformed Input Tests
// =============================================================================

#[test]
fn test_corrupted_payload_fails_crc() {
    let mut encoded = encode_message(&sample_update(Value::Double(1.0))).unwrap();
    let last = encoded.len() - 1;
    encoded[last] ^= 0xff;

    let result = decode_message(&encoded);

    assert!(is_protocol_error(&result));
}

#[test]
fn test_corrupted_crc_field() {
    let mut encoded = encode_message(&Message::Keepalive).unwrap();
    encoded[5] ^= 0x01;

    assert!(is_protocol_error(&decode_message(&encoded)));
}

#[test]
fn test_unknown_type_rejected() {
    let mut encoded = encode_message(&Message::Keepalive).unwrap();
    encoded[0] = 0x42;

    assert!(is_protocol_error(&decode_message(&encoded)));
}

#[test]
fn test_payload_on_empty_message_rejected() {
    // A HELLO body behind a KEEPALIVE type byte
    let mut encoded = encode_message(&Message::Hello(Hello {
        node_id: NodeId::from_u128(1),
        name: "x".to_string(),
        role: Role::Server,
    }))
    .unwrap();
    encoded[0] = MessageType::Keepalive as u8;

    assert!(is_protocol_error(&decode_message(&encoded)));
}

#[test]
fn test_garbage_payload_rejected() {
    let payload = vec![0xffu8; 3];
    let frame = tablesync::protocol::Frame {
        type_byte: MessageType::EntryUpdate as u8,
        crc: crc32fast::hash(&payload),
        payload,
    };

    assert!(is_protocol_error(&decode_frame(&frame)));
}

#[test]
fn test_truncated_header() {
    let encoded = encode_message(&Message::Keepalive).unwrap();

    assert!(is_protocol_error(&decode_message(&encoded[..HEADER_SIZE - 1])));
}

#[test]
fn test_truncated_payload() {
    let encoded = encode_message(&sample_update(Value::Boolean(true))).unwrap();

    assert!(is_protocol_error(&decode_message(&encoded[..encoded.len() - 1])));
}

#[test]
fn test_oversized_length_rejected() {
    let mut header = vec![MessageType::EntryUpdate as u8];
    header.extend_from_slice(&(MAX_PAYLOAD_SIZE + 1).to_be_bytes());
    header.extend_from_slice(&0u32.to_be_bytes());

    assert!(is_protocol_error(&decode_message(&header)));
    assert!(read_frame(&mut Cursor::new(header)).is_err());
}

// =============================================================================
// Stream I/O Tests
// =============================================================================

#[test]
fn test_stream_write_read_sequence() {
    let mut buffer = Vec::new();
    write_message(&mut buffer, &Message::Keepalive).unwrap();
    write_message(&mut buffer, &sample_update(Value::Double(6.0))).unwrap();
    write_message(&mut buffer, &Message::SnapshotDone).unwrap();

    let mut cursor = Cursor::new(buffer);
    assert_eq!(read_message(&mut cursor).unwrap(), Message::Keepalive);
    assert_eq!(
        read_message(&mut cursor).unwrap(),
        sample_update(Value::Double(6.0))
    );
    assert_eq!(read_message(&mut cursor).unwrap(), Message::SnapshotDone);
}

#[test]
fn test_bad_frame_does_not_desync_stream() {
    let mut bad = encode_message(&sample_update(Value::Double(1.0))).unwrap();
    let last = bad.len() - 1;
    bad[last] ^= 0xff;

    let mut buffer = bad;
    write_message(&mut buffer, &Message::SnapshotDone).unwrap();
    let mut cursor = Cursor::new(buffer);

    let frame = read_frame(&mut cursor).unwrap();
    assert!(decode_frame(&frame).is_err());
    assert_eq!(read_message(&mut cursor).unwrap(), Message::SnapshotDone);
}

#[test]
fn test_eof_mid_frame_is_io_error() {
    let encoded = encode_message(&sample_update(Value::Double(1.0))).unwrap();
    let mut cursor = Cursor::new(encoded[..HEADER_SIZE + 2].to_vec());

    match read_frame(&mut cursor) {
        Err(SyncError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("expected EOF, got {:?}", other),
    }
}
