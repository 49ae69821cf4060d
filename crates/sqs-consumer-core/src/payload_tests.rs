//! Tests for payload decoding.

use super::*;
use sqs_consumer_transport::{MessageId, ProviderType, ReceiptHandle, Timestamp};
use std::collections::HashMap;

fn message(kind: Option<&str>, body: &[u8]) -> ReceivedMessage {
    let mut attributes = HashMap::new();
    if let Some(kind) = kind {
        attributes.insert(MESSAGE_TYPE_ATTRIBUTE.to_string(), kind.to_string());
    }

    ReceivedMessage {
        message_id: MessageId::new(),
        body: Bytes::copy_from_slice(body),
        attributes,
        receipt_handle: ReceiptHandle::new("receipt".to_string(), ProviderType::InMemory),
        delivery_count: 1,
        delivered_at: Timestamp::now(),
    }
}

#[test]
fn test_missing_attribute_decodes_as_text() {
    let payload = Payload::decode(&message(None, b"hello")).expect("valid text");

    assert_eq!(payload, Payload::Text("hello".to_string()));
    assert_eq!(payload.kind(), "text");
}

#[test]
fn test_text_must_be_utf8() {
    let result = Payload::decode(&message(Some("text"), &[0xff, 0xfe]));

    assert!(matches!(result, Err(HandlerError::Decode { kind, .. }) if kind == "text"));
}

#[test]
fn test_byte_payload_is_base64() {
    let payload = Payload::decode(&message(Some("byte"), b"AAEC/w==")).expect("valid base64");

    assert_eq!(payload, Payload::Bytes(Bytes::from_static(&[0x00, 0x01, 0x02, 0xff])));
}

#[test]
fn test_byte_payload_tolerates_line_breaks() {
    let payload = Payload::decode(&message(Some("byte"), b"AAEC\r\n/w==\n")).expect("valid base64");

    assert_eq!(payload, Payload::Bytes(Bytes::from_static(&[0x00, 0x01, 0x02, 0xff])));
}

#[test]
fn test_invalid_base64_is_a_decode_error() {
    let result = Payload::decode(&message(Some("byte"), b"not base64!"));

    assert!(matches!(result, Err(HandlerError::Decode { .. })));
}

#[test]
fn test_object_payload_is_json() {
    let payload =
        Payload::decode(&message(Some("object"), br#"{"order":42}"#)).expect("valid json");

    assert_eq!(payload, Payload::Object(serde_json::json!({ "order": 42 })));
}

#[test]
fn test_invalid_json_is_a_decode_error() {
    let result = Payload::decode(&message(Some("object"), b"{"));

    assert!(matches!(result, Err(HandlerError::Decode { kind, .. }) if kind == "object"));
}

#[test]
fn test_map_and_stream_are_recognised() {
    assert_eq!(
        Payload::decode(&message(Some("map"), b"ignored")).expect("map"),
        Payload::Map
    );
    assert_eq!(
        Payload::decode(&message(Some("stream"), b"ignored")).expect("stream"),
        Payload::Stream
    );
}

#[test]
fn test_unknown_kind_is_unsupported_not_an_error() {
    let payload = Payload::decode(&message(Some("xml"), b"<a/>")).expect("unsupported");

    assert_eq!(
        payload,
        Payload::Unsupported {
            kind: "xml".to_string()
        }
    );
    assert_eq!(payload.kind(), "xml");
}
