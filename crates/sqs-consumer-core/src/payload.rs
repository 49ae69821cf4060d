//! Message kind dispatch.
//!
//! Producers using the SQS JMS conventions tag every message with a
//! `JMS_SQSMessageType` attribute. The attribute selects how the body is
//! decoded:
//!
//! | attribute         | payload                |
//! |-------------------|------------------------|
//! | absent / `text`   | [`Payload::Text`]      |
//! | `byte`            | [`Payload::Bytes`]     |
//! | `object`          | [`Payload::Object`]    |
//! | `map`             | [`Payload::Map`]       |
//! | `stream`          | [`Payload::Stream`]    |
//! | anything else     | [`Payload::Unsupported`] |

use crate::error::HandlerError;
use base64::Engine;
use bytes::Bytes;
use sqs_consumer_transport::ReceivedMessage;

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;

/// Message attribute naming the payload kind
pub const MESSAGE_TYPE_ATTRIBUTE: &str = "JMS_SQSMessageType";

/// Decoded message body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Bytes(Bytes),
    Object(serde_json::Value),
    /// Key/value message; carried but not decoded
    Map,
    /// Stream message; carried but not decoded
    Stream,
    Unsupported { kind: String },
}

impl Payload {
    /// Decode the body of `message` according to its type attribute
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Decode`] when the body does not match the
    /// declared kind (invalid UTF-8, base64 or JSON).
    pub fn decode(message: &ReceivedMessage) -> Result<Self, HandlerError> {
        let kind = message.attribute(MESSAGE_TYPE_ATTRIBUTE).unwrap_or("text");
        let decode_error = |reason: String| HandlerError::Decode {
            message_id: message.message_id.to_string(),
            kind: kind.to_string(),
            reason,
        };

        match kind {
            "text" => String::from_utf8(message.body.to_vec())
                .map(Payload::Text)
                .map_err(|e| decode_error(e.to_string())),
            "byte" => base64::engine::general_purpose::STANDARD
                .decode(strip_whitespace(&message.body))
                .map(|raw| Payload::Bytes(Bytes::from(raw)))
                .map_err(|e| decode_error(e.to_string())),
            "object" => serde_json::from_slice(&message.body)
                .map(Payload::Object)
                .map_err(|e| decode_error(e.to_string())),
            "map" => Ok(Payload::Map),
            "stream" => Ok(Payload::Stream),
            other => Ok(Payload::Unsupported {
                kind: other.to_string(),
            }),
        }
    }

    /// Name of the payload kind, as used in the type attribute
    pub fn kind(&self) -> &str {
        match self {
            Self::Text(_) => "text",
            Self::Bytes(_) => "byte",
            Self::Object(_) => "object",
            Self::Map => "map",
            Self::Stream => "stream",
            Self::Unsupported { kind } => kind,
        }
    }
}

/// Base64 bodies may arrive line-wrapped
fn strip_whitespace(body: &[u8]) -> Vec<u8> {
    body.iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect()
}
