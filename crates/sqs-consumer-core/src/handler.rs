//! Message handler contract and the default logging handler.

use crate::error::HandlerError;
use crate::payload::Payload;
use async_trait::async_trait;
use sqs_consumer_transport::ReceivedMessage;
use tracing::{error, info, warn};

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;

/// Processes one message delivery
///
/// Returning `Ok` lets the consumer acknowledge the message. Returning an
/// error leaves it unacknowledged, so the queue redelivers it once its
/// visibility timeout expires.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), HandlerError>;
}

/// Handler that decodes each payload and writes it to the log
///
/// Text is logged as-is, bytes as hex and objects as JSON. Map and stream
/// messages cannot be rendered and are skipped with a warning; unknown kinds
/// are skipped with an error. Skipped messages still count as handled.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), HandlerError> {
        let message_id = message.message_id.as_str();

        match Payload::decode(message)? {
            Payload::Text(text) => {
                info!(
                    message_id,
                    delivery_count = message.delivery_count,
                    text = %text,
                    "Received text message"
                );
            }
            Payload::Bytes(bytes) => {
                info!(
                    message_id,
                    delivery_count = message.delivery_count,
                    len = bytes.len(),
                    bytes = %hex::encode(&bytes),
                    "Received bytes message"
                );
            }
            Payload::Object(object) => {
                info!(
                    message_id,
                    delivery_count = message.delivery_count,
                    object = %object,
                    "Received object message"
                );
            }
            payload @ (Payload::Map | Payload::Stream) => {
                warn!(
                    message_id,
                    kind = payload.kind(),
                    "Message kind cannot be rendered; skipping"
                );
            }
            Payload::Unsupported { kind } => {
                error!(message_id, kind = %kind, "Unsupported message type; skipping");
            }
        }

        Ok(())
    }
}
