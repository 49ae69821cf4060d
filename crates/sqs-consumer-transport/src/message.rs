//! Message types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use crate::provider::ProviderType;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use url::Url;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue endpoint identifier (an SQS queue URL)
///
/// The URL is the single piece of addressing information a consumer needs:
/// the HTTP endpoint, the account and the queue name are all derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueUrl(Url);

impl QueueUrl {
    /// Create new queue URL with validation
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        if raw.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "queue_url".to_string(),
            });
        }

        let url = Url::parse(raw.trim()).map_err(|e| ValidationError::InvalidFormat {
            field: "queue_url".to_string(),
            message: e.to_string(),
        })?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ValidationError::InvalidFormat {
                field: "queue_url".to_string(),
                message: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        if url.host_str().is_none() {
            return Err(ValidationError::InvalidFormat {
                field: "queue_url".to_string(),
                message: "missing host".to_string(),
            });
        }

        let has_queue_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .is_some_and(|last| !last.is_empty());
        if !has_queue_name {
            return Err(ValidationError::InvalidFormat {
                field: "queue_url".to_string(),
                message: "path must end with the queue name".to_string(),
            });
        }

        Ok(Self(url))
    }

    /// Queue name (last path segment)
    pub fn queue_name(&self) -> &str {
        self.0
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
    }

    /// Scheme, host and port, without the queue path
    pub fn endpoint(&self) -> String {
        let mut endpoint = format!("{}://{}", self.0.scheme(), self.host());
        if let Some(port) = self.0.port() {
            endpoint.push_str(&format!(":{}", port));
        }
        endpoint
    }

    /// Host name of the queue endpoint
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    /// Host header value, including a non-default port
    pub fn host_header(&self) -> String {
        match self.0.port() {
            Some(port) => format!("{}:{}", self.host(), port),
            None => self.host().to_string(),
        }
    }

    /// AWS region encoded in the host name, if this is an AWS endpoint
    ///
    /// Recognises both `sqs.<region>.amazonaws.com` and the legacy
    /// `<region>.queue.amazonaws.com` forms.
    pub fn region(&self) -> Option<String> {
        let labels: Vec<&str> = self.host().split('.').collect();
        if !self.host().ends_with(".amazonaws.com") || labels.len() < 4 {
            return None;
        }

        if labels[0] == "sqs" {
            Some(labels[1].to_string())
        } else if labels[1] == "queue" {
            Some(labels[0].to_string())
        } else {
            None
        }
    }

    /// Check if the queue is a FIFO queue
    pub fn is_fifo(&self) -> bool {
        self.queue_name().ends_with(".fifo")
    }

    /// Get queue URL as string
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for QueueUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueUrl {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for QueueUrl {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<QueueUrl> for String {
    fn from(value: QueueUrl) -> Self {
        value.0.into()
    }
}

/// Unique identifier for a message delivery
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message to be placed on a queue
///
/// Only the in-memory transport accepts outgoing messages; the consumer never
/// sends.
#[derive(Debug, Clone)]
pub struct Message {
    pub body: Bytes,
    pub attributes: HashMap<String, String>,
}

impl Message {
    /// Create new message with body
    pub fn new(body: Bytes) -> Self {
        Self {
            body,
            attributes: HashMap::new(),
        }
    }

    /// Add message attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A message received from the queue with processing metadata
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub body: Bytes,
    pub attributes: HashMap<String, String>,
    pub receipt_handle: ReceiptHandle,
    pub delivery_count: u32,
    pub delivered_at: Timestamp,
}

impl ReceivedMessage {
    /// Look up a message attribute by name
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Check if this delivery is a redelivery of an earlier, unacknowledged one
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

/// Opaque token required to acknowledge one specific delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptHandle {
    handle: String,
    provider_type: ProviderType,
}

impl ReceiptHandle {
    /// Create new receipt handle
    pub fn new(handle: String, provider_type: ProviderType) -> Self {
        Self {
            handle,
            provider_type,
        }
    }

    /// Get handle string
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Get provider type
    pub fn provider_type(&self) -> ProviderType {
        self.provider_type
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
