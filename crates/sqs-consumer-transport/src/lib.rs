//! # SQS Consumer Transport
//!
//! Queue client contract used by the sqs-consumer core, plus the adapters that
//! implement it.
//!
//! The core only ever talks to a [`QueueClient`]: receive a bounded batch,
//! acknowledge one delivery, close. Everything else about the transport
//! (signing, XML, prefetching, visibility timeouts) lives behind that trait.
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Received messages, receipt handles and queue URLs
//! - [`provider`] - Provider types and configuration
//! - [`client`] - The `QueueClient` trait and client factory
//! - [`session`] - Session / acknowledge-mode wrapper over another client
//! - [`providers`] - SQS HTTP and in-memory implementations

pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;
pub mod session;

// Re-export commonly used types at crate root for convenience
pub use client::{QueueClient, QueueClientFactory};
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use message::{Message, MessageId, QueueUrl, ReceiptHandle, ReceivedMessage, Timestamp};
pub use provider::{
    AwsSqsConfig, InMemoryConfig, ProviderConfig, ProviderType, SessionConfig, TransportConfig,
};
pub use providers::{InMemoryQueueClient, SqsQueueClient};
pub use session::SessionQueueClient;
