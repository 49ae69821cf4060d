//! # SQS Consumer Core
//!
//! The poll-process-acknowledge loop and the lifecycle controller that starts
//! it on a single worker task and stops it in two bounded phases.
//!
//! ## Overview
//!
//! A [`Consumer`] owns one [`QueueClient`](sqs_consumer_transport::QueueClient)
//! and one [`MessageHandler`]. Once started, its worker repeatedly:
//!
//! 1. Receives up to `max_batch_size` messages, waiting at most `poll_wait`
//! 2. Hands each message to the handler in receipt order
//! 3. Acknowledges each message as soon as its handler succeeds
//!
//! Failures never end the loop. A failed handler or acknowledgement abandons
//! the rest of the batch, leaving those messages for the queue to redeliver.
//!
//! Stopping first waits for the worker to notice the shutdown flag (graceful
//! phase), then aborts it and waits again (forced phase). Each phase is bounded
//! by its share of the [`ShutdownBudget`].
//!
//! ## Module Organization
//!
//! - [`budget`] - Graceful / forced split of the shutdown timeout
//! - [`config`] - Consumer configuration and validation
//! - [`consumer_loop`] - The worker loop
//! - [`error`] - Error types
//! - [`handler`] - The `MessageHandler` trait and the logging handler
//! - [`lifecycle`] - Start / stop controller
//! - [`payload`] - Message kind dispatch
//! - [`state`] - Shared lifecycle flag
//! - [`stats`] - Loop counters

pub mod budget;
pub mod config;
pub mod consumer_loop;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod payload;
pub mod state;
pub mod stats;

#[cfg(test)]
mod test_support;

pub use budget::ShutdownBudget;
pub use config::{
    AwsSettings, ConsumerConfig, ConsumerSettings, LoggingConfig, SessionSettings,
    TransportKind, TransportSettings,
};
pub use consumer_loop::{BatchOutcome, ConsumerLoop};
pub use error::{ConfigError, HandlerError, LifecycleError, ShutdownError};
pub use handler::{LoggingHandler, MessageHandler};
pub use lifecycle::{Consumer, ShutdownOutcome, ShutdownReport};
pub use payload::{Payload, MESSAGE_TYPE_ATTRIBUTE};
pub use state::{LifecycleState, SharedState};
pub use stats::{ConsumerStats, StatsSnapshot};
