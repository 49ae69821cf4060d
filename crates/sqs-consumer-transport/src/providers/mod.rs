//! Queue client implementations.
//!
//! This module contains the concrete [`QueueClient`](crate::QueueClient)
//! implementations for each supported backend.

pub mod memory;
pub mod sqs;

pub use memory::InMemoryQueueClient;
pub use sqs::{AwsError, SqsQueueClient};
