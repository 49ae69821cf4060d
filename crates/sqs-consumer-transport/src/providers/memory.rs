//! In-memory queue client for testing and development.
//!
//! This module provides a single in-process queue that behaves like an SQS
//! standard queue from the consumer's point of view:
//! - Long-poll receive that wakes as soon as a message is sent
//! - Visibility timeout: a received but unacknowledged message becomes
//!   visible again after the timeout and is redelivered with an incremented
//!   delivery count
//! - Acknowledge removes one delivery by its receipt handle
//!
//! Time is measured with `tokio::time::Instant`, so tests running on a paused
//! runtime can advance past visibility timeouts instantly.

use crate::client::QueueClient;
use crate::error::QueueError;
use crate::message::{Message, MessageId, ReceiptHandle, ReceivedMessage, Timestamp};
use crate::provider::{InMemoryConfig, ProviderType};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message stored in the queue with metadata
#[derive(Clone)]
struct StoredMessage {
    /// Send order; redelivered messages are re-queued by this key
    sequence: u64,
    message_id: MessageId,
    body: Bytes,
    attributes: HashMap<String, String>,
    delivery_count: u32,
}

/// A message currently being processed
struct InFlightMessage {
    message: StoredMessage,
    visible_at: Instant,
}

#[derive(Default)]
struct QueueState {
    next_sequence: u64,
    ready: VecDeque<StoredMessage>,
    in_flight: HashMap<String, InFlightMessage>,
}

impl QueueState {
    /// Move in-flight messages whose visibility timeout has passed back to the queue
    fn requeue_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, m)| m.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        if expired.is_empty() {
            return;
        }

        for receipt in expired {
            if let Some(in_flight) = self.in_flight.remove(&receipt) {
                debug!(
                    message_id = %in_flight.message.message_id,
                    "Visibility timeout expired; message is visible again"
                );
                self.ready.push_back(in_flight.message);
            }
        }

        self.ready
            .make_contiguous()
            .sort_by_key(|message| message.sequence);
    }

    /// Earliest time at which an in-flight message becomes visible again
    fn next_visibility_change(&self) -> Option<Instant> {
        self.in_flight.values().map(|m| m.visible_at).min()
    }

    fn total_len(&self) -> usize {
        self.ready.len() + self.in_flight.len()
    }
}

// ============================================================================
// In-Memory Client
// ============================================================================

/// In-memory queue client
///
/// Holds exactly one queue. Clone the surrounding `Arc` to share it between a
/// producer in a test and the consumer under test.
pub struct InMemoryQueueClient {
    state: Mutex<QueueState>,
    available: Notify,
    config: InMemoryConfig,
}

impl InMemoryQueueClient {
    /// Create new in-memory queue
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
            config,
        }
    }

    /// Place a message on the queue
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` with code `QueueFull` once `max_queue_size`
    /// messages (ready plus in flight) are stored.
    pub fn send(&self, message: Message) -> Result<MessageId, QueueError> {
        let message_id = MessageId::new();
        {
            let mut state = self.lock_state();
            if state.total_len() >= self.config.max_queue_size {
                return Err(QueueError::ProviderError {
                    provider: ProviderType::InMemory.to_string(),
                    code: "QueueFull".to_string(),
                    message: format!(
                        "queue holds the maximum of {} messages",
                        self.config.max_queue_size
                    ),
                });
            }

            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.ready.push_back(StoredMessage {
                sequence,
                message_id: message_id.clone(),
                body: message.body,
                attributes: message.attributes,
                delivery_count: 0,
            });
        }

        self.available.notify_one();
        Ok(message_id)
    }

    /// Number of messages waiting to be received
    pub fn visible_count(&self) -> usize {
        let mut state = self.lock_state();
        state.requeue_expired(Instant::now());
        state.ready.len()
    }

    /// Number of messages received but neither acknowledged nor redelivered
    pub fn in_flight_count(&self) -> usize {
        let mut state = self.lock_state();
        state.requeue_expired(Instant::now());
        state.in_flight.len()
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        // State is only mutated in short non-panicking sections
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take up to `max_messages` visible messages and mark them in flight
    fn take_batch(&self, max_messages: u32) -> (Vec<ReceivedMessage>, Option<Instant>) {
        let now = Instant::now();
        let mut state = self.lock_state();
        state.requeue_expired(now);

        let mut batch = Vec::new();
        while batch.len() < max_messages as usize {
            let Some(mut stored) = state.ready.pop_front() else {
                break;
            };
            stored.delivery_count += 1;

            let receipt = uuid::Uuid::new_v4().to_string();
            let mut attributes = stored.attributes.clone();
            attributes.insert(
                "ApproximateReceiveCount".to_string(),
                stored.delivery_count.to_string(),
            );

            batch.push(ReceivedMessage {
                message_id: stored.message_id.clone(),
                body: stored.body.clone(),
                attributes,
                receipt_handle: ReceiptHandle::new(receipt.clone(), ProviderType::InMemory),
                delivery_count: stored.delivery_count,
                delivered_at: Timestamp::now(),
            });

            state.in_flight.insert(
                receipt,
                InFlightMessage {
                    message: stored,
                    visible_at: now + self.config.visibility_timeout,
                },
            );
        }

        (batch, state.next_visibility_change())
    }
}

impl Default for InMemoryQueueClient {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueClient for InMemoryQueueClient {
    async fn receive(
        &self,
        wait: Duration,
        max_messages: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let max_messages = max_messages.clamp(1, ProviderType::InMemory.max_receive_batch());
        let deadline = Instant::now() + wait;

        loop {
            let (batch, next_visible) = self.take_batch(max_messages);
            if !batch.is_empty() {
                return Ok(batch);
            }

            if Instant::now() >= deadline {
                // A zero wait must still give other tasks a turn
                tokio::task::yield_now().await;
                return Ok(Vec::new());
            }

            let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = self.available.notified() => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn acknowledge(&self, message: &ReceivedMessage) -> Result<(), QueueError> {
        let receipt = message.receipt_handle.handle();
        let removed = self.lock_state().in_flight.remove(receipt);

        match removed {
            Some(_) => Ok(()),
            None => Err(QueueError::MessageNotFound {
                receipt: receipt.to_string(),
            }),
        }
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}
