//! Session / acknowledge-mode wrapper over another queue client.
//!
//! A [`SessionQueueClient`] models the message-listener style of consumption:
//! the underlying client is asked for `prefetch` messages at a time, and the
//! session hands them out one per `receive` call. Every delivery is
//! acknowledged individually, so acknowledging one message never
//! acknowledges an earlier failed one.
//!
//! Closing the session drops any prefetched messages without acknowledging
//! them (the provider redelivers them after their visibility timeout) and
//! closes the underlying client. A receive that is still waiting on the
//! underlying client when the session closes discards what it fetched.

use crate::client::QueueClient;
use crate::error::QueueError;
use crate::message::ReceivedMessage;
use crate::provider::{ProviderType, SessionConfig};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

/// Queue client that delivers prefetched messages one at a time
pub struct SessionQueueClient {
    inner: Arc<dyn QueueClient>,
    prefetched: Mutex<VecDeque<ReceivedMessage>>,
    prefetch: u32,
    closed: AtomicBool,
}

impl SessionQueueClient {
    /// Open a session over `inner`
    pub fn new(inner: Arc<dyn QueueClient>, config: SessionConfig) -> Self {
        Self {
            inner,
            prefetched: Mutex::new(VecDeque::new()),
            prefetch: config.prefetch.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Check whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of messages fetched from the provider but not yet handed out
    pub async fn prefetched_count(&self) -> usize {
        self.prefetched.lock().await.len()
    }

    fn ensure_open(&self) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::SessionClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl QueueClient for SessionQueueClient {
    /// Receive the next message, refilling the prefetch buffer when it is empty
    ///
    /// At most one message is returned regardless of `max_messages`.
    async fn receive(
        &self,
        wait: Duration,
        _max_messages: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.ensure_open()?;

        let next = self.prefetched.lock().await.pop_front();
        if let Some(message) = next {
            return Ok(vec![message]);
        }

        // The buffer stays unlocked for the whole long poll so `close` never
        // waits on a provider call
        let batch = self.inner.receive(wait, self.prefetch).await?;

        let mut prefetched = self.prefetched.lock().await;
        if self.is_closed() {
            debug!(
                count = batch.len(),
                "Session closed during receive; dropping fetched messages"
            );
            return Err(QueueError::SessionClosed);
        }

        debug!(count = batch.len(), "Prefetched messages into session");
        prefetched.extend(batch);
        Ok(prefetched.pop_front().into_iter().collect())
    }

    async fn acknowledge(&self, message: &ReceivedMessage) -> Result<(), QueueError> {
        self.ensure_open()?;
        self.inner.acknowledge(message).await
    }

    async fn close(&self) -> Result<(), QueueError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let dropped = {
            let mut prefetched = self.prefetched.lock().await;
            let count = prefetched.len();
            prefetched.clear();
            count
        };

        info!(
            unacknowledged_prefetched = dropped,
            "Closing queue session"
        );

        self.inner.close().await
    }

    fn provider_type(&self) -> ProviderType {
        self.inner.provider_type()
    }
}
