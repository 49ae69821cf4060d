//! The worker loop.
//!
//! One [`ConsumerLoop`] runs on one task. Each iteration checks the shared
//! state, polls the queue once and works through the batch in receipt order:
//! handle a message, acknowledge it, move on. The shared state is checked
//! again between messages so a stop never waits for the rest of a batch.
//!
//! Errors are logged and counted, never propagated. A failed handler or a
//! failed acknowledgement abandons the remainder of the batch; those messages
//! stay unacknowledged and the queue redelivers them.

use crate::config::ConsumerSettings;
use crate::handler::MessageHandler;
use crate::state::SharedState;
use crate::stats::ConsumerStats;
use sqs_consumer_transport::QueueClient;
use std::sync::Arc;
use tracing::{debug, error, info};

#[cfg(test)]
#[path = "consumer_loop_tests.rs"]
mod tests;

/// What a single poll achieved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The receive returned no messages
    Empty,
    /// Every message was handled and acknowledged
    Completed { acknowledged: usize },
    /// The receive itself failed
    ReceiveFailed,
    /// A handler failed; that message and the rest of the batch were left
    HandlerFailed { acknowledged: usize, abandoned: usize },
    /// An acknowledgement failed; that message and the rest were left
    AcknowledgeFailed { acknowledged: usize, abandoned: usize },
    /// Shutdown began part way through the batch
    ShutdownRequested { acknowledged: usize, abandoned: usize },
}

/// Poll-process-acknowledge loop bound to one client and one handler
pub struct ConsumerLoop {
    client: Arc<dyn QueueClient>,
    handler: Arc<dyn MessageHandler>,
    state: SharedState,
    settings: ConsumerSettings,
    stats: Arc<ConsumerStats>,
}

impl ConsumerLoop {
    pub fn new(
        client: Arc<dyn QueueClient>,
        handler: Arc<dyn MessageHandler>,
        state: SharedState,
        settings: ConsumerSettings,
        stats: Arc<ConsumerStats>,
    ) -> Self {
        Self {
            client,
            handler,
            state,
            settings,
            stats,
        }
    }

    /// Poll until the shared state leaves `Running`
    pub async fn run(self) {
        info!(
            provider = %self.client.provider_type(),
            poll_wait_ms = self.settings.poll_wait.as_millis() as u64,
            max_batch_size = self.settings.max_batch_size,
            "Consumer loop started"
        );

        loop {
            if !self.state.is_running() {
                info!(state = %self.state.get(), "Shutdown already started; stop handling");
                break;
            }

            self.poll_once().await;
        }
    }

    /// Receive one batch and work through it
    pub async fn poll_once(&self) -> BatchOutcome {
        let messages = match self
            .client
            .receive(self.settings.poll_wait, self.settings.max_batch_size)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                self.stats.record_transport_failure();
                error!(
                    error = %e,
                    transient = e.is_transient(),
                    "Failed to receive messages"
                );
                return BatchOutcome::ReceiveFailed;
            }
        };

        self.stats.record_poll(messages.len());
        if messages.is_empty() {
            return BatchOutcome::Empty;
        }

        let total = messages.len();
        debug!(count = total, "Processing batch");

        for (index, message) in messages.iter().enumerate() {
            if !self.state.is_running() {
                info!(
                    acknowledged = index,
                    abandoned = total - index,
                    "Shutdown started mid-batch; leaving remaining messages"
                );
                return BatchOutcome::ShutdownRequested {
                    acknowledged: index,
                    abandoned: total - index,
                };
            }

            if let Err(e) = self.handler.handle(message).await {
                self.stats.record_handler_failure();
                error!(
                    message_id = %message.message_id,
                    delivery_count = message.delivery_count,
                    error = %e,
                    abandoned = total - index,
                    "Message handler failed; abandoning rest of batch"
                );
                return BatchOutcome::HandlerFailed {
                    acknowledged: index,
                    abandoned: total - index,
                };
            }
            self.stats.record_handled();

            if let Err(e) = self.client.acknowledge(message).await {
                self.stats.record_transport_failure();
                error!(
                    message_id = %message.message_id,
                    error = %e,
                    transient = e.is_transient(),
                    abandoned = total - index,
                    "Failed to acknowledge message; abandoning rest of batch"
                );
                return BatchOutcome::AcknowledgeFailed {
                    acknowledged: index,
                    abandoned: total - index,
                };
            }
            self.stats.record_acknowledged();

            debug!(message_id = %message.message_id, "Message acknowledged");
        }

        BatchOutcome::Completed {
            acknowledged: total,
        }
    }
}
