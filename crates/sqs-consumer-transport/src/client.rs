//! Client trait and factory for queue operations.

use crate::error::QueueError;
use crate::message::{QueueUrl, ReceivedMessage};
use crate::provider::{ProviderConfig, ProviderType, TransportConfig};
use crate::providers::{InMemoryQueueClient, SqsQueueClient};
use crate::session::SessionQueueClient;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// The narrow contract a consumer needs from a queue transport
///
/// Implementations must tolerate being polled in a tight loop: an empty
/// `receive` after `wait` has elapsed is the normal idle result, not an error.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Receive up to `max_messages` messages, waiting at most `wait` for the
    /// first one to arrive. Messages are returned in receipt order.
    async fn receive(
        &self,
        wait: Duration,
        max_messages: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Permanently remove one delivery from the queue
    async fn acknowledge(&self, message: &ReceivedMessage) -> Result<(), QueueError>;

    /// Release transport resources (sessions, connections)
    ///
    /// Called once the consumer's worker has stopped using the client.
    async fn close(&self) -> Result<(), QueueError> {
        Ok(())
    }

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// Factory for creating queue clients with appropriate providers
pub struct QueueClientFactory;

impl QueueClientFactory {
    /// Create queue client from configuration
    pub fn create_client(
        queue_url: &QueueUrl,
        config: TransportConfig,
    ) -> Result<Arc<dyn QueueClient>, QueueError> {
        let client: Arc<dyn QueueClient> = match config.provider {
            ProviderConfig::AwsSqs(aws_config) => Arc::new(
                SqsQueueClient::new(queue_url.clone(), aws_config)
                    .map_err(|e| e.to_queue_error())?,
            ),
            ProviderConfig::InMemory(in_memory_config) => {
                Arc::new(InMemoryQueueClient::new(in_memory_config))
            }
        };

        info!(
            queue = %queue_url.queue_name(),
            provider = %client.provider_type(),
            session = config.session.is_some(),
            "Created queue client"
        );

        match config.session {
            Some(session_config) => Ok(Arc::new(SessionQueueClient::new(client, session_config))),
            None => Ok(client),
        }
    }
}
