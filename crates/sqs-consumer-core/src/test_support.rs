//! Fakes shared by the loop and lifecycle tests.

use crate::error::HandlerError;
use crate::handler::MessageHandler;
use async_trait::async_trait;
use bytes::Bytes;
use sqs_consumer_transport::{
    MessageId, ProviderType, QueueClient, QueueError, ReceiptHandle, ReceivedMessage, Timestamp,
};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn message(body: &str) -> ReceivedMessage {
    ReceivedMessage {
        message_id: MessageId::new(),
        body: Bytes::from(body.to_string()),
        attributes: Default::default(),
        receipt_handle: ReceiptHandle::new(format!("receipt-{}", body), ProviderType::InMemory),
        delivery_count: 1,
        delivered_at: Timestamp::now(),
    }
}

pub fn body_of(message: &ReceivedMessage) -> String {
    String::from_utf8_lossy(&message.body).into_owned()
}

// ============================================================================
// Scripted Queue Client
// ============================================================================

/// Queue client that replays scripted receive results
///
/// Once the script is exhausted every receive waits out the full poll wait
/// and returns nothing, like an idle long poll. With `repeat` set, the last
/// scripted batch is returned forever instead.
#[derive(Default)]
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<Vec<ReceivedMessage>, QueueError>>>,
    repeat: Mutex<Option<Vec<ReceivedMessage>>>,
    failing_acks: Mutex<HashSet<String>>,
    acknowledged: Mutex<Vec<String>>,
    pub receive_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    fail_close: bool,
    hang_close: bool,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch(self, bodies: &[&str]) -> Self {
        let batch = bodies.iter().map(|b| message(b)).collect();
        self.push(Ok(batch))
    }

    pub fn with_receive_error(self) -> Self {
        self.push(Err(QueueError::ConnectionFailed {
            message: "connection reset".to_string(),
        }))
    }

    /// Return the same batch on every receive
    pub fn repeating(self, bodies: &[&str]) -> Self {
        *self.repeat.lock().expect("lock") = Some(bodies.iter().map(|b| message(b)).collect());
        self
    }

    pub fn failing_ack_for(self, body: &str) -> Self {
        self.failing_acks
            .lock()
            .expect("lock")
            .insert(body.to_string());
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Make `close` wait forever
    pub fn hanging_close(mut self) -> Self {
        self.hang_close = true;
        self
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.acknowledged.lock().expect("lock").clone()
    }

    fn push(self, result: Result<Vec<ReceivedMessage>, QueueError>) -> Self {
        self.script.lock().expect("lock").push_back(result);
        self
    }
}

#[async_trait]
impl QueueClient for ScriptedClient {
    async fn receive(
        &self,
        wait: Duration,
        _max_messages: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);

        let next = self.script.lock().expect("lock").pop_front();
        if let Some(result) = next {
            return result;
        }

        let repeat = self.repeat.lock().expect("lock").clone();
        if let Some(batch) = repeat {
            tokio::task::yield_now().await;
            return Ok(batch);
        }

        tokio::time::sleep(wait).await;
        Ok(Vec::new())
    }

    async fn acknowledge(&self, message: &ReceivedMessage) -> Result<(), QueueError> {
        let body = body_of(message);
        if self.failing_acks.lock().expect("lock").contains(&body) {
            return Err(QueueError::MessageNotFound {
                receipt: message.receipt_handle.handle().to_string(),
            });
        }

        self.acknowledged.lock().expect("lock").push(body);
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_close {
            std::future::pending::<()>().await;
        }
        if self.fail_close {
            return Err(QueueError::ConnectionFailed {
                message: "close failed".to_string(),
            });
        }
        Ok(())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}

/// Queue client whose receive blocks its thread
pub struct BlockingReceiveClient(pub Duration);

#[async_trait]
impl QueueClient for BlockingReceiveClient {
    async fn receive(
        &self,
        _wait: Duration,
        _max_messages: u32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        std::thread::sleep(self.0);
        Ok(Vec::new())
    }

    async fn acknowledge(&self, _message: &ReceivedMessage) -> Result<(), QueueError> {
        Ok(())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler that records every attempt and fails for chosen bodies
#[derive(Default)]
pub struct RecordingHandler {
    failing: HashSet<String>,
    fail_all: bool,
    attempts: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, body: &str) -> Self {
        self.failing.insert(body.to_string());
        self
    }

    pub fn always_failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().expect("lock").clone()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), HandlerError> {
        let body = body_of(message);
        self.attempts.lock().expect("lock").push(body.clone());

        if self.fail_all || self.failing.contains(&body) {
            return Err(HandlerError::failed(format!("cannot process {}", body)));
        }
        Ok(())
    }
}

/// Handler that never completes but can be aborted at its await point
pub struct PendingHandler;

#[async_trait]
impl MessageHandler for PendingHandler {
    async fn handle(&self, _message: &ReceivedMessage) -> Result<(), HandlerError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Handler that blocks its thread, so an abort cannot interrupt it
pub struct BlockingHandler(pub Duration);

#[async_trait]
impl MessageHandler for BlockingHandler {
    async fn handle(&self, _message: &ReceivedMessage) -> Result<(), HandlerError> {
        std::thread::sleep(self.0);
        Ok(())
    }
}
