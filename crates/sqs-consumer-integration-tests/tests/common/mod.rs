//! Shared helpers for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use sqs_consumer_core::{ConsumerSettings, HandlerError, MessageHandler, ShutdownBudget};
use sqs_consumer_transport::{InMemoryConfig, InMemoryQueueClient, Message, ReceivedMessage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory queue with a short visibility timeout so redelivery is quick
pub fn queue_with_visibility(visibility_timeout: Duration) -> Arc<InMemoryQueueClient> {
    Arc::new(InMemoryQueueClient::new(InMemoryConfig {
        visibility_timeout,
        ..InMemoryConfig::default()
    }))
}

pub fn send_text(queue: &InMemoryQueueClient, bodies: &[&str]) {
    for body in bodies {
        queue
            .send(Message::new(Bytes::from(body.to_string())))
            .expect("send should succeed");
    }
}

pub fn settings(poll_wait: Duration, graceful: Duration, forced: Duration) -> ConsumerSettings {
    ConsumerSettings {
        poll_wait,
        max_batch_size: 10,
        budget: ShutdownBudget::with_graceful(graceful + forced, graceful)
            .expect("valid budget"),
    }
}

/// Poll `condition` every 10ms until it holds or `limit` passes
pub async fn wait_until<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// A handled (or attempted) delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub body: String,
    pub delivery_count: u32,
}

/// Handler that records attempts and fails a body a configured number of times
#[derive(Default)]
pub struct FlakyHandler {
    remaining_failures: Mutex<HashMap<String, u32>>,
    attempts: Mutex<Vec<Attempt>>,
}

impl FlakyHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `body` for its first `times` attempts
    pub fn fail(self, body: &str, times: u32) -> Self {
        self.remaining_failures
            .lock()
            .expect("lock")
            .insert(body.to_string(), times);
        self
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().expect("lock").clone()
    }

    pub fn attempted_bodies(&self) -> Vec<String> {
        self.attempts().into_iter().map(|a| a.body).collect()
    }
}

#[async_trait]
impl MessageHandler for FlakyHandler {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), HandlerError> {
        let body = String::from_utf8_lossy(&message.body).into_owned();
        self.attempts.lock().expect("lock").push(Attempt {
            body: body.clone(),
            delivery_count: message.delivery_count,
        });

        let mut remaining = self.remaining_failures.lock().expect("lock");
        match remaining.get_mut(&body) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(HandlerError::failed(format!("refusing {}", body)))
            }
            _ => Ok(()),
        }
    }
}

/// Handler that parks at an await point forever
pub struct StuckHandler;

#[async_trait]
impl MessageHandler for StuckHandler {
    async fn handle(&self, _message: &ReceivedMessage) -> Result<(), HandlerError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Handler that blocks its thread for the given time
pub struct BlockingHandler(pub Duration);

#[async_trait]
impl MessageHandler for BlockingHandler {
    async fn handle(&self, _message: &ReceivedMessage) -> Result<(), HandlerError> {
        std::thread::sleep(self.0);
        Ok(())
    }
}
