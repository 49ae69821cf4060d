//! Consumer configuration.
//!
//! [`ConsumerConfig`] is the deserialized form of the layered file and
//! environment configuration. Every field except `queue_url` has a default, so
//! a config that only names the queue is complete.

use crate::budget::{ShutdownBudget, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use sqs_consumer_transport::{
    AwsSqsConfig, InMemoryConfig, ProviderConfig, QueueUrl, SessionConfig, TransportConfig,
};
use std::fmt;
use std::time::Duration;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// SQS long polling cannot wait longer than this
pub const MAX_POLL_WAIT_SECONDS: u64 = 20;

/// SQS never returns more than this many messages per receive
pub const MAX_BATCH_SIZE: u32 = 10;

/// Top-level consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// URL of the queue to consume
    pub queue_url: String,

    /// Total time a stop may take, graceful and forced phases combined
    pub shutdown_timeout_seconds: u64,

    /// Graceful share of the shutdown timeout; half of it when unset
    pub graceful_shutdown_seconds: Option<u64>,

    /// Longest a single receive waits for messages
    pub poll_wait_seconds: u64,

    /// Most messages requested per receive
    pub max_batch_size: u32,

    pub transport: TransportSettings,

    pub aws: AwsSettings,

    pub logging: LoggingConfig,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            queue_url: String::new(),
            shutdown_timeout_seconds: DEFAULT_SHUTDOWN_TIMEOUT.as_secs(),
            graceful_shutdown_seconds: None,
            poll_wait_seconds: 2,
            max_batch_size: MAX_BATCH_SIZE,
            transport: TransportSettings::default(),
            aws: AwsSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ConsumerConfig {
    /// Check every field, returning the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.queue_url()?;
        self.settings()?;

        if self.transport.session.enabled && self.transport.session.prefetch == 0 {
            return Err(ConfigError::invalid(
                "transport.session.prefetch",
                "must be at least 1",
            ));
        }

        Ok(())
    }

    /// Parsed queue URL
    pub fn queue_url(&self) -> Result<QueueUrl, ConfigError> {
        if self.queue_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "queue_url".to_string(),
            });
        }

        QueueUrl::new(&self.queue_url).map_err(|e| ConfigError::invalid("queue_url", e.to_string()))
    }

    /// Shutdown budget derived from the timeout fields
    pub fn shutdown_budget(&self) -> Result<ShutdownBudget, ConfigError> {
        if self.shutdown_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "shutdown_timeout_seconds",
                "must be greater than zero",
            ));
        }

        let total = Duration::from_secs(self.shutdown_timeout_seconds);
        match self.graceful_shutdown_seconds {
            Some(graceful) => ShutdownBudget::with_graceful(total, Duration::from_secs(graceful)),
            None => Ok(ShutdownBudget::split_evenly(total)),
        }
    }

    /// Runtime settings for the consumer loop and controller
    pub fn settings(&self) -> Result<ConsumerSettings, ConfigError> {
        if self.poll_wait_seconds > MAX_POLL_WAIT_SECONDS {
            return Err(ConfigError::invalid(
                "poll_wait_seconds",
                format!("must be at most {}", MAX_POLL_WAIT_SECONDS),
            ));
        }

        if self.max_batch_size == 0 || self.max_batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::invalid(
                "max_batch_size",
                format!("must be between 1 and {}", MAX_BATCH_SIZE),
            ));
        }

        let poll_wait = Duration::from_secs(self.poll_wait_seconds);
        let budget = self.shutdown_budget()?;
        // An idle worker only notices a stop once its long poll returns
        if budget.graceful() < poll_wait {
            return Err(ConfigError::invalid(
                "graceful_shutdown_seconds",
                format!(
                    "graceful share of {}s is shorter than poll_wait_seconds ({})",
                    budget.graceful().as_secs_f64(),
                    self.poll_wait_seconds
                ),
            ));
        }

        Ok(ConsumerSettings {
            poll_wait,
            max_batch_size: self.max_batch_size,
            budget,
        })
    }

    /// Transport construction parameters
    pub fn transport_config(&self) -> TransportConfig {
        let provider = match self.transport.kind {
            TransportKind::Sqs => ProviderConfig::AwsSqs(AwsSqsConfig {
                region: self.aws.region.clone(),
                access_key_id: self.aws.access_key_id.clone(),
                secret_access_key: self.aws.secret_access_key.clone(),
                session_token: self.aws.session_token.clone(),
            }),
            TransportKind::InMemory => ProviderConfig::InMemory(InMemoryConfig {
                visibility_timeout: Duration::from_secs(
                    self.transport.in_memory_visibility_timeout_seconds,
                ),
                ..InMemoryConfig::default()
            }),
        };

        let session = self.transport.session.enabled.then(|| SessionConfig {
            prefetch: self.transport.session.prefetch,
        });

        TransportConfig { provider, session }
    }
}

/// Which queue transport to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Sqs,
    InMemory,
}

/// Transport selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub kind: TransportKind,
    pub session: SessionSettings,
    /// Redelivery delay for the in-memory transport
    pub in_memory_visibility_timeout_seconds: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            kind: TransportKind::Sqs,
            session: SessionSettings::default(),
            in_memory_visibility_timeout_seconds: 30,
        }
    }
}

/// Session / acknowledge-mode wrapper settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub enabled: bool,
    pub prefetch: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            prefetch: 10,
        }
    }
}

/// AWS credentials and region; unset values fall back to the environment
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsSettings {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

impl fmt::Debug for AwsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSettings")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Validated runtime settings for a [`Consumer`](crate::Consumer)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub poll_wait: Duration,
    pub max_batch_size: u32,
    pub budget: ShutdownBudget,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            poll_wait: Duration::from_secs(2),
            max_batch_size: MAX_BATCH_SIZE,
            budget: ShutdownBudget::default(),
        }
    }
}
