//! Provider types and configuration.

use std::time::Duration;

/// Enumeration of supported queue providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    AwsSqs,
    InMemory,
}

impl ProviderType {
    /// Get maximum number of messages a single receive may return
    pub fn max_receive_batch(&self) -> u32 {
        match self {
            Self::AwsSqs => 10,
            Self::InMemory => 100,
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwsSqs => write!(f, "AwsSqs"),
            Self::InMemory => write!(f, "InMemory"),
        }
    }
}

/// Configuration for queue client construction
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub provider: ProviderConfig,
    /// Wrap the provider in a session / acknowledge-mode client
    pub session: Option<SessionConfig>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::InMemory(InMemoryConfig::default()),
            session: None,
        }
    }
}

/// Provider-specific configuration
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    AwsSqs(AwsSqsConfig),
    InMemory(InMemoryConfig),
}

/// AWS SQS configuration
///
/// Credentials left as `None` are resolved from the standard AWS environment
/// variables when the client is built.
#[derive(Clone, Default)]
pub struct AwsSqsConfig {
    /// Signing region; derived from the queue URL when absent
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsSqsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSqsConfig")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "<redacted>"))
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// In-memory provider configuration
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// How long a received message stays invisible before it is redelivered
    pub visibility_timeout: Duration,
    pub max_queue_size: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            max_queue_size: 10_000,
        }
    }
}

/// Session / acknowledge-mode wrapper configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of messages fetched from the provider ahead of delivery
    pub prefetch: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { prefetch: 10 }
    }
}
