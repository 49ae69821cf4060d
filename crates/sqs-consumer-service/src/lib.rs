//! # SQS Consumer Service
//!
//! Wiring for the `sqs-consumer` binary: command-line arguments, layered
//! configuration, logging, signal handling and the start / stop sequence of a
//! single [`Consumer`].
//!
//! The binary exits with:
//!
//! | code | meaning |
//! |------|---------|
//! | 0 | stopped gracefully, or after a successful forced abort |
//! | 1 | could not start the consumer |
//! | 2 | configuration could not be loaded or is invalid |
//! | 3 | the queue client could not be created |
//! | 4 | the worker was abandoned after the forced timeout |
//! | 5 | shutdown was interrupted by a second signal |

pub mod bootstrap;

use sqs_consumer_core::{
    ConfigError, Consumer, ConsumerConfig, ConsumerSettings, LifecycleError, LoggingHandler,
    ShutdownError, ShutdownOutcome, ShutdownReport,
};
use sqs_consumer_transport::{QueueClient, QueueClientFactory, QueueError};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Command-line arguments
#[derive(clap::Parser, Debug, Default)]
#[command(name = "sqs-consumer")]
#[command(about = "Consume an SQS queue until told to stop")]
#[command(version)]
pub struct Args {
    /// Configuration file (YAML), applied after the system and local files
    #[arg(short, long, env = "SQSC_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Queue URL, overriding the configured one
    #[arg(short, long)]
    pub queue_url: Option<String>,

    /// Log level, overriding the configured one
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,
}

/// Service-level errors, each mapped to a process exit code
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(#[from] ConfigError),

    #[error("Failed to create queue client: {0}")]
    Transport(#[from] QueueError),

    #[error("Failed to start consumer: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Consumer worker did not stop within the shutdown timeout")]
    ForcedTimeout,

    #[error("Shutdown interrupted: {0}")]
    Interrupted(#[from] ShutdownError),
}

impl ServiceError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Lifecycle(_) => 1,
            Self::ConfigLoad(_) | Self::ConfigInvalid(_) => 2,
            Self::Transport(_) => 3,
            Self::ForcedTimeout => 4,
            Self::Interrupted(_) => 5,
        }
    }
}

/// Build the queue client from `config` and run the consumer
pub async fn run_consumer<S, I>(
    config: ConsumerConfig,
    shutdown: S,
    interrupt: I,
) -> Result<ShutdownReport, ServiceError>
where
    S: Future<Output = ()>,
    I: Future<Output = ()>,
{
    let queue_url = config.queue_url()?;
    let settings = config.settings()?;
    let client = QueueClientFactory::create_client(&queue_url, config.transport_config())?;

    info!(
        queue = %queue_url.queue_name(),
        transport = ?config.transport.kind,
        session = config.transport.session.enabled,
        "Queue client ready"
    );

    run_with_client(client, settings, shutdown, interrupt).await
}

/// Start a consumer on `client`, wait for `shutdown`, then stop it
///
/// `interrupt` cuts the stop short.
pub async fn run_with_client<S, I>(
    client: Arc<dyn QueueClient>,
    settings: ConsumerSettings,
    shutdown: S,
    interrupt: I,
) -> Result<ShutdownReport, ServiceError>
where
    S: Future<Output = ()>,
    I: Future<Output = ()>,
{
    let consumer = Consumer::new(client, Arc::new(LoggingHandler), settings);
    consumer.start()?;

    shutdown.await;
    info!("Shutdown requested; stopping consumer");

    let report = consumer.stop_with_interrupt(interrupt).await?;
    match report.outcome {
        ShutdownOutcome::ForcedTimeout => {
            error!(
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Consumer worker abandoned after forced timeout"
            );
            Err(ServiceError::ForcedTimeout)
        }
        outcome => {
            if let Some(e) = &report.close_error {
                warn!(error = %e, "Queue client did not close cleanly");
            }
            info!(
                outcome = ?outcome,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Consumer shut down"
            );
            Ok(report)
        }
    }
}

