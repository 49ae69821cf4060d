//! # SQS Consumer
//!
//! Binary entry point.
//!
//! This executable:
//! - Loads configuration from files, environment and arguments
//! - Initializes logging
//! - Consumes the configured queue until SIGINT / SIGTERM
//! - Stops within the configured shutdown timeout; a second signal aborts the
//!   stop

use clap::Parser;
use sqs_consumer_core::LoggingConfig;
use sqs_consumer_service::bootstrap::{init_tracing, resolve_config, wait_for_signal};
use sqs_consumer_service::{run_consumer, Args};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&LoggingConfig::default());
            error!(error = %e, "Configuration is invalid; aborting");
            std::process::exit(e.exit_code());
        }
    };

    init_tracing(&config.logging);
    info!(
        queue_url = %config.queue_url,
        shutdown_timeout_seconds = config.shutdown_timeout_seconds,
        "Starting SQS consumer"
    );

    let shutdown = async {
        match wait_for_signal().await {
            Ok(signal) => info!(signal, "Received signal; initiating shutdown"),
            Err(e) => {
                error!(error = %e, "Failed to install signal handlers; running until killed");
                std::future::pending::<()>().await;
            }
        }
    };

    let interrupt = async {
        match wait_for_signal().await {
            Ok(signal) => warn!(signal, "Received second signal; aborting shutdown"),
            Err(_) => std::future::pending::<()>().await,
        }
    };

    match run_consumer(config, shutdown, interrupt).await {
        Ok(_) => {}
        Err(e) => {
            error!(error = %e, "SQS consumer exited with error");
            std::process::exit(e.exit_code());
        }
    }
}
