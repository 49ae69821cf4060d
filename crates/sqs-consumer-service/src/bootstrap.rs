//! Configuration loading, logging setup and signal handling.

use crate::{Args, ServiceError};
use config::{Config, Environment, File, FileFormat};
use sqs_consumer_core::{ConsumerConfig, LoggingConfig};
use std::path::Path;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;

/// System-wide defaults (extension resolved by the config crate)
pub const SYSTEM_CONFIG_PATH: &str = "/etc/sqs-consumer/consumer";

/// Deployment-local override, relative to the working directory
pub const LOCAL_CONFIG_PATH: &str = "config/consumer";

/// Prefix of configuration environment variables, e.g. `SQSC__QUEUE_URL`
pub const ENV_PREFIX: &str = "SQSC";

/// Load, override and validate the configuration for `args`
pub fn resolve_config(args: &Args) -> Result<ConsumerConfig, ServiceError> {
    let mut config = load_config(args.config.as_deref(), None)?;
    apply_overrides(&mut config, args);
    config.validate()?;
    Ok(config)
}

/// Load configuration from the layered sources
///
/// Sources, later ones overriding earlier ones:
///  1. `/etc/sqs-consumer/consumer.yaml`
///  2. `./config/consumer.yaml`
///  3. `explicit_path`, which must exist when given
///  4. Environment variables prefixed `SQSC__` with `__` as the separator,
///     e.g. `SQSC__TRANSPORT__KIND=in_memory`. `env` replaces the process
///     environment when given.
pub fn load_config(
    explicit_path: Option<&Path>,
    env: Option<config::Map<String, String>>,
) -> Result<ConsumerConfig, ServiceError> {
    let mut builder = Config::builder()
        .add_source(
            File::with_name(SYSTEM_CONFIG_PATH)
                .required(false)
                .format(FileFormat::Yaml),
        )
        .add_source(
            File::with_name(LOCAL_CONFIG_PATH)
                .required(false)
                .format(FileFormat::Yaml),
        );

    if let Some(path) = explicit_path {
        info!(path = %path.display(), "Loading configuration from explicit path");
        builder = builder.add_source(File::from(path).required(true).format(FileFormat::Yaml));
    }

    let config = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}

/// Apply command-line overrides on top of the loaded configuration
pub fn apply_overrides(config: &mut ConsumerConfig, args: &Args) {
    if let Some(queue_url) = &args.queue_url {
        config.queue_url = queue_url.clone();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
}

/// Filter used when `RUST_LOG` is not set
pub fn default_filter(logging: &LoggingConfig) -> String {
    format!(
        "sqs_consumer={level},sqs_consumer_service={level},sqs_consumer_core={level},sqs_consumer_transport={level}",
        level = logging.level
    )
}

/// Install the global tracing subscriber
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(logging)));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json_format {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for SIGINT (Ctrl+C) or, on Unix, SIGTERM
///
/// Returns the name of the signal received.
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "SIGINT")
    }
}
