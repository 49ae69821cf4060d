//! Graceful / forced split of the shutdown timeout.

use crate::error::ConfigError;
use std::time::Duration;

#[cfg(test)]
#[path = "budget_tests.rs"]
mod tests;

/// Default total time allowed for a stop
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Total stop time divided into a graceful and a forced phase
///
/// `graceful + forced` always equals the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownBudget {
    graceful: Duration,
    forced: Duration,
}

impl ShutdownBudget {
    /// Split `total` evenly; an odd remainder goes to the forced phase
    pub fn split_evenly(total: Duration) -> Self {
        let graceful = total / 2;
        Self {
            graceful,
            forced: total - graceful,
        }
    }

    /// Give the graceful phase `graceful` out of `total`
    pub fn with_graceful(total: Duration, graceful: Duration) -> Result<Self, ConfigError> {
        if graceful > total {
            return Err(ConfigError::invalid(
                "graceful_shutdown_seconds",
                format!(
                    "graceful share {:?} exceeds total shutdown timeout {:?}",
                    graceful, total
                ),
            ));
        }

        Ok(Self {
            graceful,
            forced: total - graceful,
        })
    }

    pub fn graceful(&self) -> Duration {
        self.graceful
    }

    pub fn forced(&self) -> Duration {
        self.forced
    }

    pub fn total(&self) -> Duration {
        self.graceful + self.forced
    }
}

impl Default for ShutdownBudget {
    fn default() -> Self {
        Self::split_evenly(DEFAULT_SHUTDOWN_TIMEOUT)
    }
}
