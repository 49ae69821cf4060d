//! Start / stop controller.
//!
//! [`Consumer::start`] runs a [`ConsumerLoop`] on exactly one tokio task.
//! [`Consumer::stop`] shuts it down in two bounded phases:
//!
//! 1. **Graceful**: set the shared state to `ShuttingDown` and wait up to the
//!    graceful share of the budget for the worker to notice and return. An
//!    in-flight message is never interrupted in this phase.
//! 2. **Forced**: abort the worker task and wait up to the forced share for
//!    the abort to take effect. An abort only lands at the worker's next
//!    `.await`; code that blocks the thread cannot be aborted.
//!
//! If neither wait succeeds the worker is abandoned and the stop reports
//! [`ShutdownOutcome::ForcedTimeout`]. A later stop waits on the same worker
//! again.
//!
//! Once the worker is gone (or abandoned) the queue client is closed exactly
//! once.

use crate::config::ConsumerSettings;
use crate::consumer_loop::ConsumerLoop;
use crate::error::{LifecycleError, ShutdownError};
use crate::handler::MessageHandler;
use crate::state::{LifecycleState, SharedState};
use crate::stats::{ConsumerStats, StatsSnapshot};
use sqs_consumer_transport::{QueueClient, QueueError};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;

/// How a stop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The worker returned within the graceful share
    Graceful,
    /// The worker had to be aborted and the abort completed within the forced share
    Forced,
    /// The worker did not finish even after being aborted; it was abandoned
    ForcedTimeout,
    /// Nothing was running
    AlreadyStopped,
}

impl ShutdownOutcome {
    /// True unless the worker had to be abandoned
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::ForcedTimeout)
    }
}

/// Result of a stop
#[derive(Debug)]
pub struct ShutdownReport {
    pub outcome: ShutdownOutcome,
    /// Time spent inside this stop call
    pub elapsed: Duration,
    /// Failure from closing the queue client; never affects `outcome`
    pub close_error: Option<QueueError>,
}

struct Worker {
    handle: JoinHandle<()>,
    aborted: bool,
}

enum WaitResult<T> {
    Finished(Result<(), JoinError>),
    TimedOut,
    Interrupted(T),
}

/// An interrupt that fired during a stop, with what it produced
struct Interrupt<T> {
    elapsed: Duration,
    signal: T,
}

/// A single-use queue consumer
///
/// # Examples
///
/// ```no_run
/// use sqs_consumer_core::{Consumer, ConsumerSettings, LoggingHandler};
/// use sqs_consumer_transport::InMemoryQueueClient;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let consumer = Consumer::new(
///     Arc::new(InMemoryQueueClient::default()),
///     Arc::new(LoggingHandler),
///     ConsumerSettings::default(),
/// );
///
/// consumer.start()?;
/// tokio::signal::ctrl_c().await?;
/// let report = consumer.stop().await;
/// println!("stopped: {:?}", report.outcome);
/// # Ok(())
/// # }
/// ```
pub struct Consumer {
    client: Arc<dyn QueueClient>,
    handler: Arc<dyn MessageHandler>,
    settings: ConsumerSettings,
    state: SharedState,
    stats: Arc<ConsumerStats>,
    worker: Mutex<Option<Worker>>,
    client_closed: AtomicBool,
}

impl Consumer {
    pub fn new(
        client: Arc<dyn QueueClient>,
        handler: Arc<dyn MessageHandler>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            client,
            handler,
            settings,
            state: SharedState::new(),
            stats: Arc::new(ConsumerStats::new()),
            worker: Mutex::new(None),
            client_closed: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn settings(&self) -> &ConsumerSettings {
        &self.settings
    }

    /// Spawn the worker onto the current tokio runtime
    ///
    /// # Errors
    ///
    /// - `AlreadyStarted` if this consumer has been started or stopped before
    /// - `NoRuntime` when called outside a tokio runtime
    pub fn start(&self) -> Result<(), LifecycleError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| LifecycleError::NoRuntime)?;

        // Held by a stop in progress, which means the consumer is no longer idle
        let mut worker = self
            .worker
            .try_lock()
            .map_err(|_| LifecycleError::AlreadyStarted {
                state: self.state.get(),
            })?;

        self.state
            .try_start()
            .map_err(|state| LifecycleError::AlreadyStarted { state })?;

        let consumer_loop = ConsumerLoop::new(
            Arc::clone(&self.client),
            Arc::clone(&self.handler),
            self.state.clone(),
            self.settings,
            Arc::clone(&self.stats),
        );

        *worker = Some(Worker {
            handle: runtime.spawn(consumer_loop.run()),
            aborted: false,
        });

        info!(
            provider = %self.client.provider_type(),
            graceful_ms = self.settings.budget.graceful().as_millis() as u64,
            forced_ms = self.settings.budget.forced().as_millis() as u64,
            "Consumer started"
        );

        Ok(())
    }

    /// Stop the worker within the shutdown budget
    ///
    /// Safe to call any number of times, before or after `start`.
    pub async fn stop(&self) -> ShutdownReport {
        match self.shutdown(std::future::pending::<Infallible>()).await {
            Ok(report) => report,
            Err(interrupt) => match interrupt.signal {},
        }
    }

    /// Stop the worker, giving up early when `interrupt` completes
    ///
    /// When the interrupt fires during either wait the worker is aborted
    /// immediately, the consumer is marked stopped and the queue client is
    /// left open.
    ///
    /// # Errors
    ///
    /// Returns `ShutdownError::Interrupted` if `interrupt` completed first.
    pub async fn stop_with_interrupt<F>(
        &self,
        interrupt: F,
    ) -> Result<ShutdownReport, ShutdownError>
    where
        F: Future<Output = ()>,
    {
        self.shutdown(interrupt)
            .await
            .map_err(|interrupt| ShutdownError::Interrupted {
                elapsed: interrupt.elapsed,
            })
    }

    async fn shutdown<F>(&self, interrupt: F) -> Result<ShutdownReport, Interrupt<F::Output>>
    where
        F: Future,
    {
        let started = Instant::now();
        tokio::pin!(interrupt);

        let mut slot = self.worker.lock().await;
        let previous = self.state.begin_shutdown();

        let Some(worker) = slot.as_mut() else {
            debug!(previous_state = %previous, "Stop requested but no worker is running");
            self.state.mark_stopped();
            return Ok(ShutdownReport {
                outcome: ShutdownOutcome::AlreadyStopped,
                elapsed: started.elapsed(),
                close_error: None,
            });
        };

        let budget = self.settings.budget;
        info!(
            previous_state = %previous,
            graceful_ms = budget.graceful().as_millis() as u64,
            forced_ms = budget.forced().as_millis() as u64,
            "Stopping consumer"
        );

        if !worker.aborted {
            match wait_for(&mut worker.handle, budget.graceful(), interrupt.as_mut()).await {
                WaitResult::Finished(result) => {
                    log_worker_exit(result);
                    *slot = None;
                    return Ok(self.finish(ShutdownOutcome::Graceful, started).await);
                }
                WaitResult::Interrupted(signal) => {
                    worker.handle.abort();
                    *slot = None;
                    return Err(self.interrupted(started, signal));
                }
                WaitResult::TimedOut => {
                    warn!(
                        graceful_ms = budget.graceful().as_millis() as u64,
                        "Worker did not stop within graceful timeout; aborting it"
                    );
                    worker.handle.abort();
                    worker.aborted = true;
                }
            }
        }

        match wait_for(&mut worker.handle, budget.forced(), interrupt.as_mut()).await {
            WaitResult::Finished(result) => {
                log_worker_exit(result);
                *slot = None;
                Ok(self.finish(ShutdownOutcome::Forced, started).await)
            }
            WaitResult::Interrupted(signal) => {
                *slot = None;
                Err(self.interrupted(started, signal))
            }
            WaitResult::TimedOut => {
                error!(
                    forced_ms = budget.forced().as_millis() as u64,
                    "Worker did not stop within forced timeout; abandoning it"
                );
                let close_error = self.close_client(started).await;
                Ok(ShutdownReport {
                    outcome: ShutdownOutcome::ForcedTimeout,
                    elapsed: started.elapsed(),
                    close_error,
                })
            }
        }
    }

    async fn finish(&self, outcome: ShutdownOutcome, started: Instant) -> ShutdownReport {
        self.state.mark_stopped();
        let close_error = self.close_client(started).await;
        let elapsed = started.elapsed();
        let stats = self.stats.snapshot();

        info!(
            outcome = ?outcome,
            elapsed_ms = elapsed.as_millis() as u64,
            polls = stats.polls,
            received = stats.received,
            acknowledged = stats.acknowledged,
            handler_failures = stats.handler_failures,
            transport_failures = stats.transport_failures,
            "Consumer stopped"
        );

        ShutdownReport {
            outcome,
            elapsed,
            close_error,
        }
    }

    fn interrupted<T>(&self, started: Instant, signal: T) -> Interrupt<T> {
        self.state.mark_stopped();
        let elapsed = started.elapsed();
        warn!(
            elapsed_ms = elapsed.as_millis() as u64,
            "Shutdown interrupted; worker aborted"
        );
        Interrupt { elapsed, signal }
    }

    /// Close the queue client once, within what is left of the budget
    ///
    /// With no budget left the close still gets a single poll, so a client
    /// that closes without waiting is always closed.
    async fn close_client(&self, started: Instant) -> Option<QueueError> {
        if self.client_closed.swap(true, Ordering::AcqRel) {
            return None;
        }

        let limit = self
            .settings
            .budget
            .total()
            .saturating_sub(started.elapsed());
        match tokio::time::timeout(limit, self.client.close()).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to close queue client");
                Some(e)
            }
            Err(_) => {
                warn!(
                    limit_ms = limit.as_millis() as u64,
                    "Queue client did not close within the shutdown budget"
                );
                Some(QueueError::Timeout { duration: limit })
            }
        }
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.handle.abort();
        }
    }
}

async fn wait_for<F>(
    handle: &mut JoinHandle<()>,
    limit: Duration,
    interrupt: Pin<&mut F>,
) -> WaitResult<F::Output>
where
    F: Future,
{
    tokio::select! {
        result = tokio::time::timeout(limit, handle) => match result {
            Ok(join) => WaitResult::Finished(join),
            Err(_) => WaitResult::TimedOut,
        },
        signal = interrupt => WaitResult::Interrupted(signal),
    }
}

fn log_worker_exit(result: Result<(), JoinError>) {
    match result {
        Ok(()) => debug!("Worker exited"),
        Err(e) if e.is_cancelled() => debug!("Worker aborted"),
        Err(e) => error!(error = %e, "Worker panicked"),
    }
}
