//! Shared lifecycle flag.
//!
//! The controller writes the state and the worker reads it. `ShuttingDown`
//! and `Stopped` are terminal for the worker: no transition leads from either
//! back to `Running`.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;

/// Lifecycle of a consumer instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Created, not yet started
    Idle = 0,
    /// Worker is polling
    Running = 1,
    /// Stop requested; worker exits at its next check
    ShuttingDown = 2,
    /// Worker has exited or was abandoned
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::ShuttingDown => write!(f, "shutting_down"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Atomic lifecycle state shared between controller and worker
#[derive(Debug, Clone)]
pub struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(LifecycleState::Idle as u8)))
    }

    /// Current state
    pub fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// True while the worker should keep polling
    pub fn is_running(&self) -> bool {
        self.get() == LifecycleState::Running
    }

    /// Move `Idle` to `Running`
    ///
    /// Returns the current state as the error if the consumer is not idle.
    pub fn try_start(&self) -> Result<(), LifecycleState> {
        self.0
            .compare_exchange(
                LifecycleState::Idle as u8,
                LifecycleState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(LifecycleState::from_u8)
    }

    /// Request shutdown and return the state it was requested from
    ///
    /// `Running` becomes `ShuttingDown`. A consumer that was never started goes
    /// straight to `Stopped`. Later states are left untouched.
    pub fn begin_shutdown(&self) -> LifecycleState {
        let previous = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match LifecycleState::from_u8(current) {
                    LifecycleState::Idle => Some(LifecycleState::Stopped as u8),
                    LifecycleState::Running => Some(LifecycleState::ShuttingDown as u8),
                    LifecycleState::ShuttingDown | LifecycleState::Stopped => None,
                }
            })
            .unwrap_or_else(|current| current);

        LifecycleState::from_u8(previous)
    }

    /// Record that the worker is gone
    pub fn mark_stopped(&self) {
        self.0.store(LifecycleState::Stopped as u8, Ordering::Release);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
