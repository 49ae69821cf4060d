//! Loop counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the worker and readable from anywhere
#[derive(Debug, Default)]
pub struct ConsumerStats {
    polls: AtomicU64,
    received: AtomicU64,
    handled: AtomicU64,
    acknowledged: AtomicU64,
    handler_failures: AtomicU64,
    transport_failures: AtomicU64,
}

/// Point-in-time copy of [`ConsumerStats`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub polls: u64,
    pub received: u64,
    pub handled: u64,
    pub acknowledged: u64,
    pub handler_failures: u64,
    pub transport_failures: u64,
}

impl ConsumerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_poll(&self, received: usize) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.received.fetch_add(received as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_acknowledged(&self) {
        self.acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transport_failure(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
        }
    }
}
