//! # Worker Statistics
//!
//! Lock-free counters shared between the job loop, the registration protocol
//! and the heartbeat monitor. A single `Arc<WorkerStats>` is handed to every
//! component at construction time instead of living in global state.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Worker counters
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub registrations_attempted: AtomicU64,
    pub registrations_successful: AtomicU64,
    pub deregistrations_attempted: AtomicU64,
    pub deregistrations_successful: AtomicU64,
    pub heartbeats_sent: AtomicU64,
    pub heartbeats_failed: AtomicU64,
    pub jobs_received: AtomicU64,
    pub jobs_failed: AtomicU64,
    pub malformed_requests: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatsSnapshot {
    pub registrations_attempted: u64,
    pub registrations_successful: u64,
    pub deregistrations_attempted: u64,
    pub deregistrations_successful: u64,
    pub heartbeats_sent: u64,
    pub heartbeats_failed: u64,
    pub jobs_received: u64,
    pub jobs_failed: u64,
    pub malformed_requests: u64,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            registrations_attempted: self.registrations_attempted.load(Ordering::Relaxed),
            registrations_successful: self.registrations_successful.load(Ordering::Relaxed),
            deregistrations_attempted: self.deregistrations_attempted.load(Ordering::Relaxed),
            deregistrations_successful: self.deregistrations_successful.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            heartbeats_failed: self.heartbeats_failed.load(Ordering::Relaxed),
            jobs_received: self.jobs_received.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            malformed_requests: self.malformed_requests.load(Ordering::Relaxed),
        }
    }
}
