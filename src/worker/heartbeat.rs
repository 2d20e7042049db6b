//! # Heartbeat Monitor
//!
//! Background thread that periodically proves liveness to the dispatcher
//! with a `PING`/`PONG` round trip. After `max_failures` consecutive failed
//! heartbeats it flips the `unresponsive` flag, invokes the failure callback once
//! and exits.
//!
//! The monitor only holds a weak reference to the [`RegistrationProtocol`]:
//! the worker owns the dispatcher channel and the monitor never keeps it
//! alive. Stopping the monitor yields a [`MonitorStopped`] token, which is
//! what the worker needs to tear its channels down.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::HeartbeatConfig;
use crate::error::WorkerError;
use crate::protocol::{RegistrationProtocol, Tag};
use crate::stats::WorkerStats;
use crate::transport::Channel;

/// Proof that the heartbeat thread has exited and will not touch the
/// dispatcher channel again
#[must_use = "the token is required to tear down the connection context"]
#[derive(Debug)]
pub struct MonitorStopped {
    _private: (),
}

impl MonitorStopped {
    fn new() -> Self {
        Self { _private: () }
    }
}

enum Phase {
    Idle,
    Running(RunningMonitor),
    Finished,
}

struct RunningMonitor {
    /// Dropping the sender wakes the thread and ends its loop
    stop_tx: Option<Sender<()>>,
    /// Disconnects when the thread returns
    exited: Receiver<()>,
    thread: ThreadId,
    handle: JoinHandle<()>,
}

/// Periodic liveness check sharing the dispatcher channel with the worker
pub struct HeartbeatMonitor<C: Channel> {
    protocol: Weak<RegistrationProtocol<C>>,
    identity: String,
    config: HeartbeatConfig,
    stats: Arc<WorkerStats>,
    unresponsive: Arc<AtomicBool>,
    phase: Mutex<Phase>,
}

impl<C: Channel> HeartbeatMonitor<C> {
    pub fn new(
        identity: impl Into<String>,
        protocol: Weak<RegistrationProtocol<C>>,
        config: HeartbeatConfig,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            protocol,
            identity: identity.into(),
            config,
            stats,
            unresponsive: Arc::new(AtomicBool::new(false)),
            phase: Mutex::new(Phase::Idle),
        }
    }

    /// Start pinging on a background thread. `on_failure` runs on that
    /// thread, at most once, when the failure threshold is reached.
    pub fn start<F>(&self, on_failure: F) -> Result<(), WorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut phase = self.phase.lock();
        if !matches!(*phase, Phase::Idle) {
            return Err(WorkerError::Heartbeat(
                "monitor can only be started once".to_string(),
            ));
        }

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let (exit_tx, exited) = channel::bounded::<()>(1);
        let pinger = Pinger {
            protocol: self.protocol.clone(),
            identity: self.identity.clone(),
            interval: self.config.interval(),
            max_failures: self.config.max_failures.max(1),
            stats: self.stats.clone(),
            unresponsive: self.unresponsive.clone(),
        };

        let handle = thread::Builder::new()
            .name("heartbeat".to_string())
            .spawn(move || {
                let _exit = exit_tx;
                pinger.run(stop_rx, on_failure);
            })
            .map_err(|e| WorkerError::Heartbeat(format!("failed to spawn heartbeat thread: {e}")))?;

        info!(
            identity = %self.identity,
            interval_ms = self.config.interval().as_millis() as u64,
            max_failures = self.config.max_failures,
            "💓 Heartbeat monitor started"
        );

        *phase = Phase::Running(RunningMonitor {
            stop_tx: Some(stop_tx),
            exited,
            thread: handle.thread().id(),
            handle,
        });
        Ok(())
    }

    /// Stop pinging and wait for the background thread to exit
    ///
    /// Idempotent. Returns `None` only when called from the heartbeat thread
    /// itself (from the failure callback): the exit is then requested but
    /// cannot be awaited, and a later call from another thread completes it.
    pub fn stop(&self) -> Option<MonitorStopped> {
        let exited = {
            let mut phase = self.phase.lock();
            match &mut *phase {
                Phase::Idle => {
                    *phase = Phase::Finished;
                    return Some(MonitorStopped::new());
                }
                Phase::Finished => return Some(MonitorStopped::new()),
                Phase::Running(running) => {
                    running.stop_tx.take();
                    if running.thread == thread::current().id() {
                        debug!(identity = %self.identity, "Heartbeat stop requested from monitor thread");
                        return None;
                    }
                    running.exited.clone()
                }
            }
        };

        // The phase lock is released while waiting so the failure callback
        // can call back into stop()
        let _ = exited.recv();

        let mut phase = self.phase.lock();
        if let Phase::Running(running) = std::mem::replace(&mut *phase, Phase::Finished) {
            if running.handle.join().is_err() {
                warn!(identity = %self.identity, "Heartbeat thread panicked");
            }
            debug!(identity = %self.identity, "💓 Heartbeat monitor stopped");
        }
        Some(MonitorStopped::new())
    }

    pub fn is_unresponsive(&self) -> bool {
        self.unresponsive.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.phase.lock(), Phase::Running(_))
    }
}

/// State moved onto the heartbeat thread
struct Pinger<C: Channel> {
    protocol: Weak<RegistrationProtocol<C>>,
    identity: String,
    interval: Duration,
    max_failures: u32,
    stats: Arc<WorkerStats>,
    unresponsive: Arc<AtomicBool>,
}

impl<C: Channel> Pinger<C> {
    fn run<F: FnOnce()>(self, stop_rx: Receiver<()>, on_failure: F) {
        let mut consecutive_failures = 0u32;

        loop {
            match stop_rx.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            let Some(protocol) = self.protocol.upgrade() else {
                debug!(identity = %self.identity, "Dispatcher channel gone, heartbeat exiting");
                break;
            };

            WorkerStats::incr(&self.stats.heartbeats_sent);
            let result = protocol.round_trip(Tag::Ping, Tag::Pong);
            drop(protocol);

            match result {
                Ok(()) => {
                    if consecutive_failures > 0 {
                        info!(
                            identity = %self.identity,
                            after_failures = consecutive_failures,
                            "💓 Heartbeat recovered"
                        );
                    }
                    consecutive_failures = 0;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    WorkerStats::incr(&self.stats.heartbeats_failed);
                    warn!(
                        identity = %self.identity,
                        error = %e,
                        consecutive_failures,
                        max_failures = self.max_failures,
                        "⚠️ Heartbeat failed"
                    );

                    if consecutive_failures >= self.max_failures {
                        self.unresponsive.store(true, Ordering::Release);
                        error!(
                            identity = %self.identity,
                            "💔 Dispatcher unreachable, worker is unresponsive"
                        );
                        on_failure();
                        break;
                    }
                }
            }
        }
    }
}
