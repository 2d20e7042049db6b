//! # Worker Node
//!
//! A worker registers with the dispatcher, serves `JOB` requests on its own
//! responder channel and keeps proving liveness through the heartbeat
//! monitor. Shutdown always follows the same order: the heartbeat is stopped
//! first, then the worker deregisters, and only then are the channels and
//! the transport context destroyed.
//!
//! [`WorkerNode`] is a cheap, cloneable handle: one clone blocks in
//! [`WorkerNode::run`] while another calls [`WorkerNode::stop`] from a signal
//! handler or another thread.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::heartbeat::{HeartbeatMonitor, MonitorStopped};
use super::state::{ExitReason, RegistrationState};
use crate::config::WorkerConfig;
use crate::error::{RegistrationError, TransportError, WorkerError};
use crate::identity::WorkerIdentity;
use crate::job::{self, JobDecoder, JobHandler, JsonJobDecoder};
use crate::logging::{log_error, log_job_execution, log_worker_operation};
use crate::protocol::{Envelope, EnvelopeCodec, FramedCodec, RegistrationProtocol, Tag};
use crate::stats::WorkerStats;
use crate::transport::{Channel, Transport};

/// Transport context plus the job channel, destroyed as one unit
struct ConnectionContext<T: Transport> {
    transport: T,
    /// Held here until `run()` takes it, and handed back for teardown
    inbound: Option<T::Channel>,
}

impl<T: Transport> ConnectionContext<T> {
    /// Close both channels and terminate the context. Requires proof that
    /// the heartbeat thread can no longer reach the dispatcher channel.
    fn destroy(
        mut self,
        _stopped: MonitorStopped,
        protocol: &RegistrationProtocol<T::Channel>,
    ) -> Result<(), TransportError> {
        protocol.close();
        drop(self.inbound.take());
        self.transport.terminate()
    }
}

/// Builder for [`WorkerNode`]
pub struct WorkerNodeBuilder {
    config: WorkerConfig,
    handler: Box<dyn JobHandler>,
    codec: Arc<dyn EnvelopeCodec>,
    job_decoder: Arc<dyn JobDecoder>,
    stats: Arc<WorkerStats>,
    process_id: u32,
}

impl WorkerNodeBuilder {
    pub fn new(config: WorkerConfig, handler: impl JobHandler) -> Self {
        Self {
            config,
            handler: Box::new(handler),
            codec: Arc::new(FramedCodec),
            job_decoder: Arc::new(JsonJobDecoder),
            stats: Arc::new(WorkerStats::new()),
            process_id: std::process::id(),
        }
    }

    /// Envelope codec for both channels (default: [`FramedCodec`])
    pub fn codec(mut self, codec: Arc<dyn EnvelopeCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Job payload decoder (default: [`JsonJobDecoder`])
    pub fn job_decoder(mut self, decoder: Arc<dyn JobDecoder>) -> Self {
        self.job_decoder = decoder;
        self
    }

    /// Share counters with the caller
    pub fn stats(mut self, stats: Arc<WorkerStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Process id substituted for `$WID` in the identity template
    pub fn process_id(mut self, process_id: u32) -> Self {
        self.process_id = process_id;
        self
    }

    /// Validate the configuration, resolve the identity and open both
    /// channels. Nothing is sent until [`WorkerNode::run`].
    pub fn build<T: Transport>(self, transport: T) -> Result<WorkerNode<T>, WorkerError> {
        self.config.validate()?;

        let identity = WorkerIdentity::resolve(&self.config.identity, self.process_id);
        let timeout = self.config.timeout();

        let outbound = match transport.connect(&self.config.endpoint) {
            Ok(channel) => channel,
            Err(e) => {
                log_error("worker", "connect", &e.to_string(), Some(&self.config.endpoint));
                let _ = transport.terminate();
                return Err(e.into());
            }
        };

        let inbound = match transport.bind(identity.address()) {
            Ok(channel) => channel,
            Err(e) => {
                log_error("worker", "bind", &e.to_string(), Some(identity.address()));
                drop(outbound);
                let _ = transport.terminate();
                identity.cleanup();
                return Err(e.into());
            }
        };

        let protocol = Arc::new(RegistrationProtocol::new(
            identity.address(),
            outbound,
            timeout,
            self.codec.clone(),
        ));
        let monitor = HeartbeatMonitor::new(
            identity.address(),
            Arc::downgrade(&protocol),
            self.config.heartbeat.clone(),
            self.stats.clone(),
        );

        info!(
            identity = %identity,
            endpoint = %self.config.endpoint,
            timeout_ms = timeout.as_millis() as u64,
            "🏗️ Worker created"
        );

        Ok(WorkerNode {
            inner: Arc::new(NodeInner {
                identity,
                timeout,
                shutdown_grace: self.config.shutdown_grace(),
                state: Mutex::new(RegistrationState::Created),
                running: AtomicBool::new(false),
                registered: AtomicBool::new(false),
                failure_handled: AtomicBool::new(false),
                protocol,
                monitor,
                connection: Mutex::new(Some(ConnectionContext {
                    transport,
                    inbound: Some(inbound),
                })),
                handler: self.handler,
                job_decoder: self.job_decoder,
                codec: self.codec,
                stats: self.stats,
            }),
        })
    }
}

/// Handle to a worker process node
pub struct WorkerNode<T: Transport> {
    inner: Arc<NodeInner<T>>,
}

impl<T: Transport> Clone for WorkerNode<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct NodeInner<T: Transport> {
    identity: WorkerIdentity,
    timeout: Duration,
    shutdown_grace: Duration,
    state: Mutex<RegistrationState>,
    running: AtomicBool,
    registered: AtomicBool,
    failure_handled: AtomicBool,
    protocol: Arc<RegistrationProtocol<T::Channel>>,
    monitor: HeartbeatMonitor<T::Channel>,
    connection: Mutex<Option<ConnectionContext<T>>>,
    handler: Box<dyn JobHandler>,
    job_decoder: Arc<dyn JobDecoder>,
    codec: Arc<dyn EnvelopeCodec>,
    stats: Arc<WorkerStats>,
}

impl<T: Transport> WorkerNode<T> {
    /// Shorthand for [`WorkerNodeBuilder::new`] followed by `build`
    pub fn new(config: WorkerConfig, handler: impl JobHandler, transport: T) -> Result<Self, WorkerError> {
        WorkerNodeBuilder::new(config, handler).build(transport)
    }

    /// Register, serve jobs until stopped or unresponsive, then shut down
    ///
    /// Blocks the calling thread. A worker runs at most once; calling `run`
    /// again, or after `stop`, fails with [`WorkerError::InvalidState`].
    pub fn run(&self) -> Result<ExitReason, WorkerError> {
        let inner = &self.inner;
        inner.begin_run()?;

        let inbound = inner
            .connection
            .lock()
            .as_mut()
            .and_then(|connection| connection.inbound.take());
        let Some(mut inbound) = inbound else {
            inner.running.store(false, Ordering::Release);
            inner.shutdown(None, false);
            return Err(TransportError::Closed.into());
        };

        if let Err(e) = inner.register() {
            log_error("worker", "register", &e.to_string(), Some(inner.identity.address()));
            inner.running.store(false, Ordering::Release);
            inner.shutdown(Some(inbound), false);
            return Err(e.into());
        }

        let weak: Weak<NodeInner<T>> = Arc::downgrade(&self.inner);
        let started = inner.monitor.start(move || {
            if let Some(inner) = weak.upgrade() {
                inner.failed();
            }
        });
        if let Err(e) = started {
            // stop() during registration finishes the monitor before it starts
            let stopped_meanwhile = !inner.running.load(Ordering::Acquire);
            inner.shutdown(Some(inbound), true);
            return if stopped_meanwhile {
                Ok(ExitReason::Stopped)
            } else {
                Err(e)
            };
        }

        {
            let mut state = inner.state.lock();
            if *state == RegistrationState::Registering {
                *state = RegistrationState::Running;
            }
        }
        log_worker_operation("run", inner.identity.address(), "running", None);

        let reason = inner.serve(&mut inbound);
        info!(identity = %inner.identity, reason = %reason, "Job loop exited");

        inner.shutdown(Some(inbound), true);
        Ok(reason)
    }

    /// Ask the running loop to exit. Idempotent, safe from any thread.
    ///
    /// A worker that never ran is torn down immediately; otherwise the
    /// thread inside [`run`](Self::run) completes the shutdown within one
    /// poll timeout.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// One `PING`/`PONG` round trip with the dispatcher
    pub fn register(&self) -> Result<(), RegistrationError> {
        self.inner.register()
    }

    pub fn state(&self) -> RegistrationState {
        *self.inner.state.lock()
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.inner.identity
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.inner.stats.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn is_registered(&self) -> bool {
        self.inner.registered.load(Ordering::Acquire)
    }

    pub fn is_unresponsive(&self) -> bool {
        self.inner.monitor.is_unresponsive()
    }
}

impl<T: Transport> NodeInner<T> {
    fn begin_run(&self) -> Result<(), WorkerError> {
        let mut state = self.state.lock();
        if *state != RegistrationState::Created {
            return Err(WorkerError::InvalidState {
                operation: "run",
                state: *state,
            });
        }
        *state = RegistrationState::Registering;
        // Set under the state lock so a concurrent stop() is never overwritten
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    fn register(&self) -> Result<(), RegistrationError> {
        WorkerStats::incr(&self.stats.registrations_attempted);
        self.protocol.round_trip(Tag::Ping, Tag::Pong)?;
        self.registered.store(true, Ordering::Release);
        WorkerStats::incr(&self.stats.registrations_successful);
        log_worker_operation("register", self.identity.address(), "registered", None);
        Ok(())
    }

    /// Best effort; the dispatcher may already be gone
    fn deregister(&self) {
        WorkerStats::incr(&self.stats.deregistrations_attempted);
        match self.protocol.round_trip(Tag::Remove, Tag::Removed) {
            Ok(()) => {
                self.registered.store(false, Ordering::Release);
                WorkerStats::incr(&self.stats.deregistrations_successful);
                log_worker_operation("deregister", self.identity.address(), "removed", None);
            }
            Err(e) => {
                debug!(identity = %self.identity, error = %e, "Deregistration failed, continuing shutdown");
            }
        }
    }

    fn serve(&self, inbound: &mut T::Channel) -> ExitReason {
        loop {
            if self.monitor.is_unresponsive() {
                return ExitReason::Unresponsive;
            }
            if !self.running.load(Ordering::Acquire) {
                return ExitReason::Stopped;
            }

            match inbound.poll(self.timeout) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => return self.transport_fault("poll", e),
            }

            let request = match inbound.recv() {
                Ok(frame) => frame,
                Err(e) => return self.transport_fault("recv", e),
            };

            let reply = self.handle_request(&request);
            if let Err(e) = inbound.send(&reply) {
                return self.transport_fault("reply", e);
            }
        }
    }

    fn transport_fault(&self, operation: &str, e: TransportError) -> ExitReason {
        log_error("worker", operation, &e.to_string(), Some(self.identity.address()));
        ExitReason::TransportFault(e.to_string())
    }

    /// Build the reply for one inbound frame. Every request gets exactly one
    /// reply so the responder channel stays in step.
    fn handle_request(&self, frame: &[u8]) -> Vec<u8> {
        let envelope = match self.codec.decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                WorkerStats::incr(&self.stats.malformed_requests);
                warn!(identity = %self.identity, error = %e, "Malformed request");
                return self.codec.encode(&Envelope::error());
            }
        };

        if envelope.tag != Tag::Job {
            WorkerStats::incr(&self.stats.malformed_requests);
            warn!(identity = %self.identity, tag = %envelope.tag, "Unexpected request tag");
            return self.codec.encode(&Envelope::error());
        }

        WorkerStats::incr(&self.stats.jobs_received);
        let started = Instant::now();
        let outcome = job::execute(
            self.handler.as_ref(),
            self.job_decoder.as_ref(),
            &envelope.payload,
        );
        if outcome.is_failure() {
            WorkerStats::incr(&self.stats.jobs_failed);
        }
        log_job_execution(self.identity.address(), started.elapsed(), &outcome);

        self.codec
            .encode(&Envelope::new(Tag::JobResult, outcome.into_payload()))
    }

    /// Failure callback; runs on the heartbeat thread
    fn failed(&self) {
        if self.failure_handled.swap(true, Ordering::AcqRel) {
            return;
        }
        warn!(identity = %self.identity, "Dispatcher stopped answering pings, leaving the cluster");
        self.deregister();
        self.stop();
    }

    fn stop(&self) {
        let owns_teardown = {
            let mut state = self.state.lock();
            self.running.store(false, Ordering::Release);
            if *state == RegistrationState::Created {
                *state = RegistrationState::Stopping;
                true
            } else {
                false
            }
        };
        let stopped = self.monitor.stop();

        if owns_teardown {
            if let Some(stopped) = stopped {
                self.teardown(stopped, None);
            }
        }
    }

    /// Shutdown sequence run by the thread that owned the job loop
    fn shutdown(&self, inbound: Option<T::Channel>, deregister: bool) {
        *self.state.lock() = RegistrationState::Stopping;

        let Some(stopped) = self.monitor.stop() else {
            // Unreachable in practice: the job loop never runs on the heartbeat thread
            error!(identity = %self.identity, "Heartbeat monitor could not be stopped, skipping teardown");
            return;
        };

        if deregister {
            self.deregister();
        }
        self.teardown(stopped, inbound);
    }

    fn teardown(&self, stopped: MonitorStopped, inbound: Option<T::Channel>) {
        thread::sleep(self.shutdown_grace);

        let connection = self.connection.lock().take();
        if let Some(mut connection) = connection {
            if inbound.is_some() {
                connection.inbound = inbound;
            }
            if let Err(e) = connection.destroy(stopped, &self.protocol) {
                warn!(identity = %self.identity, error = %e, "Transport context did not terminate cleanly");
            }
        }
        self.identity.cleanup();

        self.running.store(false, Ordering::Release);
        *self.state.lock() = RegistrationState::Stopped;
        log_worker_operation("stop", self.identity.address(), "stopped", None);
    }
}
