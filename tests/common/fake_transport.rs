//! In-memory transport with an instrumented call log
//!
//! The outbound (dispatcher) side answers according to a switchable
//! [`DispatcherMode`]; the inbound (job) side is fed by the test through
//! [`FakeHandle::request`]. Every channel operation is appended to a shared
//! event log so tests can assert on ordering.

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use powerhose_worker::{Channel, Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Dispatcher,
    Jobs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect(String),
    Bind(String),
    Send(Side, Vec<u8>),
    Poll(Side),
    Recv(Side),
    Close(Side),
    Terminate,
}

impl Event {
    pub fn is_dispatcher_send(&self, tag: &str) -> bool {
        matches!(self, Event::Send(Side::Dispatcher, frame) if frame.starts_with(tag.as_bytes()))
    }
}

/// How the fake dispatcher reacts to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatcherMode {
    /// `PONG` for `PING`, `REMOVED` for `REMOVE`
    Answer,
    /// Never reply
    Silent,
    /// Reply with this frame whatever the request
    Reply(Vec<u8>),
}

#[derive(Debug)]
struct FakeState {
    events: Mutex<Vec<Event>>,
    mode: Mutex<DispatcherMode>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    open_channels: AtomicUsize,
    terminated: AtomicBool,
    fail_jobs: AtomicBool,
    violations: Mutex<Vec<String>>,
}

impl FakeState {
    fn record(&self, event: Event) {
        if self.terminated.load(Ordering::Acquire) {
            self.violations
                .lock()
                .push(format!("{event:?} after terminate"));
        }
        self.events.lock().push(event);
    }
}

pub struct FakeChannel {
    side: Side,
    state: Arc<FakeState>,
    pending: Option<Vec<u8>>,
    requests: Receiver<Vec<u8>>,
    replies: Sender<Vec<u8>>,
}

impl FakeChannel {
    fn finish_round_trip(&self) {
        self.state.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Channel for FakeChannel {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.state.record(Event::Send(self.side, frame.to_vec()));
        match self.side {
            Side::Dispatcher => {
                let in_flight = self.state.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
                self.state.max_in_flight.fetch_max(in_flight, Ordering::AcqRel);
                // Widen the window in which an overlapping round trip would show
                thread::sleep(Duration::from_micros(200));

                self.pending = match &*self.state.mode.lock() {
                    DispatcherMode::Answer if frame.starts_with(b"PING") => Some(b"PONG".to_vec()),
                    DispatcherMode::Answer if frame.starts_with(b"REMOVE") => {
                        Some(b"REMOVED".to_vec())
                    }
                    DispatcherMode::Answer => Some(b"ERROR".to_vec()),
                    DispatcherMode::Silent => None,
                    DispatcherMode::Reply(reply) => Some(reply.clone()),
                };
            }
            Side::Jobs => {
                let _ = self.replies.send(frame.to_vec());
            }
        }
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        self.state.record(Event::Poll(self.side));
        match self.side {
            Side::Dispatcher => {
                if self.pending.is_some() {
                    return Ok(true);
                }
                thread::sleep(timeout);
                self.finish_round_trip();
                Ok(false)
            }
            Side::Jobs => {
                if self.state.fail_jobs.load(Ordering::Acquire) {
                    return Err(TransportError::Socket("job socket failure".to_string()));
                }
                if self.pending.is_none() {
                    self.pending = self.requests.recv_timeout(timeout).ok();
                }
                Ok(self.pending.is_some())
            }
        }
    }

    fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        self.state.record(Event::Recv(self.side));
        let frame = self.pending.take().ok_or(TransportError::Closed)?;
        if self.side == Side::Dispatcher {
            self.finish_round_trip();
        }
        Ok(frame)
    }
}

impl Drop for FakeChannel {
    fn drop(&mut self) {
        self.state.open_channels.fetch_sub(1, Ordering::AcqRel);
        self.state.record(Event::Close(self.side));
    }
}

pub struct FakeTransport {
    state: Arc<FakeState>,
    requests: Receiver<Vec<u8>>,
    replies: Sender<Vec<u8>>,
}

impl FakeTransport {
    fn channel(&self, side: Side) -> FakeChannel {
        self.state.open_channels.fetch_add(1, Ordering::AcqRel);
        FakeChannel {
            side,
            state: self.state.clone(),
            pending: None,
            requests: self.requests.clone(),
            replies: self.replies.clone(),
        }
    }
}

impl Transport for FakeTransport {
    type Channel = FakeChannel;

    fn connect(&self, endpoint: &str) -> Result<FakeChannel, TransportError> {
        self.state.record(Event::Connect(endpoint.to_string()));
        Ok(self.channel(Side::Dispatcher))
    }

    fn bind(&self, address: &str) -> Result<FakeChannel, TransportError> {
        self.state.record(Event::Bind(address.to_string()));
        Ok(self.channel(Side::Jobs))
    }

    fn terminate(self) -> Result<(), TransportError> {
        let open = self.state.open_channels.load(Ordering::Acquire);
        if open != 0 {
            self.state
                .violations
                .lock()
                .push(format!("terminate with {open} open channels"));
        }
        self.state.record(Event::Terminate);
        self.state.terminated.store(true, Ordering::Release);
        Ok(())
    }
}

/// Test-side view of a [`FakeTransport`]
#[derive(Clone)]
pub struct FakeHandle {
    state: Arc<FakeState>,
    requests: Sender<Vec<u8>>,
    replies: Receiver<Vec<u8>>,
}

impl FakeHandle {
    pub fn set_dispatcher(&self, mode: DispatcherMode) {
        *self.state.mode.lock() = mode;
    }

    /// Send a request to the worker's job channel and wait for its reply
    pub fn request(&self, frame: &[u8]) -> Option<Vec<u8>> {
        self.requests.send(frame.to_vec()).ok()?;
        self.replies.recv_timeout(Duration::from_secs(5)).ok()
    }

    /// Make every later poll on the job channel fail
    pub fn fail_jobs(&self) {
        self.state.fail_jobs.store(true, Ordering::Release);
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.events.lock().clone()
    }

    pub fn position(&self, predicate: impl Fn(&Event) -> bool) -> Option<usize> {
        self.state.events.lock().iter().position(predicate)
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.state.events.lock().iter().filter(|event| predicate(event)).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::Acquire)
    }

    pub fn is_terminated(&self) -> bool {
        self.state.terminated.load(Ordering::Acquire)
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.violations.lock().clone()
    }

    /// Poll `condition` until it holds or `timeout` elapses
    pub fn wait_for(&self, timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }
}

pub fn fake_transport(mode: DispatcherMode) -> (FakeTransport, FakeHandle) {
    let state = Arc::new(FakeState {
        events: Mutex::new(Vec::new()),
        mode: Mutex::new(mode),
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
        open_channels: AtomicUsize::new(0),
        terminated: AtomicBool::new(false),
        fail_jobs: AtomicBool::new(false),
        violations: Mutex::new(Vec::new()),
    });
    let (request_tx, request_rx) = channel::unbounded();
    let (reply_tx, reply_rx) = channel::unbounded();

    (
        FakeTransport {
            state: state.clone(),
            requests: request_rx,
            replies: reply_tx,
        },
        FakeHandle {
            state,
            requests: request_tx,
            replies: reply_rx,
        },
    )
}
