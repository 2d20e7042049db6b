//! Transport Layer Abstraction
//!
//! The worker speaks to two peers over strict request/reply channels: it is
//! the requester towards the dispatcher and the responder towards job
//! senders. These traits abstract the socket library so the worker can be
//! driven by ZeroMQ in production and by in-memory fakes in tests.

pub mod zeromq;

use std::time::Duration;

use crate::error::TransportError;

pub use zeromq::ZmqTransport;

/// One end of a request/reply channel
///
/// Implementations must preserve the send/receive alternation of the
/// underlying socket; callers guarantee a channel is never used by two
/// threads at once.
pub trait Channel: Send + 'static {
    /// Send one frame. Requester channels must not block.
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Wait up to `timeout` for a frame to become readable
    fn poll(&mut self, timeout: Duration) -> Result<bool, TransportError>;

    /// Receive the frame `poll` reported as readable
    fn recv(&mut self) -> Result<Vec<u8>, TransportError>;
}

/// Owner of the transport context from which both worker channels are opened
pub trait Transport: Send + 'static {
    type Channel: Channel;

    /// Open a requester channel connected to `endpoint`
    fn connect(&self, endpoint: &str) -> Result<Self::Channel, TransportError>;

    /// Open a responder channel bound at `address`
    fn bind(&self, address: &str) -> Result<Self::Channel, TransportError>;

    /// Terminate the context. Every channel opened from it must already be
    /// closed.
    fn terminate(self) -> Result<(), TransportError>;
}
