//! # Registration Protocol
//!
//! Lock-protected, bounded-timeout request/reply exchange with the
//! dispatcher. Registration (`PING`/`PONG`), deregistration
//! (`REMOVE`/`REMOVED`) and every heartbeat ping go through
//! [`RegistrationProtocol::round_trip`], so the dispatcher channel never has
//! two overlapping exchanges.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::envelope::{Envelope, EnvelopeCodec, Tag};
use crate::error::{RegistrationError, TransportError};
use crate::transport::Channel;

/// Owner of the dispatcher-facing requester channel
pub struct RegistrationProtocol<C: Channel> {
    identity: String,
    timeout: Duration,
    codec: Arc<dyn EnvelopeCodec>,
    /// `None` once the channel has been closed for teardown
    channel: Mutex<Option<C>>,
}

impl<C: Channel> RegistrationProtocol<C> {
    pub fn new(
        identity: impl Into<String>,
        channel: C,
        timeout: Duration,
        codec: Arc<dyn EnvelopeCodec>,
    ) -> Self {
        Self {
            identity: identity.into(),
            timeout,
            codec,
            channel: Mutex::new(Some(channel)),
        }
    }

    /// Send `(request, identity)` and wait for a reply tagged `expected`
    ///
    /// The channel lock is held from the send until the reply (or timeout),
    /// so concurrent callers queue up behind each other.
    pub fn round_trip(&self, request: Tag, expected: Tag) -> Result<(), RegistrationError> {
        let mut guard = self.channel.lock();
        let channel = guard
            .as_mut()
            .ok_or_else(|| RegistrationError::from(TransportError::Closed))?;

        let frame = self
            .codec
            .encode(&Envelope::new(request.clone(), self.identity.as_bytes()));
        channel.send(&frame)?;
        trace!(identity = %self.identity, tag = %request, "Sent dispatcher request");

        if !channel.poll(self.timeout)? {
            debug!(
                identity = %self.identity,
                tag = %request,
                timeout_ms = self.timeout.as_millis() as u64,
                "No reply from dispatcher"
            );
            return Err(RegistrationError::NoReply);
        }

        let reply = channel.recv()?;
        match self.codec.decode(&reply) {
            Ok(envelope) if envelope.tag == expected => {
                trace!(identity = %self.identity, tag = %envelope.tag, "Dispatcher replied");
                Ok(())
            }
            _ => Err(RegistrationError::UnexpectedReply(
                String::from_utf8_lossy(&reply).into_owned(),
            )),
        }
    }

    /// Close the dispatcher channel. Later round trips fail with a transport
    /// error instead of touching the socket.
    pub fn close(&self) {
        if self.channel.lock().take().is_some() {
            debug!(identity = %self.identity, "Closed dispatcher channel");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.channel.lock().is_none()
    }
}
