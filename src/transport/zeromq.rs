//! # ZeroMQ Transport
//!
//! REQ socket towards the dispatcher, REP socket for incoming jobs, both
//! opened from one context owned by the worker.

use std::time::Duration;
use tracing::{debug, info};
use zmq::{Context, Socket, SocketType};

use super::{Channel, Transport};
use crate::error::TransportError;

impl From<zmq::Error> for TransportError {
    fn from(err: zmq::Error) -> Self {
        match err {
            zmq::Error::ETERM => TransportError::Closed,
            other => TransportError::Socket(other.to_string()),
        }
    }
}

/// ZeroMQ context owning the worker's sockets
pub struct ZmqTransport {
    context: Context,
}

impl ZmqTransport {
    pub fn new() -> Self {
        Self {
            context: Context::new(),
        }
    }

    fn open(&self, kind: SocketType) -> Result<Socket, TransportError> {
        let socket = self.context.socket(kind)?;
        // Closing must never block on undelivered frames
        socket.set_linger(0)?;
        Ok(socket)
    }
}

impl Default for ZmqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ZmqTransport {
    type Channel = ZmqChannel;

    fn connect(&self, endpoint: &str) -> Result<ZmqChannel, TransportError> {
        let socket = self.open(SocketType::REQ)?;
        // A round trip that timed out must not leave the REQ state machine
        // waiting for a reply that will never be read
        socket.set_req_relaxed(true)?;
        socket.set_req_correlate(true)?;
        socket.connect(endpoint)?;
        info!("✅ Dispatcher socket connected to: {}", endpoint);

        Ok(ZmqChannel {
            socket,
            send_flags: zmq::DONTWAIT,
        })
    }

    fn bind(&self, address: &str) -> Result<ZmqChannel, TransportError> {
        let socket = self.open(SocketType::REP)?;
        socket.bind(address)?;
        info!("✅ Job socket bound to: {}", address);

        Ok(ZmqChannel {
            socket,
            send_flags: 0,
        })
    }

    fn terminate(mut self) -> Result<(), TransportError> {
        debug!("🧹 Terminating ZeroMQ context");
        self.context.destroy()?;
        Ok(())
    }
}

/// A single ZeroMQ socket
pub struct ZmqChannel {
    socket: Socket,
    send_flags: i32,
}

impl Channel for ZmqChannel {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.socket.send(frame, self.send_flags)?;
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        // zmq_poll takes milliseconds
        let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        let ready = self.socket.poll(zmq::POLLIN, timeout_ms)?;
        Ok(ready > 0)
    }

    fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        Ok(self.socket.recv_bytes(0)?)
    }
}
