#![allow(clippy::doc_markdown)] // Allow technical terms like ZeroMQ, PONG in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Powerhose Worker
//!
//! Worker node for a brokered job-distribution cluster.
//!
//! ## Overview
//!
//! A worker binds a responder socket at its own identity, registers with a
//! central dispatcher and then answers `JOB` requests by running a
//! user-supplied handler. A background heartbeat keeps pinging the
//! dispatcher; when it stops answering the worker deregisters and exits its
//! loop, leaving process supervision to decide whether to restart it.
//!
//! ## Wire Protocol
//!
//! Every message is a tagged envelope (`TAG:::payload` with the default
//! codec):
//!
//! | Direction | Request | Reply |
//! |-----------|---------|-------|
//! | worker → dispatcher | `PING`, identity | `PONG` |
//! | worker → dispatcher | `REMOVE`, identity | `REMOVED` |
//! | sender → worker | `JOB`, job payload | `JOBRES`, result or error text |
//! | sender → worker | anything else | `ERROR`, empty |
//!
//! ## Module Organization
//!
//! - [`config`] - Layered worker configuration
//! - [`constants`] - Wire tags and defaults
//! - [`error`] - Structured error handling
//! - [`identity`] - Worker address resolution and IPC cleanup
//! - [`job`] - Jobs, decoders and handlers
//! - [`logging`] - Structured logging setup
//! - [`protocol`] - Envelope codec and registration round trip
//! - [`stats`] - Worker counters
//! - [`transport`] - Channel abstraction and the ZeroMQ transport
//! - [`worker`] - Lifecycle, heartbeat monitor and the worker node
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use powerhose_worker::{Job, WorkerConfig, WorkerNode, ZmqTransport};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WorkerConfig::new("ipc:///tmp/powerhose-front.ipc", "ipc:///tmp/worker-$WID.ipc");
//! let handler = |job: Job| -> anyhow::Result<Vec<u8>> { Ok(job.data.into_bytes()) };
//!
//! let node = WorkerNode::new(config, handler, ZmqTransport::new())?;
//! let reason = node.run()?;
//! println!("worker exited: {reason}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod identity;
pub mod job;
pub mod logging;
pub mod protocol;
pub mod stats;
pub mod transport;
pub mod worker;

pub use config::{HeartbeatConfig, WorkerConfig};
pub use error::{
    CodecError, ConfigurationError, RegistrationError, Result, TransportError, WorkerError,
};
pub use identity::WorkerIdentity;
pub use job::{Job, JobDecoder, JobHandler, JobOutcome, JsonJobDecoder};
pub use protocol::{Envelope, EnvelopeCodec, FramedCodec, RegistrationProtocol, Tag};
pub use stats::{WorkerStats, WorkerStatsSnapshot};
pub use transport::{Channel, Transport, ZmqTransport};
pub use worker::{ExitReason, RegistrationState, WorkerNode, WorkerNodeBuilder};
