//! # Worker
//!
//! The worker process node: lifecycle states, the heartbeat monitor and the
//! job-serving [`WorkerNode`].

pub mod heartbeat;
pub mod node;
pub mod state;

pub use heartbeat::{HeartbeatMonitor, MonitorStopped};
pub use node::{WorkerNode, WorkerNodeBuilder};
pub use state::{ExitReason, RegistrationState};
