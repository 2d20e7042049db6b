use serde::{Deserialize, Serialize};
use std::fmt;

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    /// Channels are open, nothing has been sent yet
    Created,
    /// Registration round trip in progress
    Registering,
    /// Registered and serving jobs
    Running,
    /// Leaving the job loop, deregistering and tearing down
    Stopping,
    /// Channels destroyed
    Stopped,
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Registering => write!(f, "registering"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Why the job loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// `stop()` was called
    Stopped,
    /// The heartbeat monitor declared the dispatcher unreachable
    Unresponsive,
    /// Polling or replying on the job channel failed
    TransportFault(String),
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Unresponsive => write!(f, "unresponsive"),
            Self::TransportFault(detail) => write!(f, "transport fault: {detail}"),
        }
    }
}
