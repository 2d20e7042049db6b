//! # Worker Constants
//!
//! Wire tags, identity templating tokens and configuration defaults shared by
//! the worker, its heartbeat monitor and the dispatcher-facing protocol.

use std::time::Duration;

/// Envelope tags understood by the worker and the dispatcher
pub mod tags {
    // Registration and heartbeat
    pub const PING: &str = "PING";
    pub const PONG: &str = "PONG";

    // Deregistration
    pub const REMOVE: &str = "REMOVE";
    pub const REMOVED: &str = "REMOVED";

    // Job dispatch
    pub const JOB: &str = "JOB";
    pub const JOBRES: &str = "JOBRES";

    // Malformed-request acknowledgement
    pub const ERROR: &str = "ERROR";
}

/// Placeholder in an identity template replaced by the process id
pub const PROCESS_ID_TOKEN: &str = "$WID";

/// Address prefix of the filesystem-backed local transport
pub const IPC_SCHEME: &str = "ipc://";

/// Separator between tag and payload in a framed envelope
pub const FRAME_SEPARATOR: &[u8] = b":::";

/// Environment variable prefix for configuration overrides
pub const CONFIG_ENV_PREFIX: &str = "POWERHOSE";

/// Configuration defaults
pub mod defaults {
    pub const TIMEOUT_SECONDS: f64 = 1.0;
    pub const HEARTBEAT_INTERVAL_SECONDS: f64 = 0.5;
    pub const HEARTBEAT_MAX_FAILURES: u32 = 3;
    pub const SHUTDOWN_GRACE_MS: u64 = 100;
}

/// Shortest timeout the transports can honour (poll resolution)
pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Convert a timeout expressed in seconds into a `Duration`, clamping
/// negative and non-finite values to zero and overflowing ones to
/// `Duration::MAX`
pub fn seconds_to_duration(seconds: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}
