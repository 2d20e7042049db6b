//! # Worker Error Taxonomy
//!
//! Transport faults, registration round-trip failures, configuration problems
//! and lifecycle misuse. Job failures are deliberately absent: they travel
//! back to the sender as ordinary `JOBRES` payloads.

use crate::worker::state::RegistrationState;

/// Failure of an underlying channel operation (send, poll or receive)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("{0}")]
    Socket(String),

    #[error("channel closed")]
    Closed,
}

/// Failure of a tagged request/reply exchange with the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("no reply")]
    NoReply,

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

impl From<TransportError> for RegistrationError {
    fn from(err: TransportError) -> Self {
        RegistrationError::Transport(err.to_string())
    }
}

/// Envelope decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("empty frame")]
    EmptyFrame,

    #[error("tag is not valid UTF-8")]
    InvalidTag,
}

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigurationError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigurationError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Top-level worker errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("registration failed: {0}")]
    Registration(#[from] RegistrationError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("cannot {operation} a worker in state {state}")]
    InvalidState {
        operation: &'static str,
        state: RegistrationState,
    },

    #[error("heartbeat monitor error: {0}")]
    Heartbeat(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_error_messages() {
        assert_eq!(
            RegistrationError::Transport("connection refused".to_string()).to_string(),
            "transport: connection refused"
        );
        assert_eq!(RegistrationError::NoReply.to_string(), "no reply");
        assert_eq!(
            RegistrationError::UnexpectedReply("BUSY".to_string()).to_string(),
            "unexpected reply: BUSY"
        );
    }

    #[test]
    fn test_transport_error_wraps_into_registration_error() {
        let err: RegistrationError = TransportError::Closed.into();
        assert_eq!(err, RegistrationError::Transport("channel closed".to_string()));
        assert_eq!(err.to_string(), "transport: channel closed");
    }

    #[test]
    fn test_invalid_state_message() {
        let err = WorkerError::InvalidState {
            operation: "run",
            state: RegistrationState::Stopped,
        };
        assert_eq!(err.to_string(), "cannot run a worker in state stopped");
    }
}
