//! Error handling for protocol runs.

use qkd_sim::SimError;
use thiserror::Error;

use crate::classical::FrameError;
use crate::party::Party;

/// Result type for protocol operations.
pub type QkdResult<T> = Result<T, QkdError>;

/// Errors that can occur while configuring or running a protocol.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum QkdError {
    /// No qubit reached the receiver within the receive bound.
    #[error("No qubit arrived at {party} within {timeout_ms} ms")]
    ChannelTimeout { party: Party, timeout_ms: u64 },

    /// The peer end of a channel was dropped.
    #[error("Channel to {0} is closed")]
    ChannelClosed(Party),

    /// A simulator invariant was violated.
    #[error("Invalid quantum state: {0}")]
    InvalidState(#[from] SimError),

    /// More sample bits were requested than the sifted key holds.
    #[error("Requested {requested} sample bits but only {available} are sifted")]
    InsufficientSiftedKey { requested: usize, available: usize },

    /// Invalid configuration, rejected before a run starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A side-channel frame could not be decoded.
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// The peer sent a message that does not fit the current step.
    #[error("Unexpected message: expected {expected}, got {got}")]
    UnexpectedMessage { expected: String, got: String },

    /// The run was aborted by its cancel handle.
    #[error("Run cancelled")]
    Cancelled,

    /// A spawned run panicked or was aborted.
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// IO error writing results.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QkdError {
    /// Whether this error must abort a run.
    ///
    /// Timeouts only drop the affected round, and a short sifted key only
    /// clamps the sample.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            QkdError::ChannelTimeout { .. } | QkdError::InsufficientSiftedKey { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let timeout = QkdError::ChannelTimeout {
            party: Party::Bob,
            timeout_ms: 50,
        };
        assert!(!timeout.is_fatal());
        assert!(
            !QkdError::InsufficientSiftedKey {
                requested: 4,
                available: 2
            }
            .is_fatal()
        );
        assert!(QkdError::InvalidState(SimError::NonFinite).is_fatal());
        assert!(QkdError::Cancelled.is_fatal());
        assert!(QkdError::ChannelClosed(Party::Alice).is_fatal());
    }

    #[test]
    fn test_messages() {
        let err = QkdError::ChannelTimeout {
            party: Party::Bob,
            timeout_ms: 50,
        };
        assert_eq!(err.to_string(), "No qubit arrived at Bob within 50 ms");
        let err: QkdError = SimError::InvalidProbability(2.0).into();
        assert!(err.to_string().contains("outside [0, 1]"));
    }
}
