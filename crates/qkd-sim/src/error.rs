//! Error types for the simulator crate.

use thiserror::Error;

/// Errors produced by the qubit simulator.
///
/// Every variant indicates a broken simulator invariant or an invalid
/// argument; none of them is expected during a correct protocol run.
#[derive(Debug, Clone, Error, PartialEq)]
#[non_exhaustive]
pub enum SimError {
    /// Amplitudes no longer satisfy |α|² + |β|² = 1.
    #[error("State is not normalized: norm squared = {norm_sqr}")]
    NotNormalized {
        /// The observed squared norm.
        norm_sqr: f64,
    },

    /// An amplitude is NaN or infinite.
    #[error("State contains a non-finite amplitude")]
    NonFinite,

    /// A probability argument was outside [0, 1].
    #[error("Probability {0} is outside [0, 1]")]
    InvalidProbability(f64),

    /// A rotation angle was NaN or infinite.
    #[error("Rotation angle {0} is not finite")]
    InvalidAngle(f64),

    /// A collapse was requested onto an outcome with zero probability.
    #[error("Cannot collapse onto outcome {outcome} with probability {probability}")]
    ImpossibleOutcome {
        /// The requested outcome.
        outcome: u8,
        /// Its Born-rule probability.
        probability: f64,
    },
}

/// Result type for simulator operations.
pub type SimResult<T> = Result<T, SimError>;
