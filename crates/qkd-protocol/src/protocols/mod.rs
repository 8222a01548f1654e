//! Protocol variants.
//!
//! A [`Protocol`] decides how the sender prepares each qubit, how the
//! receiver turns a measurement into a recorded outcome, and which rounds
//! survive sifting. The engine drives all three without knowing the variant.

mod b92;
mod bb84;
mod e91;

pub use b92::B92;
pub use bb84::Bb84;
pub use e91::E91;

use qkd_sim::{Basis, Bit, QubitState};
use rand::rngs::StdRng;

use crate::config::{RunConfig, Variant};
use crate::error::QkdResult;
use crate::round::ProtocolRound;

/// Sender side of one round.
#[derive(Debug)]
pub struct Prepared {
    /// Sender's key bit.
    pub bit: Bit,
    /// Basis the qubit was prepared (or, for E91, measured) in.
    pub basis: Basis,
    /// Qubit to transmit.
    pub qubit: QubitState,
}

/// One key distribution scheme.
pub trait Protocol: Send + Sync {
    /// Which variant this is.
    fn variant(&self) -> Variant;

    /// Draw the sender's choices and produce the qubit to send.
    fn prepare(&self, rng: &mut StdRng) -> QkdResult<Prepared>;

    /// Measure a received qubit and return the outcome to record.
    fn measure(&self, qubit: QubitState, basis: Basis, rng: &mut StdRng) -> QkdResult<Bit>;

    /// Key bits `(sender, receiver)` this round contributes, if it survives
    /// sifting.
    fn sift_round(&self, round: &ProtocolRound) -> Option<(Bit, Bit)>;

    /// Whether the receiver announces bases (BB84, E91) rather than
    /// conclusive outcomes (B92).
    fn announces_bases(&self) -> bool {
        true
    }
}

/// Build the protocol selected by `config`.
pub fn for_config(config: &RunConfig) -> Box<dyn Protocol> {
    match config.variant {
        Variant::Bb84 => Box::new(Bb84),
        Variant::B92 => Box::new(B92),
        Variant::E91 => Box::new(E91::new(config.bell_state)),
    }
}

/// Plain projective measurement, shared by BB84 and E91.
fn measure_outcome(qubit: QubitState, basis: Basis, rng: &mut StdRng) -> QkdResult<Bit> {
    Ok(qubit.measure(basis, rng)?.bit)
}
