//! Per-qubit round records.

use qkd_sim::{Basis, Bit, Gate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a round produced no measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DropReason {
    /// The qubit never reached the receiver.
    Timeout,
}

/// Terminal state of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RoundStatus {
    /// The receiver measured the qubit.
    Completed,
    /// The round is excluded from sifting.
    Dropped {
        /// What went wrong.
        reason: DropReason,
    },
}

/// One transmitted qubit and everything both parties recorded about it.
///
/// Rounds are built once all fields are known and are immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolRound {
    index: usize,
    sender_bit: Option<Bit>,
    sender_basis: Basis,
    receiver_basis: Basis,
    receiver_outcome: Option<Bit>,
    intercepted_by_eve: bool,
    noise_applied: Option<Gate>,
    status: RoundStatus,
}

impl ProtocolRound {
    /// A round whose qubit was measured.
    pub fn completed(
        index: usize,
        sender_bit: Bit,
        sender_basis: Basis,
        receiver_basis: Basis,
        receiver_outcome: Bit,
    ) -> Self {
        Self {
            index,
            sender_bit: Some(sender_bit),
            sender_basis,
            receiver_basis,
            receiver_outcome: Some(receiver_outcome),
            intercepted_by_eve: false,
            noise_applied: None,
            status: RoundStatus::Completed,
        }
    }

    /// A round whose qubit never arrived.
    pub fn dropped(
        index: usize,
        sender_bit: Bit,
        sender_basis: Basis,
        receiver_basis: Basis,
        reason: DropReason,
    ) -> Self {
        Self {
            index,
            sender_bit: Some(sender_bit),
            sender_basis,
            receiver_basis,
            receiver_outcome: None,
            intercepted_by_eve: false,
            noise_applied: None,
            status: RoundStatus::Dropped { reason },
        }
    }

    /// Record what happened to the qubit in transit.
    #[must_use]
    pub fn with_transit(mut self, intercepted_by_eve: bool, noise_applied: Option<Gate>) -> Self {
        self.intercepted_by_eve = intercepted_by_eve;
        self.noise_applied = noise_applied;
        self
    }

    /// Position in the run.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Sender's key bit (the measured bit for E91).
    pub fn sender_bit(&self) -> Option<Bit> {
        self.sender_bit
    }

    /// Sender's basis.
    pub fn sender_basis(&self) -> Basis {
        self.sender_basis
    }

    /// Receiver's basis.
    pub fn receiver_basis(&self) -> Basis {
        self.receiver_basis
    }

    /// Receiver's recorded outcome; `None` for dropped rounds.
    pub fn receiver_outcome(&self) -> Option<Bit> {
        self.receiver_outcome
    }

    /// Whether the eavesdropper measured this qubit.
    pub fn intercepted_by_eve(&self) -> bool {
        self.intercepted_by_eve
    }

    /// Noise event applied in transit.
    pub fn noise_applied(&self) -> Option<Gate> {
        self.noise_applied
    }

    /// Terminal state.
    pub fn status(&self) -> RoundStatus {
        self.status
    }

    /// Whether the round was measured.
    pub fn is_completed(&self) -> bool {
        self.status == RoundStatus::Completed
    }

    /// Whether sender and receiver chose the same basis.
    pub fn bases_match(&self) -> bool {
        self.sender_basis == self.receiver_basis
    }
}

impl fmt::Display for ProtocolRound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bit = |b: Option<Bit>| b.map_or_else(|| "-".to_string(), |b| b.to_string());
        write!(
            f,
            "#{:<4} {} {} -> {} {}",
            self.index,
            bit(self.sender_bit),
            self.sender_basis.symbol(),
            self.receiver_basis.symbol(),
            bit(self.receiver_outcome),
        )?;
        if self.intercepted_by_eve {
            write!(f, " [eve]")?;
        }
        if let Some(gate) = self.noise_applied {
            write!(f, " [noise {gate}]")?;
        }
        if let RoundStatus::Dropped { reason } = self.status {
            write!(f, " [dropped: {reason:?}]")?;
        }
        Ok(())
    }
}
