use qkd_sim::{Basis, Bit, QubitState};
use rand::rngs::StdRng;

use super::{Prepared, Protocol};
use crate::config::Variant;
use crate::error::QkdResult;
use crate::round::ProtocolRound;

/// B92: bit 0 is sent as |+⟩, bit 1 as |1⟩.
///
/// The receiver records a click (outcome 1) only when the result rules one
/// signal state out: |0⟩ excludes |1⟩, so the bit was 0; |−⟩ excludes |+⟩,
/// so the bit was 1. A quarter of the rounds click on a clean channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct B92;

impl B92 {
    /// The basis implied by a B92 bit.
    pub fn basis_for(bit: Bit) -> Basis {
        match bit {
            Bit::Zero => Basis::Diagonal,
            Bit::One => Basis::Rectilinear,
        }
    }

    /// Bit inferred from a click in `basis`.
    pub fn inferred_bit(basis: Basis) -> Bit {
        match basis {
            Basis::Rectilinear => Bit::Zero,
            Basis::Diagonal => Bit::One,
        }
    }
}

impl Protocol for B92 {
    fn variant(&self) -> Variant {
        Variant::B92
    }

    fn prepare(&self, rng: &mut StdRng) -> QkdResult<Prepared> {
        let bit = Bit::random(rng);
        let basis = Self::basis_for(bit);
        Ok(Prepared {
            bit,
            basis,
            qubit: QubitState::encode(bit, basis),
        })
    }

    fn measure(&self, qubit: QubitState, basis: Basis, rng: &mut StdRng) -> QkdResult<Bit> {
        let raw = qubit.measure(basis, rng)?.bit;
        let click = match basis {
            Basis::Rectilinear => raw == Bit::Zero,
            Basis::Diagonal => raw == Bit::One,
        };
        Ok(Bit::from(click))
    }

    fn sift_round(&self, round: &ProtocolRound) -> Option<(Bit, Bit)> {
        if round.receiver_outcome()? != Bit::One {
            return None;
        }
        Some((round.sender_bit()?, Self::inferred_bit(round.receiver_basis())))
    }

    fn announces_bases(&self) -> bool {
        false
    }
}
