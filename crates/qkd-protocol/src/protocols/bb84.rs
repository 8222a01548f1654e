use qkd_sim::{Basis, Bit, QubitState};
use rand::rngs::StdRng;

use super::{Prepared, Protocol, measure_outcome};
use crate::config::Variant;
use crate::error::QkdResult;
use crate::round::ProtocolRound;

/// BB84: independent random bit and basis per round, sifted on matching
/// bases.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bb84;

impl Protocol for Bb84 {
    fn variant(&self) -> Variant {
        Variant::Bb84
    }

    fn prepare(&self, rng: &mut StdRng) -> QkdResult<Prepared> {
        let bit = Bit::random(rng);
        let basis = Basis::random(rng);
        Ok(Prepared {
            bit,
            basis,
            qubit: QubitState::encode(bit, basis),
        })
    }

    fn measure(&self, qubit: QubitState, basis: Basis, rng: &mut StdRng) -> QkdResult<Bit> {
        measure_outcome(qubit, basis, rng)
    }

    fn sift_round(&self, round: &ProtocolRound) -> Option<(Bit, Bit)> {
        if !round.is_completed() || !round.bases_match() {
            return None;
        }
        Some((round.sender_bit()?, round.receiver_outcome()?))
    }
}
