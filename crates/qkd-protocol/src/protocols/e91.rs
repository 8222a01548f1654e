use qkd_sim::{Basis, BellPair, BellState, Bit, QubitState};
use rand::rngs::StdRng;

use super::{Prepared, Protocol, measure_outcome};
use crate::config::Variant;
use crate::error::QkdResult;
use crate::round::ProtocolRound;

/// E91: the source emits a Bell pair, the sender measures one half and the
/// other half travels to the receiver.
///
/// Matching-basis rounds are kept. The receiver's key bit is the measured
/// outcome corrected by the Bell state's parity, so anti-correlated states
/// yield the same key as correlated ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct E91 {
    bell_state: BellState,
}

impl E91 {
    /// Create an E91 protocol using `bell_state`.
    pub fn new(bell_state: BellState) -> Self {
        Self { bell_state }
    }

    /// The emitted Bell state.
    pub fn bell_state(&self) -> BellState {
        self.bell_state
    }
}

impl Protocol for E91 {
    fn variant(&self) -> Variant {
        Variant::E91
    }

    fn prepare(&self, rng: &mut StdRng) -> QkdResult<Prepared> {
        let basis = Basis::random(rng);
        let (bit, partner) = BellPair::prepare(self.bell_state).measure_retained(basis, rng)?;
        Ok(Prepared {
            bit,
            basis,
            qubit: partner,
        })
    }

    fn measure(&self, qubit: QubitState, basis: Basis, rng: &mut StdRng) -> QkdResult<Bit> {
        measure_outcome(qubit, basis, rng)
    }

    fn sift_round(&self, round: &ProtocolRound) -> Option<(Bit, Bit)> {
        if !round.is_completed() || !round.bases_match() {
            return None;
        }
        let parity = self.bell_state.expected_parity(round.receiver_basis());
        Some((round.sender_bit()?, round.receiver_outcome()?.xor(parity)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_correlated_key_bits() {
        for state in [BellState::PhiPlus, BellState::PsiMinus] {
            let protocol = E91::new(state);
            let mut rng = StdRng::seed_from_u64(4);
            for i in 0..200 {
                let p = protocol.prepare(&mut rng).unwrap();
                let outcome = protocol.measure(p.qubit, p.basis, &mut rng).unwrap();
                let round = ProtocolRound::completed(i, p.bit, p.basis, p.basis, outcome);
                let (a, b) = protocol.sift_round(&round).unwrap();
                assert_eq!(a, b, "{state}");
            }
        }
    }

    #[test]
    fn test_psi_minus_raw_outcomes_are_anticorrelated() {
        let protocol = E91::new(BellState::PsiMinus);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            let p = protocol.prepare(&mut rng).unwrap();
            let outcome = protocol.measure(p.qubit, p.basis, &mut rng).unwrap();
            assert_eq!(outcome, p.bit.flip());
        }
    }
}
