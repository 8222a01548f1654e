//! Intercept-resend adversary.

use qkd_sim::{Basis, Bit, QubitState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::check_probability;
use crate::error::QkdResult;

/// What the eavesdropper learned from one intercepted qubit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interception {
    /// Basis the eavesdropper measured in.
    pub basis: Basis,
    /// Bit read out.
    pub bit: Bit,
}

/// Measures qubits in a random basis and forwards a fresh qubit encoding
/// the result in that same basis.
///
/// Whenever the chosen basis differs from the sender's, the forwarded state
/// is wrong half of the time, which is what the error estimate picks up.
#[derive(Debug)]
pub struct Eavesdropper {
    intercept_probability: f64,
    rng: StdRng,
    log: Vec<Interception>,
}

impl Eavesdropper {
    /// Create an eavesdropper with its own random stream.
    pub fn new(intercept_probability: f64, seed: u64) -> QkdResult<Self> {
        check_probability("eve_intercept_probability", intercept_probability)?;
        Ok(Self {
            intercept_probability,
            rng: StdRng::seed_from_u64(seed),
            log: Vec::new(),
        })
    }

    /// Configured interception probability.
    pub fn intercept_probability(&self) -> f64 {
        self.intercept_probability
    }

    /// Every interception so far, in order.
    pub fn interceptions(&self) -> &[Interception] {
        &self.log
    }

    /// Possibly intercept `qubit`.
    ///
    /// Returns the qubit to forward, together with the interception record
    /// when it was measured. A qubit let through is returned untouched.
    pub fn intercept(&mut self, qubit: QubitState) -> QkdResult<(QubitState, Option<Interception>)> {
        if !self.rng.gen_bool(self.intercept_probability) {
            return Ok((qubit, None));
        }
        let basis = Basis::random(&mut self.rng);
        let measurement = qubit.measure(basis, &mut self.rng)?;
        let record = Interception {
            basis,
            bit: measurement.bit,
        };
        trace!(basis = %basis, bit = %measurement.bit, "intercepted qubit");
        self.log.push(record);
        Ok((measurement.collapsed.reprepare(), Some(record)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_intercepts_at_zero() {
        let mut eve = Eavesdropper::new(0.0, 1).unwrap();
        for _ in 0..100 {
            let (q, record) = eve.intercept(QubitState::encode(Bit::One, Basis::Diagonal)).unwrap();
            assert!(record.is_none());
            assert!((q.probability(Basis::Diagonal, Bit::One) - 1.0).abs() < 1e-12);
        }
        assert!(eve.interceptions().is_empty());
    }

    #[test]
    fn test_forwards_own_measurement() {
        let mut eve = Eavesdropper::new(1.0, 2).unwrap();
        for _ in 0..100 {
            let (q, record) = eve.intercept(QubitState::encode(Bit::Zero, Basis::Diagonal)).unwrap();
            let record = record.unwrap();
            assert!((q.probability(record.basis, record.bit) - 1.0).abs() < 1e-12);
            if record.basis == Basis::Diagonal {
                assert_eq!(record.bit, Bit::Zero);
            }
        }
        assert_eq!(eve.interceptions().len(), 100);
    }

    #[test]
    fn test_rejects_invalid_probability() {
        assert!(Eavesdropper::new(1.5, 0).is_err());
    }
}
