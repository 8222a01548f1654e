//! Two-qubit entangled pairs for entanglement-based key distribution.
//!
//! The joint state is a 4-amplitude statevector. Index bit 0 addresses the
//! retained qubit (A), index bit 1 the transmitted qubit (B). Measuring one
//! half collapses the joint state; the other half is then released as an
//! ordinary [`QubitState`].

use num_complex::Complex64;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_1_SQRT_2;
use std::fmt;

use crate::basis::{Basis, Bit};
use crate::error::{SimError, SimResult};
use crate::state::{NORM_TOLERANCE, QubitState, sample_outcome};

/// Which Bell state a source emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BellState {
    /// |Φ+⟩ = (|00⟩ + |11⟩)/√2: equal outcomes in Z and X.
    #[default]
    PhiPlus,
    /// |Ψ−⟩ = (|01⟩ − |10⟩)/√2: opposite outcomes in Z and X.
    PsiMinus,
}

impl BellState {
    /// XOR of the two parties' outcomes when both measure in `basis`.
    pub fn expected_parity(self, basis: Basis) -> Bit {
        match (self, basis) {
            (BellState::PhiPlus, _) => Bit::Zero,
            (BellState::PsiMinus, _) => Bit::One,
        }
    }
}

impl fmt::Display for BellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BellState::PhiPlus => write!(f, "phi_plus"),
            BellState::PsiMinus => write!(f, "psi_minus"),
        }
    }
}

/// A two-qubit joint state.
///
/// Not `Clone`, for the same reason as [`QubitState`].
#[derive(Debug)]
pub struct BellPair {
    amplitudes: [Complex64; 4],
}

const MASK_A: usize = 1;
const MASK_B: usize = 2;

impl BellPair {
    /// Prepare a Bell state from |00⟩ with H on A and CX(A → B).
    ///
    /// |Ψ−⟩ additionally starts from |11⟩ (X on both qubits).
    pub fn prepare(kind: BellState) -> Self {
        let mut pair = Self {
            amplitudes: [
                Complex64::new(1.0, 0.0),
                Complex64::new(0.0, 0.0),
                Complex64::new(0.0, 0.0),
                Complex64::new(0.0, 0.0),
            ],
        };
        if kind == BellState::PsiMinus {
            pair.apply_x(MASK_A);
            pair.apply_x(MASK_B);
        }
        pair.apply_h(MASK_A);
        pair.apply_cx(MASK_A, MASK_B);
        pair
    }

    /// Raw amplitudes, indexed by `a | (b << 1)`.
    pub fn amplitudes(&self) -> &[Complex64; 4] {
        &self.amplitudes
    }

    /// Check the normalization invariant.
    pub fn validate(&self) -> SimResult<()> {
        if self
            .amplitudes
            .iter()
            .any(|a| !a.re.is_finite() || !a.im.is_finite())
        {
            return Err(SimError::NonFinite);
        }
        let norm_sqr: f64 = self.amplitudes.iter().map(Complex64::norm_sqr).sum();
        if (norm_sqr - 1.0).abs() > NORM_TOLERANCE {
            return Err(SimError::NotNormalized { norm_sqr });
        }
        Ok(())
    }

    /// Measure the retained qubit A in `basis`.
    ///
    /// Returns A's outcome and the collapsed transmitted qubit B, which the
    /// caller owns from here on.
    pub fn measure_retained<R: Rng + ?Sized>(
        mut self,
        basis: Basis,
        rng: &mut R,
    ) -> SimResult<(Bit, QubitState)> {
        self.validate()?;
        if basis == Basis::Diagonal {
            self.apply_h(MASK_A);
        }

        let p_one: f64 = self
            .amplitudes
            .iter()
            .enumerate()
            .filter(|(i, _)| i & MASK_A != 0)
            .map(|(_, a)| a.norm_sqr())
            .sum();
        let bit = sample_outcome(p_one.clamp(0.0, 1.0), rng);
        let a_index = usize::from(bit.as_u8());

        // Remaining amplitudes of B given A = bit.
        let b0 = self.amplitudes[a_index];
        let b1 = self.amplitudes[a_index | MASK_B];
        let norm = (b0.norm_sqr() + b1.norm_sqr()).sqrt();
        if norm <= f64::EPSILON {
            return Err(SimError::ImpossibleOutcome {
                outcome: bit.as_u8(),
                probability: norm * norm,
            });
        }
        let partner = QubitState::from_amplitudes(b0 / norm, b1 / norm)?;
        Ok((bit, partner))
    }

    fn apply_x(&mut self, mask: usize) {
        for i in 0..4 {
            if i & mask == 0 {
                self.amplitudes.swap(i, i | mask);
            }
        }
    }

    fn apply_h(&mut self, mask: usize) {
        for i in 0..4 {
            if i & mask == 0 {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = FRAC_1_SQRT_2 * (a + b);
                self.amplitudes[j] = FRAC_1_SQRT_2 * (a - b);
            }
        }
    }

    fn apply_cx(&mut self, ctrl_mask: usize, tgt_mask: usize) {
        for i in 0..4 {
            if (i & ctrl_mask != 0) && (i & tgt_mask == 0) {
                self.amplitudes.swap(i, i | tgt_mask);
            }
        }
    }
}
