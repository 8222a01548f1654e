//! Single-qubit state: two complex amplitudes and their measurement rules.

use num_complex::Complex64;
use rand::Rng;
use std::f64::consts::FRAC_1_SQRT_2;
use std::fmt;

use crate::basis::{Basis, Bit};
use crate::error::{SimError, SimResult};
use crate::gate::{Gate, apply_matrix};

/// Tolerance on |α|² + |β|² = 1.
pub const NORM_TOLERANCE: f64 = 1e-9;

/// Probabilities closer than this to 0 or 1 are treated as certain.
const CERTAINTY_EPSILON: f64 = 1e-12;

/// A live single-qubit state α|0⟩ + β|1⟩.
///
/// The type is deliberately not `Clone`: a qubit has exactly one owner, and
/// handing it to a channel moves it. Measuring consumes the state and yields a
/// [`Collapsed`] record instead.
#[derive(Debug, PartialEq)]
pub struct QubitState {
    alpha: Complex64,
    beta: Complex64,
}

impl QubitState {
    /// Create a new qubit in |0⟩.
    pub fn prepare() -> Self {
        Self {
            alpha: Complex64::new(1.0, 0.0),
            beta: Complex64::new(0.0, 0.0),
        }
    }

    /// Create a qubit from explicit amplitudes, checking normalization.
    pub fn from_amplitudes(alpha: Complex64, beta: Complex64) -> SimResult<Self> {
        let state = Self { alpha, beta };
        state.validate()?;
        Ok(state)
    }

    /// Prepare the eigenstate of `basis` that encodes `bit`.
    ///
    /// |0⟩, |1⟩ for rectilinear; |+⟩, |−⟩ for diagonal. Built as X (if the
    /// bit is 1) followed by H (if diagonal).
    pub fn encode(bit: Bit, basis: Basis) -> Self {
        let mut q = Self::prepare();
        if bit.is_one() {
            q.apply_x();
        }
        if basis == Basis::Diagonal {
            q.apply_h();
        }
        q
    }

    /// Amplitude of |0⟩.
    #[inline]
    pub fn alpha(&self) -> Complex64 {
        self.alpha
    }

    /// Amplitude of |1⟩.
    #[inline]
    pub fn beta(&self) -> Complex64 {
        self.beta
    }

    /// |α|² + |β|².
    #[inline]
    pub fn norm_sqr(&self) -> f64 {
        self.alpha.norm_sqr() + self.beta.norm_sqr()
    }

    /// Check the normalization invariant.
    pub fn validate(&self) -> SimResult<()> {
        let amps = [self.alpha.re, self.alpha.im, self.beta.re, self.beta.im];
        if amps.iter().any(|a| !a.is_finite()) {
            return Err(SimError::NonFinite);
        }
        let norm_sqr = self.norm_sqr();
        if (norm_sqr - 1.0).abs() > NORM_TOLERANCE {
            return Err(SimError::NotNormalized { norm_sqr });
        }
        Ok(())
    }

    /// Apply a gate and re-check normalization.
    pub fn apply(&mut self, gate: Gate) -> SimResult<()> {
        gate.validate()?;
        let (a, b) = apply_matrix(&gate.matrix(), self.alpha, self.beta);
        self.alpha = a;
        self.beta = b;
        self.validate()
    }

    /// Apply Pauli-X.
    pub fn apply_x(&mut self) {
        std::mem::swap(&mut self.alpha, &mut self.beta);
    }

    /// Apply Pauli-Y.
    pub fn apply_y(&mut self) {
        let i_val = Complex64::new(0.0, 1.0);
        let tmp = self.alpha;
        self.alpha = -i_val * self.beta;
        self.beta = i_val * tmp;
    }

    /// Apply Pauli-Z.
    pub fn apply_z(&mut self) {
        self.beta = -self.beta;
    }

    /// Apply Hadamard.
    pub fn apply_h(&mut self) {
        let a = self.alpha;
        let b = self.beta;
        self.alpha = FRAC_1_SQRT_2 * (a + b);
        self.beta = FRAC_1_SQRT_2 * (a - b);
    }

    /// Born-rule probability of reading `bit` when measuring in `basis`.
    pub fn probability(&self, basis: Basis, bit: Bit) -> f64 {
        let p_one = match basis {
            Basis::Rectilinear => self.beta.norm_sqr(),
            // ⟨−|ψ⟩ = (α − β)/√2
            Basis::Diagonal => (self.alpha - self.beta).norm_sqr() / 2.0,
        };
        let p_one = p_one.clamp(0.0, 1.0);
        match bit {
            Bit::One => p_one,
            Bit::Zero => 1.0 - p_one,
        }
    }

    /// Measure projectively in `basis`, consuming the state.
    ///
    /// The outcome is deterministic (and draws nothing from `rng`) when the
    /// state is an eigenstate of `basis`; otherwise it is sampled from the
    /// Born rule. The returned [`Collapsed`] is the post-measurement eigenstate.
    pub fn measure<R: Rng + ?Sized>(self, basis: Basis, rng: &mut R) -> SimResult<Measurement> {
        self.validate()?;
        let p_one = self.probability(basis, Bit::One);
        let bit = sample_outcome(p_one, rng);
        Ok(Measurement {
            bit,
            collapsed: Collapsed { basis, bit },
        })
    }
}

impl fmt::Display for QubitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.4}{:+.4}i)|0⟩ + ({:.4}{:+.4}i)|1⟩",
            self.alpha.re, self.alpha.im, self.beta.re, self.beta.im
        )
    }
}

/// Draw a bit with P(1) = `p_one`, short-circuiting certain outcomes.
pub(crate) fn sample_outcome<R: Rng + ?Sized>(p_one: f64, rng: &mut R) -> Bit {
    if p_one <= CERTAINTY_EPSILON {
        Bit::Zero
    } else if p_one >= 1.0 - CERTAINTY_EPSILON {
        Bit::One
    } else {
        Bit::from(rng.r#gen::<f64>() < p_one)
    }
}

/// Result of a projective measurement.
#[derive(Debug, PartialEq)]
pub struct Measurement {
    /// The observed bit.
    pub bit: Bit,
    /// The post-measurement state.
    pub collapsed: Collapsed,
}

/// A qubit after measurement: an eigenstate of the basis it was measured in.
///
/// Measuring again in the same basis returns the same bit; measuring in the
/// conjugate basis is uniformly random. The record can be turned back into a
/// live qubit only through [`Collapsed::reprepare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collapsed {
    basis: Basis,
    bit: Bit,
}

impl Collapsed {
    /// The basis the state collapsed in.
    pub fn basis(&self) -> Basis {
        self.basis
    }

    /// The eigenvalue label it collapsed to.
    pub fn bit(&self) -> Bit {
        self.bit
    }

    /// Measure the collapsed eigenstate again.
    pub fn measure<R: Rng + ?Sized>(self, basis: Basis, rng: &mut R) -> Measurement {
        if basis == self.basis {
            return Measurement {
                bit: self.bit,
                collapsed: self,
            };
        }
        let p_one = self.reprepare().probability(basis, Bit::One);
        let bit = sample_outcome(p_one, rng);
        Measurement {
            bit,
            collapsed: Collapsed { basis, bit },
        }
    }

    /// Re-prepare a live qubit in the collapsed eigenstate.
    pub fn reprepare(self) -> QubitState {
        QubitState::encode(self.bit, self.basis)
    }
}
