//! Single-qubit gate set.
//!
//! Every gate is a literal 2×2 unitary. Phase and rotation gates are never
//! synthesised from sequences of other gates.

use num_complex::Complex64;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2, FRAC_PI_4};
use std::fmt;

use crate::error::{SimError, SimResult};

/// A 2×2 complex matrix in row-major order.
pub type Matrix2 = [[Complex64; 2]; 2];

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);
const I: Complex64 = Complex64::new(0.0, 1.0);

/// Closed set of single-qubit gates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    /// Identity.
    Identity,
    /// Pauli-X (bit flip).
    X,
    /// Pauli-Y.
    Y,
    /// Pauli-Z (phase flip).
    Z,
    /// Hadamard.
    H,
    /// S gate, diag(1, i).
    S,
    /// S-dagger, diag(1, −i).
    Sdg,
    /// T gate, diag(1, e^{iπ/4}).
    T,
    /// T-dagger.
    Tdg,
    /// Rotation around X by θ.
    Rx(f64),
    /// Rotation around Y by θ.
    Ry(f64),
    /// Rotation around Z by θ.
    Rz(f64),
    /// Phase gate diag(1, e^{iθ}).
    Phase(f64),
}

impl Gate {
    /// The three Pauli gates, in the order used by noise sampling.
    pub const PAULIS: [Gate; 3] = [Gate::X, Gate::Y, Gate::Z];

    /// Get the name of this gate.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Gate::Identity => "id",
            Gate::X => "x",
            Gate::Y => "y",
            Gate::Z => "z",
            Gate::H => "h",
            Gate::S => "s",
            Gate::Sdg => "sdg",
            Gate::T => "t",
            Gate::Tdg => "tdg",
            Gate::Rx(_) => "rx",
            Gate::Ry(_) => "ry",
            Gate::Rz(_) => "rz",
            Gate::Phase(_) => "p",
        }
    }

    /// Rotation angle, for parameterized gates.
    pub fn angle(&self) -> Option<f64> {
        match self {
            Gate::Rx(t) | Gate::Ry(t) | Gate::Rz(t) | Gate::Phase(t) => Some(*t),
            _ => None,
        }
    }

    /// Check that a parameterized gate carries a finite angle.
    pub fn validate(&self) -> SimResult<()> {
        match self.angle() {
            Some(t) if !t.is_finite() => Err(SimError::InvalidAngle(t)),
            _ => Ok(()),
        }
    }

    /// Whether the gate is its own inverse.
    pub fn is_self_inverse(&self) -> bool {
        matches!(
            self,
            Gate::Identity | Gate::X | Gate::Y | Gate::Z | Gate::H
        )
    }

    /// The inverse gate U†.
    #[must_use]
    pub fn adjoint(&self) -> Gate {
        match *self {
            Gate::S => Gate::Sdg,
            Gate::Sdg => Gate::S,
            Gate::T => Gate::Tdg,
            Gate::Tdg => Gate::T,
            Gate::Rx(t) => Gate::Rx(-t),
            Gate::Ry(t) => Gate::Ry(-t),
            Gate::Rz(t) => Gate::Rz(-t),
            Gate::Phase(t) => Gate::Phase(-t),
            g => g,
        }
    }

    /// Draw one of X, Y, Z uniformly.
    pub fn random_pauli<R: Rng + ?Sized>(rng: &mut R) -> Gate {
        Gate::PAULIS[rng.gen_range(0..Gate::PAULIS.len())]
    }

    /// The unitary matrix of this gate.
    pub fn matrix(&self) -> Matrix2 {
        match *self {
            Gate::Identity => [[ONE, ZERO], [ZERO, ONE]],
            Gate::X => [[ZERO, ONE], [ONE, ZERO]],
            Gate::Y => [[ZERO, -I], [I, ZERO]],
            Gate::Z => [[ONE, ZERO], [ZERO, -ONE]],
            Gate::H => {
                let h = Complex64::new(FRAC_1_SQRT_2, 0.0);
                [[h, h], [h, -h]]
            }
            Gate::S => phase_matrix(FRAC_PI_2),
            Gate::Sdg => phase_matrix(-FRAC_PI_2),
            Gate::T => phase_matrix(FRAC_PI_4),
            Gate::Tdg => phase_matrix(-FRAC_PI_4),
            Gate::Phase(t) => phase_matrix(t),
            Gate::Rx(t) => {
                let c = Complex64::new((t / 2.0).cos(), 0.0);
                let neg_i_s = Complex64::new(0.0, -(t / 2.0).sin());
                [[c, neg_i_s], [neg_i_s, c]]
            }
            Gate::Ry(t) => {
                let c = Complex64::new((t / 2.0).cos(), 0.0);
                let s = Complex64::new((t / 2.0).sin(), 0.0);
                [[c, -s], [s, c]]
            }
            Gate::Rz(t) => [
                [Complex64::from_polar(1.0, -t / 2.0), ZERO],
                [ZERO, Complex64::from_polar(1.0, t / 2.0)],
            ],
        }
    }

    /// Parse a gate name as printed by [`Gate::name`].
    ///
    /// Parameterized gates take the angle in radians after a colon,
    /// e.g. `rx:1.5708`.
    pub fn parse(text: &str) -> Option<Gate> {
        let (name, arg) = match text.split_once(':') {
            Some((n, a)) => (n, Some(a)),
            None => (text, None),
        };
        let angle = || arg.and_then(|a| a.trim().parse::<f64>().ok());
        match (name.trim().to_lowercase().as_str(), arg) {
            ("id" | "i", None) => Some(Gate::Identity),
            ("x", None) => Some(Gate::X),
            ("y", None) => Some(Gate::Y),
            ("z", None) => Some(Gate::Z),
            ("h", None) => Some(Gate::H),
            ("s", None) => Some(Gate::S),
            ("sdg", None) => Some(Gate::Sdg),
            ("t", None) => Some(Gate::T),
            ("tdg", None) => Some(Gate::Tdg),
            ("rx", Some(_)) => angle().map(Gate::Rx),
            ("ry", Some(_)) => angle().map(Gate::Ry),
            ("rz", Some(_)) => angle().map(Gate::Rz),
            ("p", Some(_)) => angle().map(Gate::Phase),
            _ => None,
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.angle() {
            Some(t) => write!(f, "{}({:.4})", self.name(), t),
            None => write!(f, "{}", self.name()),
        }
    }
}

fn phase_matrix(theta: f64) -> Matrix2 {
    [[ONE, ZERO], [ZERO, Complex64::from_polar(1.0, theta)]]
}

/// Multiply a 2×2 matrix by a column vector (α, β).
#[inline]
pub(crate) fn apply_matrix(m: &Matrix2, alpha: Complex64, beta: Complex64) -> (Complex64, Complex64) {
    (
        m[0][0] * alpha + m[0][1] * beta,
        m[1][0] * alpha + m[1][1] * beta,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn approx_eq(a: Complex64, b: Complex64) -> bool {
        (a - b).norm() < 1e-10
    }

    fn mul(a: &Matrix2, b: &Matrix2) -> Matrix2 {
        let mut out = [[ZERO; 2]; 2];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = a[r][0] * b[0][c] + a[r][1] * b[1][c];
            }
        }
        out
    }

    fn is_identity(m: &Matrix2) -> bool {
        approx_eq(m[0][0], ONE)
            && approx_eq(m[1][1], ONE)
            && approx_eq(m[0][1], ZERO)
            && approx_eq(m[1][0], ZERO)
    }

    fn all_gates() -> Vec<Gate> {
        vec![
            Gate::Identity,
            Gate::X,
            Gate::Y,
            Gate::Z,
            Gate::H,
            Gate::S,
            Gate::Sdg,
            Gate::T,
            Gate::Tdg,
            Gate::Rx(0.3),
            Gate::Ry(1.1),
            Gate::Rz(-2.4),
            Gate::Phase(PI / 3.0),
        ]
    }

    #[test]
    fn test_gates_are_unitary() {
        for gate in all_gates() {
            let m = gate.matrix();
            let adj = gate.adjoint().matrix();
            assert!(is_identity(&mul(&m, &adj)), "{gate} · {gate}† != I");
        }
    }

    #[test]
    fn test_self_inverse_gates() {
        for gate in all_gates().into_iter().filter(Gate::is_self_inverse) {
            let m = gate.matrix();
            assert!(is_identity(&mul(&m, &m)), "{gate} is not self-inverse");
            assert_eq!(gate.adjoint(), gate);
        }
        assert!(!Gate::S.is_self_inverse());
        assert!(!Gate::Rx(0.1).is_self_inverse());
    }

    #[test]
    fn test_s_squared_is_z_and_t_squared_is_s() {
        let s2 = mul(&Gate::S.matrix(), &Gate::S.matrix());
        let z = Gate::Z.matrix();
        let t2 = mul(&Gate::T.matrix(), &Gate::T.matrix());
        let s = Gate::S.matrix();
        for r in 0..2 {
            for c in 0..2 {
                assert!(approx_eq(s2[r][c], z[r][c]));
                assert!(approx_eq(t2[r][c], s[r][c]));
            }
        }
    }

    #[test]
    fn test_rx_pi_is_x_up_to_phase() {
        // RX(π) = -i X
        let m = Gate::Rx(PI).matrix();
        assert!(approx_eq(m[0][0], ZERO));
        assert!(approx_eq(m[0][1], -I));
        assert!(approx_eq(m[1][0], -I));
    }

    #[test]
    fn test_parse_roundtrip_names() {
        assert_eq!(Gate::parse("H"), Some(Gate::H));
        assert_eq!(Gate::parse("sdg"), Some(Gate::Sdg));
        assert_eq!(Gate::parse("rx:0.5"), Some(Gate::Rx(0.5)));
        assert_eq!(Gate::parse("rx"), None);
        assert_eq!(Gate::parse("x:1.0"), None);
        assert_eq!(Gate::parse("cnot"), None);
    }

    #[test]
    fn test_validate_rejects_nan_angle() {
        assert!(Gate::Rz(f64::NAN).validate().is_err());
        assert!(Gate::Rz(1.0).validate().is_ok());
        assert!(Gate::H.validate().is_ok());
    }
}
