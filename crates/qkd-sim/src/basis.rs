//! Classical values attached to qubits: bits and measurement bases.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A classical bit, either a random choice or a measurement outcome.
///
/// Serializes as the integer `0` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Bit {
    /// Logical 0.
    Zero,
    /// Logical 1.
    One,
}

impl Bit {
    /// Draw a uniformly random bit.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Bit::from(rng.gen_bool(0.5))
    }

    /// The bit as `0` or `1`.
    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            Bit::Zero => 0,
            Bit::One => 1,
        }
    }

    /// The complementary bit.
    #[inline]
    #[must_use]
    pub fn flip(self) -> Self {
        match self {
            Bit::Zero => Bit::One,
            Bit::One => Bit::Zero,
        }
    }

    /// Exclusive or of two bits.
    #[inline]
    #[must_use]
    pub fn xor(self, other: Bit) -> Self {
        Bit::from(self != other)
    }

    /// `true` for [`Bit::One`].
    #[inline]
    pub fn is_one(self) -> bool {
        self == Bit::One
    }
}

impl From<bool> for Bit {
    fn from(value: bool) -> Self {
        if value { Bit::One } else { Bit::Zero }
    }
}

impl From<Bit> for u8 {
    fn from(bit: Bit) -> Self {
        bit.as_u8()
    }
}

impl TryFrom<u8> for Bit {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Bit::Zero),
            1 => Ok(Bit::One),
            other => Err(format!("bit must be 0 or 1, got {other}")),
        }
    }
}

impl fmt::Display for Bit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Measurement basis.
///
/// `Rectilinear` is the computational (Z) basis {|0⟩, |1⟩};
/// `Diagonal` is the Hadamard (X) basis {|+⟩, |−⟩}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Basis {
    /// Z basis.
    Rectilinear,
    /// X basis.
    Diagonal,
}

impl Basis {
    /// Draw a uniformly random basis.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.gen_bool(0.5) {
            Basis::Diagonal
        } else {
            Basis::Rectilinear
        }
    }

    /// The conjugate basis.
    #[inline]
    #[must_use]
    pub fn conjugate(self) -> Self {
        match self {
            Basis::Rectilinear => Basis::Diagonal,
            Basis::Diagonal => Basis::Rectilinear,
        }
    }

    /// Single-byte wire code (`0` = rectilinear, `1` = diagonal).
    #[inline]
    pub fn code(self) -> u8 {
        match self {
            Basis::Rectilinear => 0,
            Basis::Diagonal => 1,
        }
    }

    /// Inverse of [`Basis::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Basis::Rectilinear),
            1 => Some(Basis::Diagonal),
            _ => None,
        }
    }

    /// Short symbol used in round tables.
    pub fn symbol(self) -> &'static str {
        match self {
            Basis::Rectilinear => "+",
            Basis::Diagonal => "x",
        }
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Basis::Rectilinear => write!(f, "rectilinear"),
            Basis::Diagonal => write!(f, "diagonal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_bit_conversions() {
        assert_eq!(Bit::from(true), Bit::One);
        assert_eq!(Bit::One.as_u8(), 1);
        assert_eq!(Bit::try_from(0u8), Ok(Bit::Zero));
        assert!(Bit::try_from(2u8).is_err());
        assert_eq!(Bit::One.flip(), Bit::Zero);
        assert_eq!(Bit::One.xor(Bit::One), Bit::Zero);
        assert_eq!(Bit::Zero.xor(Bit::One), Bit::One);
    }

    #[test]
    fn test_bit_serializes_as_integer() {
        let json = serde_json::to_string(&vec![Bit::One, Bit::Zero]).unwrap();
        assert_eq!(json, "[1,0]");
        let back: Vec<Bit> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Bit::One, Bit::Zero]);
        assert!(serde_json::from_str::<Bit>("3").is_err());
    }

    #[test]
    fn test_basis_codes() {
        for basis in [Basis::Rectilinear, Basis::Diagonal] {
            assert_eq!(Basis::from_code(basis.code()), Some(basis));
            assert_ne!(basis.conjugate(), basis);
        }
        assert_eq!(Basis::from_code(7), None);
    }

    #[test]
    fn test_random_choices_cover_both_values() {
        let mut rng = StdRng::seed_from_u64(7);
        let bases: Vec<_> = (0..64).map(|_| Basis::random(&mut rng)).collect();
        assert!(bases.contains(&Basis::Rectilinear));
        assert!(bases.contains(&Basis::Diagonal));
    }
}
