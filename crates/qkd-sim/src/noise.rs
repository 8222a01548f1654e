//! Channel noise models.
//!
//! A model is sampled once per transmitted qubit. The sample is either no
//! event or a single Pauli gate, which the caller applies to the qubit and
//! records for diagnostics.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{SimError, SimResult};
use crate::gate::Gate;

/// A single-qubit noise channel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoiseModel {
    /// Noiseless channel.
    #[default]
    None,

    /// Bit-flip channel: applies X with probability `p`.
    BitFlip {
        /// Flip probability (0.0 to 1.0).
        p: f64,
    },

    /// Phase-flip channel: applies Z with probability `p`.
    PhaseFlip {
        /// Flip probability (0.0 to 1.0).
        p: f64,
    },

    /// Depolarizing channel: with probability `p`, applies X, Y or Z
    /// chosen uniformly.
    Depolarizing {
        /// Error probability (0.0 to 1.0).
        p: f64,
    },
}

impl NoiseModel {
    /// Get a human-readable name for this noise model.
    pub fn name(&self) -> &'static str {
        match self {
            NoiseModel::None => "none",
            NoiseModel::BitFlip { .. } => "bit_flip",
            NoiseModel::PhaseFlip { .. } => "phase_flip",
            NoiseModel::Depolarizing { .. } => "depolarizing",
        }
    }

    /// Get the error parameter of this noise model.
    pub fn error_param(&self) -> f64 {
        match self {
            NoiseModel::None => 0.0,
            NoiseModel::BitFlip { p } | NoiseModel::PhaseFlip { p } | NoiseModel::Depolarizing { p } => *p,
        }
    }

    /// Same channel kind with a different error parameter.
    ///
    /// [`NoiseModel::None`] stays noiseless.
    #[must_use]
    pub fn with_param(&self, p: f64) -> Self {
        match self {
            NoiseModel::None => NoiseModel::None,
            NoiseModel::BitFlip { .. } => NoiseModel::BitFlip { p },
            NoiseModel::PhaseFlip { .. } => NoiseModel::PhaseFlip { p },
            NoiseModel::Depolarizing { .. } => NoiseModel::Depolarizing { p },
        }
    }

    /// Check that the error parameter is a probability.
    pub fn validate(&self) -> SimResult<()> {
        let p = self.error_param();
        if !(0.0..=1.0).contains(&p) {
            return Err(SimError::InvalidProbability(p));
        }
        Ok(())
    }

    /// Draw the noise event for one qubit, if any.
    ///
    /// A noiseless model (or `p == 0`) draws nothing from `rng`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Gate> {
        let p = self.error_param();
        if p <= 0.0 || !rng.gen_bool(p.min(1.0)) {
            return None;
        }
        match self {
            NoiseModel::None => None,
            NoiseModel::BitFlip { .. } => Some(Gate::X),
            NoiseModel::PhaseFlip { .. } => Some(Gate::Z),
            NoiseModel::Depolarizing { .. } => Some(Gate::random_pauli(rng)),
        }
    }
}

impl fmt::Display for NoiseModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoiseModel::None => write!(f, "none"),
            NoiseModel::BitFlip { p } => write!(f, "bit_flip(p={p:.4})"),
            NoiseModel::PhaseFlip { p } => write!(f, "phase_flip(p={p:.4})"),
            NoiseModel::Depolarizing { p } => write!(f, "depolarizing(p={p:.4})"),
        }
    }
}
