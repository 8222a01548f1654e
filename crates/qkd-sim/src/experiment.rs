//! Gate error experiments.
//!
//! Each trial prepares |0⟩, applies a gate, passes the qubit through a noise
//! channel, undoes the gate with its adjoint and measures in the rectilinear
//! basis. Without noise the outcome is always 0, so every 1 is an error
//! introduced by the channel as seen through that gate.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::basis::Basis;
use crate::error::SimResult;
use crate::gate::Gate;
use crate::noise::NoiseModel;
use crate::state::QubitState;

/// A noisy gate experiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateErrorExperiment {
    /// Gate under test.
    pub gate: Gate,
    /// Noise applied between the gate and its adjoint.
    pub noise: NoiseModel,
    /// Number of trials.
    pub trials: u32,
}

/// Outcome of a [`GateErrorExperiment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateErrorReport {
    /// Gate under test.
    pub gate: Gate,
    /// Noise model used.
    pub noise: NoiseModel,
    /// Number of trials run.
    pub trials: u32,
    /// Trials that measured 1.
    pub errors: u32,
    /// `errors / trials`, or 0 for zero trials.
    pub error_rate: f64,
}

impl GateErrorExperiment {
    /// Create an experiment.
    pub fn new(gate: Gate, noise: NoiseModel, trials: u32) -> Self {
        Self { gate, noise, trials }
    }

    /// Run every trial with `rng`.
    pub fn run<R: Rng + ?Sized>(&self, rng: &mut R) -> SimResult<GateErrorReport> {
        self.gate.validate()?;
        self.noise.validate()?;
        let inverse = self.gate.adjoint();

        let mut errors = 0u32;
        for _ in 0..self.trials {
            let mut q = QubitState::prepare();
            q.apply(self.gate)?;
            if let Some(event) = self.noise.sample(rng) {
                q.apply(event)?;
            }
            q.apply(inverse)?;
            if q.measure(Basis::Rectilinear, rng)?.bit.is_one() {
                errors += 1;
            }
        }

        let error_rate = if self.trials == 0 {
            0.0
        } else {
            f64::from(errors) / f64::from(self.trials)
        };
        debug!(gate = %self.gate, noise = %self.noise, errors, error_rate, "gate experiment done");
        Ok(GateErrorReport {
            gate: self.gate,
            noise: self.noise,
            trials: self.trials,
            errors,
            error_rate,
        })
    }
}

/// Run the cross product of `gates` and noise `probabilities`.
///
/// `kind` selects the channel; its own parameter is replaced by each
/// probability in turn. Reports are ordered gate-major.
pub fn sweep<R: Rng + ?Sized>(
    kind: NoiseModel,
    gates: &[Gate],
    probabilities: &[f64],
    trials: u32,
    rng: &mut R,
) -> SimResult<Vec<GateErrorReport>> {
    let mut reports = Vec::with_capacity(gates.len() * probabilities.len());
    for &gate in gates {
        for &p in probabilities {
            let experiment = GateErrorExperiment::new(gate, kind.with_param(p), trials);
            reports.push(experiment.run(rng)?);
        }
    }
    Ok(reports)
}
