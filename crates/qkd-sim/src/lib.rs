//! `qkd-sim` - minimal qubit simulator for QKD protocol engines.
//!
//! Provides exactly the quantum mechanics a prepare-and-measure or
//! entanglement-based key distribution run needs:
//!
//! - [`QubitState`]: a normalized amplitude pair with Born-rule measurement
//! - [`Gate`]: a closed set of single-qubit unitaries as literal 2×2 matrices
//! - [`BellPair`]: a genuine two-qubit joint state with correlated collapse
//! - [`NoiseModel`]: Pauli noise channels sampled per qubit
//! - [`GateErrorExperiment`]: gate/noise characterization runs
//!
//! Randomness is always injected by the caller, so any run is reproducible
//! from a seed.
//!
//! # Quick start
//!
//! ```rust
//! use qkd_sim::{Basis, Bit, QubitState};
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let q = QubitState::encode(Bit::One, Basis::Diagonal);
//! let m = q.measure(Basis::Diagonal, &mut rng).unwrap();
//! assert_eq!(m.bit, Bit::One);
//! ```

pub mod basis;
pub mod error;
pub mod experiment;
pub mod gate;
pub mod noise;
pub mod pair;
pub mod state;

pub use basis::{Basis, Bit};
pub use error::{SimError, SimResult};
pub use experiment::{GateErrorExperiment, GateErrorReport, sweep};
pub use gate::{Gate, Matrix2};
pub use noise::NoiseModel;
pub use pair::{BellPair, BellState};
pub use state::{Collapsed, Measurement, NORM_TOLERANCE, QubitState};
