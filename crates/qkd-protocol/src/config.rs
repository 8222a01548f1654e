//! Run configuration.
//!
//! Supports loading configuration from:
//! 1. Default values
//! 2. Configuration files (YAML)
//! 3. Environment variables (with `QKD_` prefix)
//!
//! Later sources override earlier ones. Callers (the CLI) may apply further
//! overrides and must call [`RunConfig::validate`] last.

use qkd_sim::{BellState, NoiseModel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::{QkdError, QkdResult};

/// Protocol variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Prepare-and-measure with two conjugate bases.
    #[default]
    Bb84,
    /// Two non-orthogonal states with unambiguous discrimination.
    B92,
    /// Entanglement-based, correlations of Bell pairs.
    E91,
}

impl Variant {
    /// All variants, in display order.
    pub const ALL: [Variant; 3] = [Variant::Bb84, Variant::B92, Variant::E91];
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Bb84 => write!(f, "BB84"),
            Variant::B92 => write!(f, "B92"),
            Variant::E91 => write!(f, "E91"),
        }
    }
}

impl FromStr for Variant {
    type Err = QkdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bb84" => Ok(Variant::Bb84),
            "b92" => Ok(Variant::B92),
            "e91" => Ok(Variant::E91),
            other => Err(QkdError::Configuration(format!(
                "Unknown variant: {other} (expected bb84, b92 or e91)"
            ))),
        }
    }
}

/// Configuration of a single protocol run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Protocol variant.
    #[serde(default)]
    pub variant: Variant,

    /// Number of transmitted qubits.
    #[serde(default = "default_num_rounds")]
    pub num_rounds: usize,

    /// Seed of the run's random stream.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Fraction of the sifted key revealed for error estimation.
    ///
    /// The default suits runs of a thousand rounds or more. A 100-round BB84
    /// run sifts about 50 bits, of which 0.25 compares only about 12; full
    /// interception is then missed often enough that short runs should raise
    /// this toward 1.0.
    #[serde(default = "default_sample_fraction")]
    pub sample_fraction: f64,

    /// Error rate above which interception is flagged.
    #[serde(default = "default_detection_threshold")]
    pub detection_threshold: f64,

    /// Block size of the repetition code.
    #[serde(default = "default_repetition_factor")]
    pub repetition_factor: usize,

    /// Insert an intercept-resend eavesdropper.
    #[serde(default)]
    pub eve_enabled: bool,

    /// Probability that the eavesdropper intercepts a given qubit.
    #[serde(default = "default_eve_intercept_probability")]
    pub eve_intercept_probability: f64,

    /// Bell state emitted by the E91 source.
    #[serde(default)]
    pub bell_state: BellState,

    /// Channel noise.
    #[serde(default)]
    pub noise: NoiseModel,

    /// Probability that a qubit is lost in transit.
    #[serde(default)]
    pub loss_probability: f64,

    /// How long the receiver waits for each qubit.
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,

    /// Lower bound on the error-estimation sample size.
    #[serde(default)]
    pub min_sample_size: usize,

    /// Run repetition-code correction on the final key.
    #[serde(default = "default_true")]
    pub error_correction: bool,
}

fn default_num_rounds() -> usize {
    16
}

fn default_seed() -> u64 {
    42
}

fn default_sample_fraction() -> f64 {
    0.25
}

fn default_detection_threshold() -> f64 {
    0.11
}

fn default_repetition_factor() -> usize {
    3
}

fn default_eve_intercept_probability() -> f64 {
    1.0
}

fn default_receive_timeout_ms() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            variant: Variant::default(),
            num_rounds: default_num_rounds(),
            seed: default_seed(),
            sample_fraction: default_sample_fraction(),
            detection_threshold: default_detection_threshold(),
            repetition_factor: default_repetition_factor(),
            eve_enabled: false,
            eve_intercept_probability: default_eve_intercept_probability(),
            bell_state: BellState::default(),
            noise: NoiseModel::default(),
            loss_probability: 0.0,
            receive_timeout_ms: default_receive_timeout_ms(),
            min_sample_size: 0,
            error_correction: true,
        }
    }
}

impl RunConfig {
    /// Default configuration for `variant`.
    pub fn for_variant(variant: Variant) -> Self {
        Self {
            variant,
            ..Self::default()
        }
    }

    /// Load configuration from a YAML file.
    ///
    /// Missing fields take their defaults. The result is not validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> QkdResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            QkdError::Configuration(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(contents: &str) -> QkdResult<Self> {
        serde_yaml_ng::from_str(contents)
            .map_err(|e| QkdError::Configuration(format!("Invalid config file: {e}")))
    }

    /// Defaults, then the optional file, then `QKD_*` environment variables.
    ///
    /// Call [`RunConfig::validate`] once all overrides are applied.
    pub fn load(config_file: Option<&Path>) -> QkdResult<Self> {
        let config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.merge_env())
    }

    /// Merge `QKD_*` environment variables into this configuration.
    pub fn merge_env(self) -> Self {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    /// Merge overrides from an arbitrary variable lookup.
    ///
    /// Only variables that are present override the current values.
    /// Unparsable values are logged and ignored.
    pub fn merge_vars<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("QKD_VARIANT") {
            match v.parse() {
                Ok(variant) => self.variant = variant,
                Err(e) => warn!(value = %v, "ignoring QKD_VARIANT: {e}"),
            }
        }
        override_parsed(&lookup, "QKD_NUM_ROUNDS", &mut self.num_rounds);
        override_parsed(&lookup, "QKD_SEED", &mut self.seed);
        override_parsed(&lookup, "QKD_SAMPLE_FRACTION", &mut self.sample_fraction);
        override_parsed(&lookup, "QKD_DETECTION_THRESHOLD", &mut self.detection_threshold);
        override_parsed(&lookup, "QKD_REPETITION_FACTOR", &mut self.repetition_factor);
        override_parsed(&lookup, "QKD_EVE_ENABLED", &mut self.eve_enabled);
        override_parsed(&lookup, "QKD_EVE_PROBABILITY", &mut self.eve_intercept_probability);
        override_parsed(&lookup, "QKD_LOSS_PROBABILITY", &mut self.loss_probability);
        override_parsed(&lookup, "QKD_RECEIVE_TIMEOUT_MS", &mut self.receive_timeout_ms);
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> QkdResult<()> {
        if self.num_rounds == 0 {
            return Err(QkdError::Configuration(
                "num_rounds must be greater than 0".to_string(),
            ));
        }
        if self.repetition_factor == 0 {
            return Err(QkdError::Configuration(
                "repetition_factor must be at least 1".to_string(),
            ));
        }
        if self.receive_timeout_ms == 0 {
            return Err(QkdError::Configuration(
                "receive_timeout_ms must be greater than 0".to_string(),
            ));
        }

        check_probability("sample_fraction", self.sample_fraction)?;
        check_probability("detection_threshold", self.detection_threshold)?;
        check_probability("eve_intercept_probability", self.eve_intercept_probability)?;
        check_probability("loss_probability", self.loss_probability)?;

        self.noise
            .validate()
            .map_err(|e| QkdError::Configuration(format!("Invalid noise model {}: {e}", self.noise)))?;

        Ok(())
    }

    /// Receive bound as a [`Duration`].
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(v) = lookup(key) {
        match v.trim().parse() {
            Ok(val) => *target = val,
            Err(_) => warn!(value = %v, "ignoring unparsable {key}"),
        }
    }
}

pub(crate) fn check_probability(name: &str, value: f64) -> QkdResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(QkdError::Configuration(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}
