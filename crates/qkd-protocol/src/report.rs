//! Run reports and results sinks.
//!
//! A run always ends in exactly one [`RunReport`]. It holds either a
//! [`KeyReport`] or a [`FatalError`], never a partial mix of both. Presentation is
//! left to [`ResultsSink`] implementations.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::channel::ChannelStats;
use crate::config::{RunConfig, Variant};
use crate::engine::Phase;
use crate::error::{QkdError, QkdResult};
use crate::reconcile::{CorrectedKey, ErrorEstimate, SiftedKey};
use crate::round::ProtocolRound;

/// Per-run counters and recovered conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Rounds the receiver measured.
    pub completed_rounds: usize,
    /// Indices of rounds dropped after a timeout.
    pub dropped_rounds: Vec<usize>,
    /// Delivered rounds the eavesdropper measured.
    pub intercepted_rounds: usize,
    /// Delivered rounds hit by channel noise.
    pub noise_events: usize,
    /// Recovered conditions, such as a clamped sample.
    pub warnings: Vec<String>,
    /// Quantum channel counters.
    pub channel: ChannelStats,
}

/// Keys and estimates of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyReport {
    /// Sifted key.
    pub sifted: SiftedKey,
    /// Error estimate from the revealed sample.
    pub estimate: ErrorEstimate,
    /// Sifted key minus the revealed sample.
    pub final_key: SiftedKey,
    /// Repetition-decoded final key, when correction is enabled.
    pub corrected: Option<CorrectedKey>,
    /// Threshold the estimate was compared against.
    pub detection_threshold: f64,
    /// Whether the estimate exceeded the threshold.
    pub eavesdropping_detected: bool,
}

/// Category of a fatal run error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum FatalKind {
    /// Simulator invariant violated.
    InvalidState,
    /// Side-channel framing error.
    Frame,
    /// Out-of-order side-channel message.
    UnexpectedMessage,
    /// A channel end was dropped.
    ChannelClosed,
    /// Aborted by the cancel handle.
    Cancelled,
    /// Anything else.
    Other,
}

impl FatalKind {
    /// Classify an error.
    pub fn of(error: &QkdError) -> Self {
        match error {
            QkdError::InvalidState(_) => FatalKind::InvalidState,
            QkdError::Frame(_) => FatalKind::Frame,
            QkdError::UnexpectedMessage { .. } => FatalKind::UnexpectedMessage,
            QkdError::ChannelClosed(_) => FatalKind::ChannelClosed,
            QkdError::Cancelled => FatalKind::Cancelled,
            _ => FatalKind::Other,
        }
    }
}

impl fmt::Display for FatalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FatalKind::InvalidState => "invalid_state",
            FatalKind::Frame => "frame",
            FatalKind::UnexpectedMessage => "unexpected_message",
            FatalKind::ChannelClosed => "channel_closed",
            FatalKind::Cancelled => "cancelled",
            FatalKind::Other => "other",
        };
        write!(f, "{name}")
    }
}

/// Descriptor of an aborted run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalError {
    /// Error category.
    pub kind: FatalKind,
    /// Error message.
    pub message: String,
    /// Phase the run was in.
    pub phase: Phase,
    /// Index of the round in flight, if any.
    pub round: Option<usize>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Reached `Done`.
    Completed(KeyReport),
    /// Aborted.
    Failed(FatalError),
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Configuration the run used.
    pub config: RunConfig,
    /// Round log, in index order.
    pub rounds: Vec<ProtocolRound>,
    /// Final key or fatal error.
    pub outcome: RunOutcome,
    /// Counters and recovered conditions.
    pub diagnostics: Diagnostics,
}

impl RunReport {
    /// Variant of the run.
    pub fn variant(&self) -> Variant {
        self.config.variant
    }

    /// Key report of a completed run.
    pub fn key(&self) -> Option<&KeyReport> {
        match &self.outcome {
            RunOutcome::Completed(key) => Some(key),
            RunOutcome::Failed(_) => None,
        }
    }

    /// Fatal error of an aborted run.
    pub fn failure(&self) -> Option<&FatalError> {
        match &self.outcome {
            RunOutcome::Completed(_) => None,
            RunOutcome::Failed(err) => Some(err),
        }
    }

    /// Whether the run reached `Done`.
    pub fn is_completed(&self) -> bool {
        self.key().is_some()
    }

    /// Condensed figures for tables and aggregates.
    pub fn summary(&self) -> RunSummary {
        let key = self.key();
        RunSummary {
            variant: self.config.variant,
            seed: self.config.seed,
            num_rounds: self.config.num_rounds,
            completed_rounds: self.diagnostics.completed_rounds,
            dropped_rounds: self.diagnostics.dropped_rounds.len(),
            sifted_len: key.map_or(0, |k| k.sifted.len()),
            sample_size: key.map_or(0, |k| k.estimate.sample_size),
            error_rate: key.map_or(0.0, |k| k.estimate.rate),
            final_key_len: key.map_or(0, |k| k.final_key.len()),
            corrected_len: key.and_then(|k| k.corrected.as_ref()).map(CorrectedKey::len),
            residual_mismatches: key
                .and_then(|k| k.corrected.as_ref())
                .map(|c| c.residual_mismatches),
            eavesdropping_detected: key.is_some_and(|k| k.eavesdropping_detected),
            failure: self.failure().map(|f| f.kind),
        }
    }
}

/// Headline numbers of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub variant: Variant,
    pub seed: u64,
    pub num_rounds: usize,
    pub completed_rounds: usize,
    pub dropped_rounds: usize,
    pub sifted_len: usize,
    pub sample_size: usize,
    pub error_rate: f64,
    pub final_key_len: usize,
    pub corrected_len: Option<usize>,
    pub residual_mismatches: Option<usize>,
    pub eavesdropping_detected: bool,
    pub failure: Option<FatalKind>,
}

impl RunSummary {
    /// Sifted bits per transmitted qubit.
    pub fn sifted_fraction(&self) -> f64 {
        ratio(self.sifted_len, self.num_rounds)
    }

    /// Final key bits per transmitted qubit.
    pub fn final_key_fraction(&self) -> f64 {
        ratio(self.final_key_len, self.num_rounds)
    }
}

pub(crate) fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Consumer of run reports.
pub trait ResultsSink {
    /// Record one report.
    fn record(&mut self, report: &RunReport) -> QkdResult<()>;

    /// Flush once no more reports will follow.
    fn finish(&mut self) -> QkdResult<()> {
        Ok(())
    }
}

/// Sink that keeps every report in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Vec<RunReport>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded reports, in order.
    pub fn reports(&self) -> &[RunReport] {
        &self.reports
    }

    /// Take the recorded reports.
    pub fn into_reports(self) -> Vec<RunReport> {
        self.reports
    }
}

impl ResultsSink for MemorySink {
    fn record(&mut self, report: &RunReport) -> QkdResult<()> {
        self.reports.push(report.clone());
        Ok(())
    }
}
