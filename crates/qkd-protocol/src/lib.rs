//! `qkd-protocol` - BB84, B92 and E91 key distribution runs.
//!
//! A [`ProtocolEngine`] drives a single run. Each round, the sender
//! prepares a qubit, which crosses a [`QuantumChannel`] where an
//! [`Eavesdropper`], noise and loss may act before the receiver measures it.
//! Once every round has been played, both parties reconcile over an authenticated
//! [`ClassicalChannel`]: they sift, reveal a random sample to estimate the
//! error rate, and optionally repetition-decode the rest.
//!
//! # Example
//!
//! ```rust
//! use qkd_protocol::{ProtocolEngine, RunConfig, Variant};
//!
//! let rt = tokio::runtime::Builder::new_current_thread()
//!     .enable_time()
//!     .build()
//!     .unwrap();
//! let config = RunConfig {
//!     num_rounds: 64,
//!     ..RunConfig::for_variant(Variant::Bb84)
//! };
//! let report = rt.block_on(ProtocolEngine::new(config).unwrap().run());
//! let key = report.key().unwrap();
//! assert_eq!(key.final_key.mismatches(), 0);
//! ```

pub mod batch;
pub mod cancel;
pub mod channel;
pub mod classical;
pub mod config;
pub mod eavesdropper;
pub mod engine;
pub mod error;
pub mod party;
pub mod protocols;
pub mod reconcile;
pub mod report;
pub mod round;

pub use batch::{BatchReport, BatchRun, CountAggregate, run_batch, run_batch_with};
pub use cancel::{CancelHandle, CancelToken, cancel_pair};
pub use channel::{ChannelSettings, ChannelStats, Delivery, QuantumChannel, SendOutcome};
pub use classical::{ClassicalChannel, ClassicalMessage, FrameDecoder, FrameError, InMemoryClassicalChannel};
pub use config::{RunConfig, Variant};
pub use eavesdropper::{Eavesdropper, Interception};
pub use engine::{Phase, ProtocolEngine};
pub use error::{QkdError, QkdResult};
pub use party::Party;
pub use protocols::{B92, Bb84, E91, Protocol};
pub use reconcile::{CorrectedKey, ErrorEstimate, SiftedKey};
pub use report::{
    Diagnostics, FatalError, FatalKind, KeyReport, MemorySink, ResultsSink, RunOutcome, RunReport,
    RunSummary,
};
pub use round::{DropReason, ProtocolRound, RoundStatus};
