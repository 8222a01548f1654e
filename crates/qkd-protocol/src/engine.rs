//! Protocol engine: one state machine per run.
//!
//! ```text
//! Idle → Preparing → Transmitting → Measuring ─┐
//!           ▲                                  │ next round
//!           └──────────────────────────────────┘
//!                                  Measuring → Reconciling → Done
//! ```
//!
//! Rounds run strictly one after another. A qubit that never arrives drops
//! its round and the run continues; any other error aborts the run. Either
//! way the engine returns a [`RunReport`].

use qkd_sim::{Basis, Bit};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::channel::{ChannelSettings, QuantumChannel};
use crate::classical::{
    ClassicalChannel, ClassicalMessage, FrameError, InMemoryClassicalChannel, recv_basis_list,
    recv_sample_bits, recv_sample_indices,
};
use crate::config::RunConfig;
use crate::eavesdropper::Eavesdropper;
use crate::error::{QkdError, QkdResult};
use crate::party::Party;
use crate::protocols::{self, Prepared, Protocol};
use crate::reconcile::{self, CorrectedKey, ErrorEstimate};
use crate::report::{Diagnostics, FatalError, FatalKind, KeyReport, RunOutcome, RunReport};
use crate::round::{DropReason, ProtocolRound};

/// Engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not started.
    Idle,
    /// Sender choosing and preparing a qubit.
    Preparing,
    /// Qubit in the channel.
    Transmitting,
    /// Receiver waiting for and measuring the qubit.
    Measuring,
    /// Public discussion over the side channel.
    Reconciling,
    /// Finished with a key.
    Done,
}

impl Phase {
    /// Whether `next` may follow `self`.
    pub fn can_advance_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Idle | Phase::Measuring, Phase::Preparing)
                | (Phase::Preparing, Phase::Transmitting)
                | (Phase::Transmitting, Phase::Measuring)
                | (Phase::Measuring, Phase::Reconciling)
                | (Phase::Reconciling, Phase::Done)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Preparing => "preparing",
            Phase::Transmitting => "transmitting",
            Phase::Measuring => "measuring",
            Phase::Reconciling => "reconciling",
            Phase::Done => "done",
        };
        write!(f, "{name}")
    }
}

/// Runs one protocol instance end to end.
///
/// The engine owns every resource of the run: the random streams, the
/// quantum channel (with its eavesdropper) and both ends of the side
/// channel. Consuming it with [`ProtocolEngine::run`] releases them all.
pub struct ProtocolEngine {
    config: RunConfig,
    protocol: Box<dyn Protocol>,
    channel: QuantumChannel,
    alice: Box<dyn ClassicalChannel>,
    bob: Box<dyn ClassicalChannel>,
    /// Basis and bit choices, and the reconciliation sample.
    rng: StdRng,
    /// Outcome sampling for the receiver's measurements.
    measure_rng: StdRng,
    phase: Phase,
    rounds: Vec<ProtocolRound>,
    diagnostics: Diagnostics,
}

impl ProtocolEngine {
    /// Validate `config` and set up a run.
    ///
    /// The channel, the eavesdropper and the receiver's measurements get
    /// their own streams, drawn from the run seed. A disturbed qubit makes a
    /// measurement consume randomness it otherwise would not, so none of
    /// this may share the stream the parties choose bits and bases from.
    pub fn new(config: RunConfig) -> QkdResult<Self> {
        config.validate()?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let channel_seed: u64 = rng.r#gen();
        let eve_seed: u64 = rng.r#gen();
        let measure_seed: u64 = rng.r#gen();

        let settings = ChannelSettings {
            noise: config.noise,
            loss_probability: config.loss_probability,
            receive_timeout: config.receive_timeout(),
        };
        let mut channel = QuantumChannel::new(settings, channel_seed)?;
        if config.eve_enabled {
            channel = channel.with_eavesdropper(Eavesdropper::new(
                config.eve_intercept_probability,
                eve_seed,
            )?);
        }

        let (alice, bob) =
            InMemoryClassicalChannel::pair(Party::Alice, Party::Bob, config.receive_timeout());

        Ok(Self {
            protocol: protocols::for_config(&config),
            config,
            channel,
            alice: Box::new(alice),
            bob: Box::new(bob),
            rng,
            measure_rng: StdRng::seed_from_u64(measure_seed),
            phase: Phase::Idle,
            rounds: Vec::new(),
            diagnostics: Diagnostics::default(),
        })
    }

    /// Carry the public discussion over the given channel ends instead of
    /// the in-memory pair.
    #[must_use]
    pub fn with_side_channel(
        mut self,
        alice: Box<dyn ClassicalChannel>,
        bob: Box<dyn ClassicalChannel>,
    ) -> Self {
        self.alice = alice;
        self.bob = bob;
        self
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Configuration of this run.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run to completion.
    pub async fn run(self) -> RunReport {
        self.run_until_cancelled(CancelToken::never()).await
    }

    /// Run until completion or until `cancel` fires.
    ///
    /// Cancellation is checked before every round and raced against every
    /// qubit wait.
    #[instrument(skip_all, fields(variant = %self.config.variant, seed = self.config.seed))]
    pub async fn run_until_cancelled(mut self, mut cancel: CancelToken) -> RunReport {
        let result = self.execute(&mut cancel).await;
        self.finish(result)
    }

    async fn execute(&mut self, cancel: &mut CancelToken) -> QkdResult<KeyReport> {
        for index in 0..self.config.num_rounds {
            if cancel.is_cancelled() {
                return Err(QkdError::Cancelled);
            }
            let round = self.run_round(index, cancel).await?;
            self.rounds.push(round);
        }
        self.advance(Phase::Reconciling);
        self.reconcile().await
    }

    async fn run_round(&mut self, index: usize, cancel: &mut CancelToken) -> QkdResult<ProtocolRound> {
        self.advance(Phase::Preparing);
        let Prepared { bit, basis, qubit } = self.protocol.prepare(&mut self.rng)?;
        let receiver_basis = Basis::random(&mut self.rng);

        self.advance(Phase::Transmitting);
        self.channel.send(Party::Alice, Party::Bob, qubit)?;

        self.advance(Phase::Measuring);
        let received = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(QkdError::Cancelled),
            received = self.channel.receive(Party::Bob) => received,
        };

        match received {
            Ok(delivery) => {
                let outcome = self
                    .protocol
                    .measure(delivery.qubit, receiver_basis, &mut self.measure_rng)?;
                self.diagnostics.completed_rounds += 1;
                if delivery.intercepted {
                    self.diagnostics.intercepted_rounds += 1;
                }
                if delivery.noise.is_some() {
                    self.diagnostics.noise_events += 1;
                }
                let round = ProtocolRound::completed(index, bit, basis, receiver_basis, outcome)
                    .with_transit(delivery.intercepted, delivery.noise);
                debug!(%round, "round completed");
                Ok(round)
            }
            Err(err @ QkdError::ChannelTimeout { .. }) => {
                warn!(index, "round dropped: {err}");
                self.diagnostics.dropped_rounds.push(index);
                Ok(ProtocolRound::dropped(
                    index,
                    bit,
                    basis,
                    receiver_basis,
                    DropReason::Timeout,
                ))
            }
            Err(err) => Err(err),
        }
    }

    /// Public discussion, sampling, estimation and correction.
    async fn reconcile(&mut self) -> QkdResult<KeyReport> {
        let delivered: Vec<&ProtocolRound> = self.rounds.iter().filter(|r| r.is_completed()).collect();

        // Bob announces what he measured in (or where he clicked); Alice
        // answers with her bases where the protocol allows it. Each party
        // then picks the positions to keep from its own view alone.
        let (alice_keeps, bob_keeps) = if self.protocol.announces_bases() {
            let bob_bases: Vec<Basis> = delivered.iter().map(|r| r.receiver_basis()).collect();
            let alice_bases: Vec<Basis> = delivered.iter().map(|r| r.sender_basis()).collect();

            self.bob.send(ClassicalMessage::BasisList(bob_bases.clone())).await?;
            let heard_bob = recv_basis_list(self.alice.as_mut()).await?;
            check_count("BasisList", heard_bob.len(), delivered.len())?;

            self.alice.send(ClassicalMessage::BasisList(alice_bases.clone())).await?;
            let heard_alice = recv_basis_list(self.bob.as_mut()).await?;
            check_count("BasisList", heard_alice.len(), delivered.len())?;

            (
                reconcile::matching_positions(&alice_bases, &heard_bob),
                reconcile::matching_positions(&bob_bases, &heard_alice),
            )
        } else {
            let clicks: Vec<Bit> = delivered
                .iter()
                .map(|r| r.receiver_outcome().unwrap_or(Bit::Zero))
                .collect();
            self.bob.send(ClassicalMessage::SampleBits(clicks.clone())).await?;
            let heard = recv_sample_bits(self.alice.as_mut()).await?;
            check_count("SampleBits", heard.len(), delivered.len())?;
            (
                reconcile::click_positions(&heard),
                reconcile::click_positions(&clicks),
            )
        };
        if alice_keeps != bob_keeps {
            return Err(QkdError::UnexpectedMessage {
                expected: format!("announcements agreeing on {} kept rounds", bob_keeps.len()),
                got: format!("{} rounds kept by Alice", alice_keeps.len()),
            });
        }

        let kept: Vec<ProtocolRound> = alice_keeps.iter().map(|&p| delivered[p].clone()).collect();
        let sifted = reconcile::sift(self.protocol.as_ref(), &kept);
        if sifted.len() != kept.len() {
            return Err(QkdError::UnexpectedMessage {
                expected: format!("announcements matching {} recorded rounds", sifted.len()),
                got: format!("{} kept rounds", kept.len()),
            });
        }

        let draw = reconcile::draw_sample(
            sifted.len(),
            self.config.sample_fraction,
            self.config.min_sample_size,
            &mut self.rng,
        );
        if let Some(shortfall) = draw.shortfall() {
            self.diagnostics.warnings.push(shortfall.to_string());
        }

        let indices = draw
            .positions
            .iter()
            .map(|&p| u32::try_from(p))
            .collect::<Result<Vec<u32>, _>>()
            .map_err(|_| FrameError::TooLong {
                count: sifted.len(),
                max: u32::MAX as usize,
            })?;
        self.alice.send(ClassicalMessage::SampleIndices(indices)).await?;

        let requested = recv_sample_indices(self.bob.as_mut()).await?;
        let bob_bits = requested
            .iter()
            .map(|&i| {
                sifted
                    .receiver
                    .get(i as usize)
                    .copied()
                    .ok_or_else(|| QkdError::UnexpectedMessage {
                        expected: format!("sample index below {}", sifted.len()),
                        got: i.to_string(),
                    })
            })
            .collect::<QkdResult<Vec<Bit>>>()?;
        self.bob.send(ClassicalMessage::SampleBits(bob_bits)).await?;

        let heard_bob = recv_sample_bits(self.alice.as_mut()).await?;
        check_count("SampleBits", heard_bob.len(), draw.positions.len())?;
        let alice_bits: Vec<Bit> = draw.positions.iter().map(|&p| sifted.sender[p]).collect();
        self.alice
            .send(ClassicalMessage::SampleBits(alice_bits.clone()))
            .await?;
        let heard_alice = recv_sample_bits(self.bob.as_mut()).await?;
        check_count("SampleBits", heard_alice.len(), draw.positions.len())?;

        let estimate = ErrorEstimate::from_samples(draw.positions, &alice_bits, &heard_bob);
        let eavesdropping_detected =
            reconcile::detect_eavesdropping(&estimate, self.config.detection_threshold);

        let final_key = sifted.without_positions(&estimate.positions);
        let corrected = if self.config.error_correction {
            Some(CorrectedKey::decode(&final_key, self.config.repetition_factor)?)
        } else {
            None
        };

        Ok(KeyReport {
            sifted,
            estimate,
            final_key,
            corrected,
            detection_threshold: self.config.detection_threshold,
            eavesdropping_detected,
        })
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {} -> {next}",
            self.phase
        );
        debug!(from = %self.phase, to = %next, "phase transition");
        self.phase = next;
    }

    fn finish(mut self, result: QkdResult<KeyReport>) -> RunReport {
        self.diagnostics.channel = self.channel.stats();
        let outcome = match result {
            Ok(key) => {
                self.advance(Phase::Done);
                info!(
                    sifted = key.sifted.len(),
                    sample = key.estimate.sample_size,
                    error_rate = key.estimate.rate,
                    final_key = key.final_key.len(),
                    detected = key.eavesdropping_detected,
                    "run complete"
                );
                RunOutcome::Completed(key)
            }
            Err(err) => {
                let round = match self.phase {
                    Phase::Preparing | Phase::Transmitting | Phase::Measuring => {
                        Some(self.rounds.len())
                    }
                    _ => None,
                };
                error!(phase = %self.phase, ?round, "run aborted: {err}");
                RunOutcome::Failed(FatalError {
                    kind: FatalKind::of(&err),
                    message: err.to_string(),
                    phase: self.phase,
                    round,
                })
            }
        };
        RunReport {
            config: self.config,
            rounds: self.rounds,
            outcome,
            diagnostics: self.diagnostics,
        }
    }
}

fn check_count(kind: &str, got: usize, expected: usize) -> QkdResult<()> {
    if got == expected {
        Ok(())
    } else {
        Err(QkdError::UnexpectedMessage {
            expected: format!("{kind} of {expected} items"),
            got: format!("{kind} of {got} items"),
        })
    }
}
