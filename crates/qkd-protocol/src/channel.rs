//! Quantum channel between named parties.
//!
//! `send` moves a qubit into the receiver's inbox, so the sender cannot keep
//! using it. Every qubit passes, in order, an optional [`Eavesdropper`], the
//! configured [`NoiseModel`] and the loss draw. Inboxes are FIFO, which keeps
//! per-sender order.

use qkd_sim::{Gate, NoiseModel, QubitState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::config::check_probability;
use crate::eavesdropper::Eavesdropper;
use crate::error::{QkdError, QkdResult};
use crate::party::Party;

/// A qubit handed to its receiver.
#[derive(Debug)]
pub struct Delivery {
    /// Sending party.
    pub from: Party,
    /// The qubit, now owned by the receiver.
    pub qubit: QubitState,
    /// Whether the eavesdropper measured and re-sent it.
    pub intercepted: bool,
    /// Noise event applied in transit.
    pub noise: Option<Gate>,
}

/// Fate of a sent qubit, as seen by the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Enqueued for the receiver.
    Queued,
    /// Lost in transit; the receiver will time out.
    Lost,
}

/// Counters kept by a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    /// Qubits handed to `send`.
    pub sent: usize,
    /// Qubits taken out by `receive`.
    pub delivered: usize,
    /// Qubits lost in transit.
    pub lost: usize,
    /// Qubits measured and re-sent by the eavesdropper.
    pub intercepted: usize,
    /// Qubits hit by a noise event.
    pub noise_events: usize,
}

/// Physical properties of a channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSettings {
    /// Noise applied to each qubit.
    pub noise: NoiseModel,
    /// Probability that a qubit is lost.
    pub loss_probability: f64,
    /// How long `receive` waits.
    pub receive_timeout: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            noise: NoiseModel::None,
            loss_probability: 0.0,
            receive_timeout: Duration::from_millis(50),
        }
    }
}

struct Inbox {
    sender: mpsc::UnboundedSender<Delivery>,
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

impl Inbox {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver }
    }
}

/// Ordered transport of qubits between parties.
pub struct QuantumChannel {
    settings: ChannelSettings,
    inboxes: FxHashMap<Party, Inbox>,
    eavesdropper: Option<Eavesdropper>,
    rng: StdRng,
    stats: ChannelStats,
}

impl QuantumChannel {
    /// Create a channel whose noise and loss draws use `seed`.
    pub fn new(settings: ChannelSettings, seed: u64) -> QkdResult<Self> {
        check_probability("loss_probability", settings.loss_probability)?;
        settings
            .noise
            .validate()
            .map_err(|e| QkdError::Configuration(format!("Invalid noise model: {e}")))?;
        if settings.receive_timeout.is_zero() {
            return Err(QkdError::Configuration(
                "receive_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            settings,
            inboxes: FxHashMap::default(),
            eavesdropper: None,
            rng: StdRng::seed_from_u64(seed),
            stats: ChannelStats::default(),
        })
    }

    /// Insert an eavesdropper on the channel.
    pub fn with_eavesdropper(mut self, eavesdropper: Eavesdropper) -> Self {
        self.eavesdropper = Some(eavesdropper);
        self
    }

    /// The eavesdropper, if one is attached.
    pub fn eavesdropper(&self) -> Option<&Eavesdropper> {
        self.eavesdropper.as_ref()
    }

    /// Channel counters.
    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Channel settings.
    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    /// Qubits waiting in `party`'s inbox.
    pub fn pending(&self, party: Party) -> usize {
        self.inboxes.get(&party).map_or(0, |inbox| inbox.receiver.len())
    }

    /// Transfer `qubit` from `from` to `to`.
    pub fn send(&mut self, from: Party, to: Party, qubit: QubitState) -> QkdResult<SendOutcome> {
        self.stats.sent += 1;

        let mut qubit = qubit;
        let mut intercepted = false;
        if let Some(eve) = self.eavesdropper.as_mut() {
            let (forwarded, record) = eve.intercept(qubit)?;
            qubit = forwarded;
            if record.is_some() {
                intercepted = true;
                self.stats.intercepted += 1;
            }
        }

        let noise = self.settings.noise.sample(&mut self.rng);
        if let Some(gate) = noise {
            qubit.apply(gate)?;
            self.stats.noise_events += 1;
            trace!(%gate, "noise event");
        }

        let loss = self.settings.loss_probability;
        if loss > 0.0 && self.rng.gen_bool(loss) {
            self.stats.lost += 1;
            debug!(%from, %to, "qubit lost in transit");
            return Ok(SendOutcome::Lost);
        }

        let delivery = Delivery {
            from,
            qubit,
            intercepted,
            noise,
        };
        self.inbox(to)
            .sender
            .send(delivery)
            .map_err(|_| QkdError::ChannelClosed(to))?;
        Ok(SendOutcome::Queued)
    }

    /// Wait for the next qubit addressed to `party`.
    ///
    /// Suspends the calling task without blocking others. Fails with
    /// [`QkdError::ChannelTimeout`] when nothing arrives within the bound.
    pub async fn receive(&mut self, party: Party) -> QkdResult<Delivery> {
        let timeout = self.settings.receive_timeout;
        let inbox = self.inbox(party);
        let result = tokio::time::timeout(timeout, inbox.receiver.recv()).await;
        match result {
            Ok(Some(delivery)) => {
                self.stats.delivered += 1;
                Ok(delivery)
            }
            Ok(None) => Err(QkdError::ChannelClosed(party)),
            Err(_) => Err(QkdError::ChannelTimeout {
                party,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    fn inbox(&mut self, party: Party) -> &mut Inbox {
        self.inboxes.entry(party).or_insert_with(Inbox::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qkd_sim::{Basis, Bit};

    fn channel(settings: ChannelSettings) -> QuantumChannel {
        QuantumChannel::new(settings, 7).unwrap()
    }

    #[tokio::test]
    async fn test_fifo_delivery() {
        let mut ch = channel(ChannelSettings::default());
        for bit in [Bit::Zero, Bit::One, Bit::One] {
            let q = QubitState::encode(bit, Basis::Rectilinear);
            assert_eq!(ch.send(Party::Alice, Party::Bob, q).unwrap(), SendOutcome::Queued);
        }
        assert_eq!(ch.pending(Party::Bob), 3);

        let mut rng = StdRng::seed_from_u64(0);
        let mut bits = Vec::new();
        for _ in 0..3 {
            let d = ch.receive(Party::Bob).await.unwrap();
            assert_eq!(d.from, Party::Alice);
            assert!(!d.intercepted);
            bits.push(d.qubit.measure(Basis::Rectilinear, &mut rng).unwrap().bit);
        }
        assert_eq!(bits, vec![Bit::Zero, Bit::One, Bit::One]);
        assert_eq!(ch.stats().delivered, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_inbox_times_out() {
        let mut ch = channel(ChannelSettings::default());
        let err = ch.receive(Party::Bob).await.unwrap_err();
        assert!(matches!(err, QkdError::ChannelTimeout { party: Party::Bob, timeout_ms: 50 }));
        assert!(!err.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_qubit_is_reported() {
        let mut ch = channel(ChannelSettings {
            loss_probability: 1.0,
            ..ChannelSettings::default()
        });
        let outcome = ch
            .send(Party::Alice, Party::Bob, QubitState::prepare())
            .unwrap();
        assert_eq!(outcome, SendOutcome::Lost);
        assert_eq!(ch.stats().lost, 1);
        assert!(ch.receive(Party::Bob).await.is_err());
    }

    #[tokio::test]
    async fn test_noise_is_recorded() {
        let mut ch = channel(ChannelSettings {
            noise: NoiseModel::BitFlip { p: 1.0 },
            ..ChannelSettings::default()
        });
        ch.send(Party::Alice, Party::Bob, QubitState::prepare()).unwrap();
        let d = ch.receive(Party::Bob).await.unwrap();
        assert_eq!(d.noise, Some(Gate::X));
        assert!((d.qubit.probability(Basis::Rectilinear, Bit::One) - 1.0).abs() < 1e-12);
        assert_eq!(ch.stats().noise_events, 1);
    }

    #[tokio::test]
    async fn test_eavesdropper_marks_deliveries() {
        let eve = Eavesdropper::new(1.0, 3).unwrap();
        let mut ch = channel(ChannelSettings::default()).with_eavesdropper(eve);
        ch.send(Party::Alice, Party::Bob, QubitState::prepare()).unwrap();
        let d = ch.receive(Party::Bob).await.unwrap();
        assert!(d.intercepted);
        assert_eq!(ch.stats().intercepted, 1);
        assert_eq!(ch.eavesdropper().map(|e| e.interceptions().len()), Some(1));
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let bad_loss = ChannelSettings {
            loss_probability: -1.0,
            ..ChannelSettings::default()
        };
        assert!(QuantumChannel::new(bad_loss, 0).is_err());
        let zero_timeout = ChannelSettings {
            receive_timeout: Duration::ZERO,
            ..ChannelSettings::default()
        };
        assert!(QuantumChannel::new(zero_timeout, 0).is_err());
    }
}
