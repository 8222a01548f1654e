//! Classical side channel between the two legitimate parties.
//!
//! # Wire format
//!
//! Every message is one self-delimiting frame:
//!
//! ```text
//! +-----+-------------+------------------------------+
//! | tag | count (u32) | payload                      |
//! | u8  | big-endian  | count items                  |
//! +-----+-------------+------------------------------+
//! ```
//!
//! | Tag    | Message         | Item encoding                  |
//! |--------|-----------------|--------------------------------|
//! | `0x01` | `BasisList`     | 1 byte: 0 rectilinear, 1 diagonal |
//! | `0x02` | `SampleIndices` | 4 bytes, big-endian `u32`      |
//! | `0x03` | `SampleBits`    | 1 byte: 0 or 1                 |
//!
//! Frames may arrive split or coalesced; [`FrameDecoder`] buffers bytes and
//! yields complete messages only.

use async_trait::async_trait;
use qkd_sim::{Basis, Bit};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::{QkdError, QkdResult};
use crate::party::Party;

const TAG_BASIS_LIST: u8 = 0x01;
const TAG_SAMPLE_INDICES: u8 = 0x02;
const TAG_SAMPLE_BITS: u8 = 0x03;

const HEADER_LEN: usize = 5;

/// Upper bound on items per frame.
pub const MAX_FRAME_ITEMS: usize = 1 << 24;

/// Errors decoding or encoding a side-channel frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FrameError {
    /// The tag byte names no known message.
    #[error("Unknown frame tag 0x{0:02x}")]
    UnknownTag(u8),

    /// A basis byte other than 0 or 1.
    #[error("Invalid basis code {0}")]
    InvalidBasis(u8),

    /// A bit byte other than 0 or 1.
    #[error("Invalid bit value {0}")]
    InvalidBit(u8),

    /// The item count exceeds [`MAX_FRAME_ITEMS`] or `u32`.
    #[error("Frame of {count} items exceeds the limit of {max}")]
    TooLong { count: usize, max: usize },
}

/// Result type for framing.
pub type FrameResult<T> = Result<T, FrameError>;

/// A message on the classical side channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassicalMessage {
    /// Bases chosen by the sender of the message, one per delivered round.
    BasisList(Vec<Basis>),
    /// Positions in the sifted key.
    SampleIndices(Vec<u32>),
    /// Bit values, one per listed position.
    SampleBits(Vec<Bit>),
}

/// Result of decoding from the front of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A whole frame was read.
    Complete {
        /// The decoded message.
        message: ClassicalMessage,
        /// Bytes consumed from the buffer.
        consumed: usize,
    },
    /// The buffer holds only part of a frame.
    Incomplete {
        /// Minimum number of further bytes needed.
        needed: usize,
    },
}

impl ClassicalMessage {
    /// Message name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ClassicalMessage::BasisList(_) => "BasisList",
            ClassicalMessage::SampleIndices(_) => "SampleIndices",
            ClassicalMessage::SampleBits(_) => "SampleBits",
        }
    }

    /// Number of items carried.
    pub fn len(&self) -> usize {
        match self {
            ClassicalMessage::BasisList(v) => v.len(),
            ClassicalMessage::SampleIndices(v) => v.len(),
            ClassicalMessage::SampleBits(v) => v.len(),
        }
    }

    /// Whether the message carries no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encode as one frame.
    pub fn encode(&self) -> FrameResult<Vec<u8>> {
        let count = self.len();
        if count > MAX_FRAME_ITEMS {
            return Err(FrameError::TooLong {
                count,
                max: MAX_FRAME_ITEMS,
            });
        }
        let count_u32 = u32::try_from(count).map_err(|_| FrameError::TooLong {
            count,
            max: MAX_FRAME_ITEMS,
        })?;

        let item_len = match self {
            ClassicalMessage::SampleIndices(_) => 4,
            _ => 1,
        };
        let mut out = Vec::with_capacity(HEADER_LEN + count * item_len);
        out.push(self.tag());
        out.extend_from_slice(&count_u32.to_be_bytes());
        match self {
            ClassicalMessage::BasisList(bases) => out.extend(bases.iter().map(|b| b.code())),
            ClassicalMessage::SampleIndices(indices) => {
                for i in indices {
                    out.extend_from_slice(&i.to_be_bytes());
                }
            }
            ClassicalMessage::SampleBits(bits) => out.extend(bits.iter().map(|b| b.as_u8())),
        }
        Ok(out)
    }

    /// Decode one frame from the front of `buf`.
    pub fn decode(buf: &[u8]) -> FrameResult<Decoded> {
        if buf.len() < HEADER_LEN {
            // The tag alone is enough to reject garbage early.
            if let Some(&tag) = buf.first() {
                item_len(tag)?;
            }
            return Ok(Decoded::Incomplete {
                needed: HEADER_LEN - buf.len(),
            });
        }

        let tag = buf[0];
        let width = item_len(tag)?;
        let count = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        if count > MAX_FRAME_ITEMS {
            return Err(FrameError::TooLong {
                count,
                max: MAX_FRAME_ITEMS,
            });
        }
        let total = HEADER_LEN + count * width;
        if buf.len() < total {
            return Ok(Decoded::Incomplete {
                needed: total - buf.len(),
            });
        }

        let payload = &buf[HEADER_LEN..total];
        let message = match tag {
            TAG_BASIS_LIST => ClassicalMessage::BasisList(
                payload
                    .iter()
                    .map(|&b| Basis::from_code(b).ok_or(FrameError::InvalidBasis(b)))
                    .collect::<FrameResult<_>>()?,
            ),
            TAG_SAMPLE_INDICES => ClassicalMessage::SampleIndices(
                payload
                    .chunks_exact(4)
                    .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            _ => ClassicalMessage::SampleBits(
                payload
                    .iter()
                    .map(|&b| Bit::try_from(b).map_err(|_| FrameError::InvalidBit(b)))
                    .collect::<FrameResult<_>>()?,
            ),
        };
        Ok(Decoded::Complete {
            message,
            consumed: total,
        })
    }

    fn tag(&self) -> u8 {
        match self {
            ClassicalMessage::BasisList(_) => TAG_BASIS_LIST,
            ClassicalMessage::SampleIndices(_) => TAG_SAMPLE_INDICES,
            ClassicalMessage::SampleBits(_) => TAG_SAMPLE_BITS,
        }
    }
}

impl fmt::Display for ClassicalMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind(), self.len())
    }
}

fn item_len(tag: u8) -> FrameResult<usize> {
    match tag {
        TAG_BASIS_LIST | TAG_SAMPLE_BITS => Ok(1),
        TAG_SAMPLE_INDICES => Ok(4),
        other => Err(FrameError::UnknownTag(other)),
    }
}

/// Streaming frame decoder.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Pop the next complete message, if one is buffered.
    pub fn next_message(&mut self) -> FrameResult<Option<ClassicalMessage>> {
        match ClassicalMessage::decode(&self.buffer)? {
            Decoded::Complete { message, consumed } => {
                self.buffer.drain(..consumed);
                Ok(Some(message))
            }
            Decoded::Incomplete { .. } => Ok(None),
        }
    }
}

/// Duplex message channel between the two legitimate parties.
///
/// The channel is assumed authenticated; it carries public information only.
#[async_trait]
pub trait ClassicalChannel: Send {
    /// The party owning this end.
    fn party(&self) -> Party;

    /// Send a message to the peer.
    async fn send(&mut self, message: ClassicalMessage) -> QkdResult<()>;

    /// Receive the next message from the peer.
    async fn recv(&mut self) -> QkdResult<ClassicalMessage>;
}

/// Receive a `BasisList`.
pub async fn recv_basis_list<C>(channel: &mut C) -> QkdResult<Vec<Basis>>
where
    C: ClassicalChannel + ?Sized,
{
    match channel.recv().await? {
        ClassicalMessage::BasisList(bases) => Ok(bases),
        other => Err(unexpected("BasisList", &other)),
    }
}

/// Receive a `SampleIndices`.
pub async fn recv_sample_indices<C>(channel: &mut C) -> QkdResult<Vec<u32>>
where
    C: ClassicalChannel + ?Sized,
{
    match channel.recv().await? {
        ClassicalMessage::SampleIndices(indices) => Ok(indices),
        other => Err(unexpected("SampleIndices", &other)),
    }
}

/// Receive a `SampleBits`.
pub async fn recv_sample_bits<C>(channel: &mut C) -> QkdResult<Vec<Bit>>
where
    C: ClassicalChannel + ?Sized,
{
    match channel.recv().await? {
        ClassicalMessage::SampleBits(bits) => Ok(bits),
        other => Err(unexpected("SampleBits", &other)),
    }
}

fn unexpected(expected: &str, got: &ClassicalMessage) -> QkdError {
    QkdError::UnexpectedMessage {
        expected: expected.to_string(),
        got: got.kind().to_string(),
    }
}

/// In-process side channel carrying encoded frames over tokio channels.
pub struct InMemoryClassicalChannel {
    party: Party,
    peer: Party,
    sender: mpsc::UnboundedSender<Vec<u8>>,
    receiver: mpsc::UnboundedReceiver<Vec<u8>>,
    decoder: FrameDecoder,
    timeout: Duration,
}

impl InMemoryClassicalChannel {
    /// Create both ends of a connected channel.
    pub fn pair(a: Party, b: Party, timeout: Duration) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let end = |party, peer, sender, receiver| Self {
            party,
            peer,
            sender,
            receiver,
            decoder: FrameDecoder::new(),
            timeout,
        };
        (end(a, b, a_tx, a_rx), end(b, a, b_tx, b_rx))
    }

    /// Send raw bytes, bypassing encoding.
    pub fn send_raw(&mut self, bytes: Vec<u8>) -> QkdResult<()> {
        self.sender
            .send(bytes)
            .map_err(|_| QkdError::ChannelClosed(self.peer))
    }
}

#[async_trait]
impl ClassicalChannel for InMemoryClassicalChannel {
    fn party(&self) -> Party {
        self.party
    }

    async fn send(&mut self, message: ClassicalMessage) -> QkdResult<()> {
        let frame = message.encode()?;
        self.send_raw(frame)
    }

    async fn recv(&mut self) -> QkdResult<ClassicalMessage> {
        loop {
            if let Some(message) = self.decoder.next_message()? {
                return Ok(message);
            }
            let chunk = tokio::time::timeout(self.timeout, self.receiver.recv()).await;
            match chunk {
                Ok(Some(bytes)) => self.decoder.push(&bytes),
                Ok(None) => return Err(QkdError::ChannelClosed(self.peer)),
                Err(_) => {
                    return Err(QkdError::ChannelTimeout {
                        party: self.party,
                        timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = ClassicalMessage::SampleIndices(vec![1, 258]).encode().unwrap();
        assert_eq!(frame, vec![0x02, 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 1, 2]);
        let frame = ClassicalMessage::BasisList(vec![Basis::Diagonal, Basis::Rectilinear])
            .encode()
            .unwrap();
        assert_eq!(frame, vec![0x01, 0, 0, 0, 2, 1, 0]);
    }

    #[test]
    fn test_decode_incomplete_then_complete() {
        let frame = ClassicalMessage::SampleBits(vec![Bit::One, Bit::Zero, Bit::One])
            .encode()
            .unwrap();
        assert_eq!(
            ClassicalMessage::decode(&frame[..3]).unwrap(),
            Decoded::Incomplete { needed: 2 }
        );
        assert_eq!(
            ClassicalMessage::decode(&frame[..6]).unwrap(),
            Decoded::Incomplete { needed: 2 }
        );
        match ClassicalMessage::decode(&frame).unwrap() {
            Decoded::Complete { message, consumed } => {
                assert_eq!(consumed, frame.len());
                assert_eq!(message, ClassicalMessage::SampleBits(vec![Bit::One, Bit::Zero, Bit::One]));
            }
            other => panic!("expected a complete frame, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        assert_eq!(ClassicalMessage::decode(&[0x09]), Err(FrameError::UnknownTag(0x09)));
        assert_eq!(
            ClassicalMessage::decode(&[0x01, 0, 0, 0, 1, 7]),
            Err(FrameError::InvalidBasis(7))
        );
        assert_eq!(
            ClassicalMessage::decode(&[0x03, 0, 0, 0, 1, 2]),
            Err(FrameError::InvalidBit(2))
        );
        assert!(matches!(
            ClassicalMessage::decode(&[0x02, 0xff, 0xff, 0xff, 0xff]),
            Err(FrameError::TooLong { .. })
        ));
    }

    #[test]
    fn test_decoder_handles_split_and_coalesced_frames() {
        let a = ClassicalMessage::BasisList(vec![Basis::Rectilinear; 3]);
        let b = ClassicalMessage::SampleIndices(vec![9, 10]);
        let mut bytes = a.encode().unwrap();
        bytes.extend(b.encode().unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes[..4]);
        assert_eq!(decoder.next_message().unwrap(), None);
        decoder.push(&bytes[4..]);
        assert_eq!(decoder.next_message().unwrap(), Some(a));
        assert_eq!(decoder.next_message().unwrap(), Some(b));
        assert_eq!(decoder.next_message().unwrap(), None);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_long_payload_is_not_truncated() {
        let bits: Vec<Bit> = (0..5000).map(|i| Bit::from(i % 3 == 0)).collect();
        let frame = ClassicalMessage::SampleBits(bits.clone()).encode().unwrap();
        let mut decoder = FrameDecoder::new();
        for chunk in frame.chunks(1024) {
            decoder.push(chunk);
        }
        assert_eq!(decoder.next_message().unwrap(), Some(ClassicalMessage::SampleBits(bits)));
    }

    #[tokio::test]
    async fn test_in_memory_pair_exchanges_messages() {
        let (mut alice, mut bob) =
            InMemoryClassicalChannel::pair(Party::Alice, Party::Bob, Duration::from_secs(1));
        alice
            .send(ClassicalMessage::SampleIndices(vec![3, 1]))
            .await
            .unwrap();
        let received = recv_sample_indices(&mut bob).await.unwrap();
        assert_eq!(received, vec![3, 1]);
        assert_eq!(bob.party(), Party::Bob);
    }

    #[tokio::test]
    async fn test_typed_receive_rejects_wrong_kind() {
        let (mut alice, mut bob) =
            InMemoryClassicalChannel::pair(Party::Alice, Party::Bob, Duration::from_secs(1));
        alice.send(ClassicalMessage::SampleBits(vec![])).await.unwrap();
        let err = recv_basis_list(&mut bob).await.unwrap_err();
        assert!(matches!(err, QkdError::UnexpectedMessage { .. }));
    }

    #[tokio::test]
    async fn test_recv_reports_closed_peer() {
        let (alice, mut bob) =
            InMemoryClassicalChannel::pair(Party::Alice, Party::Bob, Duration::from_secs(1));
        drop(alice);
        assert!(matches!(bob.recv().await, Err(QkdError::ChannelClosed(Party::Alice))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_times_out() {
        let (_alice, mut bob) =
            InMemoryClassicalChannel::pair(Party::Alice, Party::Bob, Duration::from_millis(20));
        assert!(matches!(
            bob.recv().await,
            Err(QkdError::ChannelTimeout { party: Party::Bob, timeout_ms: 20 })
        ));
    }

    #[tokio::test]
    async fn test_garbage_bytes_surface_as_frame_error() {
        let (mut alice, mut bob) =
            InMemoryClassicalChannel::pair(Party::Alice, Party::Bob, Duration::from_secs(1));
        alice.send_raw(vec![0x7f, 0, 0, 0, 0]).unwrap();
        assert!(matches!(bob.recv().await, Err(QkdError::Frame(FrameError::UnknownTag(0x7f)))));
    }
}
