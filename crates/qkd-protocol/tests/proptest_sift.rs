//! Property-based tests for sifting, sampling and decoding.

use proptest::prelude::*;
use qkd_protocol::classical::FrameDecoder;
use qkd_protocol::reconcile::{correct_errors, draw_sample, sift};
use qkd_protocol::{Bb84, ClassicalMessage, DropReason, ProtocolRound};
use qkd_sim::{Basis, Bit};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn arb_bit() -> impl Strategy<Value = Bit> {
    any::<bool>().prop_map(Bit::from)
}

fn arb_basis() -> impl Strategy<Value = Basis> {
    prop_oneof![Just(Basis::Rectilinear), Just(Basis::Diagonal)]
}

/// (sender bit, sender basis, receiver basis, outcome, delivered)
fn arb_round() -> impl Strategy<Value = (Bit, Basis, Basis, Bit, bool)> {
    (arb_bit(), arb_basis(), arb_basis(), arb_bit(), prop::bool::weighted(0.8))
}

fn build_rounds(specs: &[(Bit, Basis, Basis, Bit, bool)]) -> Vec<ProtocolRound> {
    specs
        .iter()
        .enumerate()
        .map(|(i, &(bit, sb, rb, outcome, delivered))| {
            if delivered {
                ProtocolRound::completed(i, bit, sb, rb, outcome)
            } else {
                ProtocolRound::dropped(i, bit, sb, rb, DropReason::Timeout)
            }
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// BB84 keeps exactly the delivered rounds with matching bases, in order.
    #[test]
    fn bb84_sift_keeps_matching_delivered_rounds(specs in prop::collection::vec(arb_round(), 0..200)) {
        let rounds = build_rounds(&specs);
        let key = sift(&Bb84, &rounds);

        let expected: Vec<usize> = specs
            .iter()
            .enumerate()
            .filter(|(_, s)| s.4 && s.1 == s.2)
            .map(|(i, _)| i)
            .collect();
        prop_assert!(key.len() <= rounds.len());
        prop_assert_eq!(&key.indices, &expected);
        for (k, &i) in key.indices.iter().enumerate() {
            prop_assert_eq!(key.sender[k], specs[i].0);
            prop_assert_eq!(key.receiver[k], specs[i].3);
        }
    }

    /// Samples are sorted, distinct and in range, and removing them leaves
    /// the rest of the key.
    #[test]
    fn sample_positions_are_valid(
        seed in any::<u64>(),
        available in 0usize..500,
        fraction in 0.0f64..=1.0,
        min_size in 0usize..50,
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let draw = draw_sample(available, fraction, min_size, &mut rng);

        let expected = ((fraction * available as f64).floor() as usize).max(min_size).min(available);
        prop_assert_eq!(draw.positions.len(), expected);
        prop_assert!(draw.positions.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(draw.positions.iter().all(|&p| p < available));
        prop_assert_eq!(draw.is_clamped(), draw.requested > available);
    }

    /// Repetition decoding yields ceil(len / factor) bits and undoes
    /// repetition encoding.
    #[test]
    fn repetition_decode_length_and_inverse(
        bits in prop::collection::vec(arb_bit(), 0..100),
        factor in 1usize..8,
    ) {
        let encoded: Vec<Bit> = bits
            .iter()
            .flat_map(|&b| std::iter::repeat_n(b, factor))
            .collect();
        prop_assert_eq!(correct_errors(&encoded, factor).unwrap(), bits.clone());

        let decoded = correct_errors(&bits, factor).unwrap();
        prop_assert_eq!(decoded.len(), bits.len().div_ceil(factor));
    }

    /// A frame stream decodes the same however it is split.
    #[test]
    fn frames_survive_arbitrary_splits(
        bases in prop::collection::vec(arb_basis(), 0..300),
        bits in prop::collection::vec(arb_bit(), 0..300),
        chunk in 1usize..64,
    ) {
        let messages = vec![
            ClassicalMessage::BasisList(bases),
            ClassicalMessage::SampleIndices((0..bits.len() as u32).collect()),
            ClassicalMessage::SampleBits(bits),
        ];
        let mut stream = Vec::new();
        for m in &messages {
            stream.extend(m.encode().unwrap());
        }

        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        for piece in stream.chunks(chunk) {
            decoder.push(piece);
            while let Some(m) = decoder.next_message().unwrap() {
                out.push(m);
            }
        }
        prop_assert_eq!(out, messages);
        prop_assert_eq!(decoder.buffered(), 0);
    }
}
