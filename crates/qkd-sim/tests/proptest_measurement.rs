//! Property-based tests for measurement semantics.

use qkd_sim::{Basis, BellPair, BellState, Bit, Gate, QubitState};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn arb_bit() -> impl Strategy<Value = Bit> {
    any::<bool>().prop_map(Bit::from)
}

fn arb_basis() -> impl Strategy<Value = Basis> {
    prop_oneof![Just(Basis::Rectilinear), Just(Basis::Diagonal)]
}

fn arb_gate() -> impl Strategy<Value = Gate> {
    prop_oneof![
        Just(Gate::Identity),
        Just(Gate::X),
        Just(Gate::Y),
        Just(Gate::Z),
        Just(Gate::H),
        Just(Gate::S),
        Just(Gate::T),
        (-6.3_f64..6.3).prop_map(Gate::Rx),
        (-6.3_f64..6.3).prop_map(Gate::Ry),
        (-6.3_f64..6.3).prop_map(Gate::Rz),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Preparing and measuring in the same basis returns the encoded bit.
    #[test]
    fn matched_basis_is_deterministic(seed in any::<u64>(), bit in arb_bit(), basis in arb_basis()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let m = QubitState::encode(bit, basis).measure(basis, &mut rng).unwrap();
        prop_assert_eq!(m.bit, bit);
    }

    /// A collapsed state measured again in the same basis keeps its bit.
    #[test]
    fn collapse_is_idempotent(seed in any::<u64>(), bit in arb_bit(), prep in arb_basis(), basis in arb_basis()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let first = QubitState::encode(bit, prep).measure(basis, &mut rng).unwrap();
        let mut collapsed = first.collapsed;
        for _ in 0..8 {
            let again = collapsed.measure(basis, &mut rng);
            prop_assert_eq!(again.bit, first.bit);
            collapsed = again.collapsed;
        }
    }

    /// Gate sequences preserve normalization, and adjoints undo them.
    #[test]
    fn gates_preserve_norm(gates in prop::collection::vec(arb_gate(), 0..20)) {
        let mut q = QubitState::prepare();
        for gate in &gates {
            q.apply(*gate).unwrap();
        }
        prop_assert!((q.norm_sqr() - 1.0).abs() < 1e-9);
        for gate in gates.iter().rev() {
            q.apply(gate.adjoint()).unwrap();
        }
        prop_assert!((q.probability(Basis::Rectilinear, Bit::Zero) - 1.0).abs() < 1e-9);
    }

    /// Bell partners agree up to the state's parity in any shared basis.
    #[test]
    fn bell_partners_follow_parity(seed in any::<u64>(), basis in arb_basis(), psi in any::<bool>()) {
        let kind = if psi { BellState::PsiMinus } else { BellState::PhiPlus };
        let mut rng = StdRng::seed_from_u64(seed);
        let (a, partner) = BellPair::prepare(kind).measure_retained(basis, &mut rng).unwrap();
        let b = partner.measure(basis, &mut rng).unwrap().bit;
        prop_assert_eq!(a.xor(b), kind.expected_parity(basis));
    }
}
