use proptest::prelude::*;

use meridian_types::{SubBlockId, Timestamp, TxStatus};
use std::time::Duration;

fn any_status() -> impl Strategy<Value = TxStatus> {
    prop_oneof![
        Just(TxStatus::Pending),
        Just(TxStatus::Pooled),
        Just(TxStatus::Batched),
        Just(TxStatus::Committed),
        Just(TxStatus::Rejected),
    ]
}

proptest! {
    /// SubBlockId bincode serialization roundtrip.
    #[test]
    fn sub_block_id_bincode_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let id = SubBlockId::new(bytes);
        let encoded = bincode::serialize(&id).unwrap();
        let decoded: SubBlockId = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, id);
    }

    /// SubBlockId::is_zero is true only for all-zero bytes.
    #[test]
    fn sub_block_id_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        prop_assert_eq!(SubBlockId::new(bytes).is_zero(), bytes == [0u8; 32]);
    }

    /// Timestamp ordering: from_millis(a) <= from_millis(b) iff a <= b.
    #[test]
    fn timestamp_ordering(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
        let ta = Timestamp::from_millis(a);
        let tb = Timestamp::from_millis(b);
        prop_assert_eq!(ta <= tb, a <= b);
    }

    /// elapsed_since is the saturating difference.
    #[test]
    fn timestamp_elapsed_since(base in 0u64..1_000_000, offset in 0u64..1_000_000) {
        let t = Timestamp::from_millis(base);
        let now = Timestamp::from_millis(base + offset);
        prop_assert_eq!(t.elapsed_since(now), Duration::from_millis(offset));
        prop_assert_eq!(now.elapsed_since(t), Duration::ZERO);
    }

    /// No transition leaves a terminal status, and nothing re-enters Pending.
    #[test]
    fn lifecycle_is_acyclic_through_terminal(from in any_status(), to in any_status()) {
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(to));
        }
        prop_assert!(!from.can_transition_to(TxStatus::Pending));
    }
}
