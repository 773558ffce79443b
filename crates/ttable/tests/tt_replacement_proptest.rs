//! Property tests for the replacement policy of a full cluster

use proptest::prelude::*;
use ttable::tt::{CLUSTER_SIZE, TTEntry};
use ttable::{Bound, Move, TranspositionTable, TtOptions, Value};

fn key_for_tag(tag: u16) -> u64 {
    (tag as u64) << 48
}

proptest! {
    /// 追い出されるのは depth8 - relative_age が最小のエントリ（同値なら先頭）
    #[test]
    fn prop_victim_has_lowest_replace_value(
        depths in prop::array::uniform3(0i32..60),
        gaps in prop::array::uniform3(0usize..40),
        final_gap in 0usize..40,
    ) {
        let tt = TranspositionTable::with_cluster_count(1, TtOptions::default());
        let mut expected = Vec::with_capacity(CLUSTER_SIZE);

        for (slot, (&depth, &gap)) in depths.iter().zip(gaps.iter()).enumerate() {
            for _ in 0..gap {
                tt.new_search();
            }
            let key = key_for_tag(slot as u16 + 1);
            let probe = tt.probe(key);
            prop_assert!(!probe.found);
            probe.write(key, Value::ZERO, false, Bound::Lower, depth, Move::NONE, Value::ZERO);

            // 同じ内容のエントリを手元で再現する
            let mut shadow = TTEntry::new();
            shadow.save(
                slot as u16 + 1,
                Value::ZERO,
                false,
                Bound::Lower,
                depth,
                Move::NONE,
                Value::ZERO,
                tt.generation(),
            );
            expected.push(shadow);
        }

        for _ in 0..final_gap {
            tt.new_search();
        }
        let gen8 = tt.generation();

        let mut victim = 0;
        for slot in 1..CLUSTER_SIZE {
            if expected[slot].replace_value(gen8) < expected[victim].replace_value(gen8) {
                victim = slot;
            }
        }

        let probe = tt.probe(key_for_tag(0x7fff));
        prop_assert!(!probe.found);
        prop_assert_eq!(probe.entry().key16(), victim as u16 + 1);
    }
}
