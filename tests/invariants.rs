//! Property tests for the engine's core invariants: gap-free interval
//! coverage, sticky value types, and coalescing idempotence.

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use statehist::{Quark, StateHistorySystem, StateValue, Timestamp};

fn ts(t: i64) -> Timestamp {
    Timestamp(t)
}

/// Walk the finalized history of `quark` from start to end, asserting the
/// intervals form a seamless partition (each one starts exactly where the
/// previous one ended).
fn assert_partition(ss: &StateHistorySystem, quark: Quark) -> Result<(), TestCaseError> {
    let end = ss.current_end_time();
    let mut cursor = ss.start_time();
    loop {
        let interval = ss
            .query_single_state(cursor, quark)
            .expect("coverage hole");
        prop_assert_eq!(interval.start, cursor, "gap or overlap at {}", cursor);
        prop_assert!(interval.end >= interval.start);
        if interval.end >= end {
            prop_assert_eq!(interval.end, end);
            return Ok(());
        }
        cursor = ts(interval.end.0 + 1);
    }
}

proptest! {
    /// For any monotone change sequence, the closed history partitions
    /// [start, end] per quark with no gaps and no overlaps.
    #[test]
    fn coverage_partition_single_quark(
        changes in prop::collection::vec((1i64..50, 0i32..4), 1..40),
        tail in 0i64..20,
    ) {
        let ss = StateHistorySystem::in_memory(ts(0));
        let q = ss.get_quark_absolute_and_add(&["attr"]).unwrap();

        let mut t = 0;
        for (dt, v) in changes {
            t += dt;
            ss.modify_attribute(ts(t), StateValue::Int(v), q).unwrap();
        }
        ss.close_history(ts(t + tail)).unwrap();

        assert_partition(&ss, q)?;
    }

    /// Same partition property with several quarks updated in interleaved
    /// order, checked through full-state queries as well.
    #[test]
    fn coverage_partition_interleaved_quarks(
        changes in prop::collection::vec((1i64..30, 0usize..3, 0i32..4), 1..60),
    ) {
        let ss = StateHistorySystem::in_memory(ts(0));
        let quarks: Vec<Quark> = ["a", "b", "c"]
            .into_iter()
            .map(|name| ss.get_quark_absolute_and_add(&[name]).unwrap())
            .collect();

        let mut t = 0;
        for (dt, which, v) in changes {
            t += dt;
            ss.modify_attribute(ts(t), StateValue::Int(v), quarks[which]).unwrap();
        }
        ss.close_history(ts(t)).unwrap();

        for &q in &quarks {
            assert_partition(&ss, q)?;
        }

        // Full-state queries agree with the per-quark partitions.
        for probe in [0, t / 3, t / 2, t] {
            let full = ss.query_full_state(ts(probe)).unwrap();
            prop_assert_eq!(full.len(), quarks.len());
            for interval in &full {
                prop_assert!(interval.contains(ts(probe)));
                let single = ss.query_single_state(ts(probe), interval.quark).unwrap();
                prop_assert_eq!(&single, interval);
            }
        }
    }

    /// Once a non-null value declares an attribute's kind, every non-null
    /// value of another kind is rejected and leaves the state unchanged.
    #[test]
    fn declared_kind_is_sticky(
        updates in prop::collection::vec((1i64..20, 0u8..3), 1..30),
    ) {
        let ss = StateHistorySystem::in_memory(ts(0));
        let q = ss.get_quark_absolute_and_add(&["attr"]).unwrap();

        let mut t = 0;
        let mut declared: Option<u8> = None;
        for (dt, tag) in updates {
            t += dt;
            let value = match tag {
                0 => StateValue::Int(1),
                1 => StateValue::Long(1),
                _ => StateValue::from("s"),
            };
            let before = ss.query_ongoing(q).unwrap();
            let result = ss.modify_attribute(ts(t), value, q);
            match declared {
                None => {
                    prop_assert!(result.is_ok());
                    declared = Some(tag);
                }
                Some(kind) if kind == tag => prop_assert!(result.is_ok()),
                Some(_) => {
                    prop_assert!(result.is_err());
                    prop_assert_eq!(ss.query_ongoing(q).unwrap(), before);
                }
            }
        }
    }

    /// Re-sending the current ongoing value never creates an interval and
    /// never moves the ongoing start time.
    #[test]
    fn coalescing_is_idempotent(
        t0 in 1i64..100,
        repeats in prop::collection::vec(1i64..50, 1..10),
        v in 0i32..10,
    ) {
        let ss = StateHistorySystem::in_memory(ts(0));
        let q = ss.get_quark_absolute_and_add(&["attr"]).unwrap();

        ss.modify_attribute(ts(t0), StateValue::Int(v), q).unwrap();
        let start = ss.ongoing_start_time(q).unwrap();

        let mut t = t0;
        for dt in repeats {
            t += dt;
            ss.modify_attribute(ts(t), StateValue::Int(v), q).unwrap();
            prop_assert_eq!(ss.ongoing_start_time(q).unwrap(), start);
        }

        ss.close_history(ts(t + 1)).unwrap();
        // The whole run collapsed into the initial null interval plus one
        // value interval.
        let interval = ss.query_single_state(ts(t0), q).unwrap();
        prop_assert_eq!(interval.start, ts(t0));
        prop_assert_eq!(interval.end, ts(t + 1));
    }
}
