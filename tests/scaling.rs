//! Scaling tests with synthetic 50k+ change histories.
//!
//! Measures the key operations at realistic trace sizes:
//! - Attribute tree growth
//! - Ingestion throughput
//! - Point and full-state queries while building and after close

use statehist::{Quark, StateHistorySystem, StateValue, Timestamp};
use std::time::Instant;

const CHANGE_COUNT: i64 = 50_000;
const ATTRIBUTE_COUNT: usize = 1_000;

fn ts(t: i64) -> Timestamp {
    Timestamp(t)
}

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Timing helper
struct Timer {
    start: Instant,
    name: &'static str,
}

impl Timer {
    fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    fn report_with_count(&self, count: usize) {
        let ms = self.elapsed_ms();
        let per_item = if count > 0 { ms / count as f64 } else { 0.0 };
        println!(
            "  {} took {:.2}ms ({} items, {:.4}ms/item, {:.0} items/sec)",
            self.name,
            ms,
            count,
            per_item,
            if ms > 0.0 {
                count as f64 / (ms / 1000.0)
            } else {
                0.0
            }
        );
    }
}

#[test]
fn test_scaling_50k_changes() {
    init_logging();
    let ss = StateHistorySystem::in_memory(ts(0));

    // Grow the attribute tree the way a kernel analysis would.
    let timer = Timer::new("attribute creation");
    let quarks: Vec<Quark> = (0..ATTRIBUTE_COUNT)
        .map(|i| {
            ss.get_quark_absolute_and_add(&["Threads", i.to_string().as_str(), "status"])
                .unwrap()
        })
        .collect();
    timer.report_with_count(ATTRIBUTE_COUNT);
    assert_eq!(ss.nb_attributes(), ATTRIBUTE_COUNT * 2 + 1); // Threads + per-id + status

    // Ingest.
    let timer = Timer::new("ingestion");
    for t in 1..=CHANGE_COUNT {
        let q = quarks[(t as usize) % ATTRIBUTE_COUNT];
        ss.modify_attribute(ts(t), StateValue::Int((t % 3) as i32), q)
            .unwrap();
    }
    timer.report_with_count(CHANGE_COUNT as usize);

    // Point queries while the history is still building.
    let timer = Timer::new("mid-build point queries");
    for i in 0..1_000i64 {
        let t = (i * 37) % CHANGE_COUNT;
        let interval = ss
            .query_single_state(ts(t), quarks[(i as usize) % ATTRIBUTE_COUNT])
            .unwrap();
        assert!(interval.contains(ts(t)));
    }
    timer.report_with_count(1_000);

    let timer = Timer::new("close");
    ss.close_history(ts(CHANGE_COUNT + 1)).unwrap();
    timer.report_with_count(ss.nb_attributes());

    // Full-state queries on the closed history.
    let timer = Timer::new("full-state queries");
    for i in 1..=10 {
        let t = (CHANGE_COUNT / 10) * i;
        let full = ss.query_full_state(ts(t)).unwrap();
        assert_eq!(full.len(), ss.nb_attributes());
    }
    timer.report_with_count(10);

    ss.dispose();
}

#[test]
fn test_scaling_deep_single_attribute() {
    init_logging();
    let ss = StateHistorySystem::in_memory(ts(0));
    let q = ss.get_quark_absolute_and_add(&["counter"]).unwrap();

    let timer = Timer::new("deep ingestion");
    for t in 1..=CHANGE_COUNT {
        ss.modify_attribute(ts(t), StateValue::Long(t), q).unwrap();
    }
    timer.report_with_count(CHANGE_COUNT as usize);
    ss.close_history(ts(CHANGE_COUNT)).unwrap();

    // Binary-search point lookups stay fast at depth.
    let timer = Timer::new("deep point queries");
    for i in 0..10_000i64 {
        let t = (i * 13) % CHANGE_COUNT;
        let interval = ss.query_single_state(ts(t), q).unwrap();
        assert!(interval.contains(ts(t)));
    }
    timer.report_with_count(10_000);
}
