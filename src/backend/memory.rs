//! Reference in-memory interval backend.

use crate::backend::IntervalBackend;
use crate::error::{HistoryError, Result};
use crate::types::{Quark, StateInterval, StateValue, Timestamp};

/// Interval storage backed by per-quark vectors kept sorted by start time.
///
/// Point lookups are a binary search; insertion is an amortized O(1)
/// append since the transient state always flushes in start order.
#[derive(Debug)]
pub struct InMemoryBackend {
    start_time: Timestamp,
    end_time: Timestamp,

    /// Finalized intervals, indexed by quark, sorted by start time.
    intervals: Vec<Vec<StateInterval>>,
}

impl InMemoryBackend {
    /// Create a backend covering history starting at `start_time`.
    pub fn new(start_time: Timestamp) -> Self {
        Self {
            start_time,
            end_time: start_time,
            intervals: Vec::new(),
        }
    }

    /// Total number of stored intervals, across all quarks.
    pub fn interval_count(&self) -> usize {
        self.intervals.iter().map(Vec::len).sum()
    }

    /// All stored intervals for `quark`, in start order.
    pub fn intervals_of(&self, quark: Quark) -> &[StateInterval] {
        self.intervals
            .get(quark.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn find_at(&self, t: Timestamp, quark: Quark) -> Option<&StateInterval> {
        let row = self.intervals.get(quark.index())?;
        // Last interval whose start is <= t; rows are sorted and disjoint.
        let idx = row.partition_point(|iv| iv.start <= t);
        let candidate = &row[idx.checked_sub(1)?];
        candidate.contains(t).then_some(candidate)
    }
}

impl IntervalBackend for InMemoryBackend {
    fn start_time(&self) -> Timestamp {
        self.start_time
    }

    fn end_time(&self) -> Timestamp {
        self.end_time
    }

    fn insert_past_state(
        &mut self,
        start: Timestamp,
        end: Timestamp,
        quark: Quark,
        value: StateValue,
    ) -> Result<()> {
        if end < start {
            return Err(HistoryError::TimeRange {
                time: end,
                detail: format!("interval end precedes start {start}"),
            });
        }
        if start < self.start_time {
            return Err(HistoryError::TimeRange {
                time: start,
                detail: format!("interval starts before history start {}", self.start_time),
            });
        }

        if self.intervals.len() <= quark.index() {
            self.intervals.resize_with(quark.index() + 1, Vec::new);
        }
        let row = &mut self.intervals[quark.index()];
        if let Some(last) = row.last() {
            // The transient state flushes strictly after the previous
            // interval for the same quark; anything else would overlap.
            if start <= last.end {
                return Err(HistoryError::TimeRange {
                    time: start,
                    detail: format!(
                        "interval for quark {quark} overlaps previous end {}",
                        last.end
                    ),
                });
            }
        }
        row.push(StateInterval::new(quark, start, end, value));

        if self.end_time < end {
            self.end_time = end;
        }
        Ok(())
    }

    fn do_singular_query(&self, t: Timestamp, quark: Quark) -> Result<Option<StateInterval>> {
        Ok(self.find_at(t, quark).cloned())
    }

    fn do_query(&self, results: &mut [Option<StateInterval>], t: Timestamp) -> Result<()> {
        for (index, slot) in results.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = self.find_at(t, Quark(index as u32)).cloned();
            }
        }
        Ok(())
    }

    fn finished_building(&mut self, end_time: Timestamp) -> Result<()> {
        if self.end_time < end_time {
            self.end_time = end_time;
        }
        Ok(())
    }

    fn dispose(&mut self) {
        self.intervals.clear();
        self.intervals.shrink_to_fit();
    }
}
