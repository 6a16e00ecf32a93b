//! The transient state: turns punctual state changes into closed intervals.
//!
//! While ingestion is in progress, every attribute has an "ongoing" value
//! and the time since when it has held it. When a state change arrives, the
//! previous ongoing value is closed off as an interval `[ongoing_start,
//! change_time - 1]` and pushed into the backend; the new value becomes
//! ongoing. Queries at or after the last flushed interval are served from
//! here with a dummy interval ending at the latest time seen so far.

use crate::backend::IntervalBackend;
use crate::error::{HistoryError, Result};
use crate::types::{Quark, StateInterval, StateValue, StateValueKind, Timestamp};

/// Per-quark "ongoing value + start time" table.
///
/// Stored as parallel vectors indexed by quark, kept in lock-step with the
/// attribute tree: one entry is appended the moment a quark is created.
/// This struct does no locking of its own; the owning state history system
/// serializes writers and readers around it.
#[derive(Debug)]
pub struct TransientState {
    ongoing_values: Vec<StateValue>,
    ongoing_starts: Vec<Timestamp>,

    /// Declared value kind per quark; `None` until the first non-null
    /// value is seen.
    value_kinds: Vec<Option<StateValueKind>>,

    /// Latest state-change timestamp seen so far.
    latest_time: Timestamp,

    /// Start of the history; initial ongoing start of every new entry.
    start_time: Timestamp,

    /// False once the history has been closed out.
    active: bool,
}

impl TransientState {
    /// Create an empty transient state for a history starting at
    /// `start_time`.
    pub fn new(start_time: Timestamp) -> Self {
        Self {
            ongoing_values: Vec::new(),
            ongoing_starts: Vec::new(),
            value_kinds: Vec::new(),
            latest_time: start_time,
            start_time,
            active: true,
        }
    }

    /// Number of entries (== number of quarks ever created).
    pub fn len(&self) -> usize {
        self.ongoing_values.len()
    }

    /// Whether no quark has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.ongoing_values.is_empty()
    }

    /// Whether the history is still being built.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Latest state-change timestamp seen so far.
    pub fn latest_time(&self) -> Timestamp {
        self.latest_time
    }

    fn check_quark(&self, quark: Quark) -> Result<usize> {
        let index = quark.index();
        if quark == Quark::ROOT || index >= self.ongoing_values.len() {
            return Err(HistoryError::AttributeNotFound(quark.to_string()));
        }
        Ok(index)
    }

    /// Register a newly created quark.
    ///
    /// The new attribute is assumed to have been in the null state since
    /// the start of the history, so intervals cover all timestamps; the
    /// null interval gets flushed at the first real state change.
    pub fn add_entry(&mut self) {
        self.ongoing_values.push(StateValue::Null);
        self.ongoing_starts.push(self.start_time);
        self.value_kinds.push(None);
    }

    /// Current ongoing value of `quark`.
    pub fn ongoing_value(&self, quark: Quark) -> Result<&StateValue> {
        let index = self.check_quark(quark)?;
        Ok(&self.ongoing_values[index])
    }

    /// Start time of the state `quark` is currently in.
    pub fn ongoing_start(&self, quark: Quark) -> Result<Timestamp> {
        let index = self.check_quark(quark)?;
        Ok(self.ongoing_starts[index])
    }

    /// The ongoing state of `quark` as a dummy interval whose end is the
    /// latest time seen so far (not the final end of that state).
    pub fn ongoing_interval(&self, quark: Quark) -> Result<StateInterval> {
        let index = self.check_quark(quark)?;
        Ok(StateInterval::new(
            quark,
            self.ongoing_starts[index],
            self.latest_time,
            self.ongoing_values[index].clone(),
        ))
    }

    /// The dummy ongoing interval for `quark` if it is valid at `t`, i.e.
    /// the ongoing state already started by then. `None` means the caller
    /// must fall back to the backend.
    pub fn interval_at(&self, t: Timestamp, quark: Quark) -> Result<Option<StateInterval>> {
        let index = self.check_quark(quark)?;
        if !self.active || t < self.ongoing_starts[index] {
            return Ok(None);
        }
        Ok(Some(StateInterval::new(
            quark,
            self.ongoing_starts[index],
            self.latest_time,
            self.ongoing_values[index].clone(),
        )))
    }

    /// Overwrite the ongoing value of `quark` in place, without touching
    /// its start time or declared kind. For fix-ups only; regular
    /// ingestion goes through [`TransientState::process_state_change`].
    pub fn set_ongoing_value(&mut self, quark: Quark, value: StateValue) -> Result<()> {
        let index = self.check_quark(quark)?;
        self.ongoing_values[index] = value;
        Ok(())
    }

    /// Process one punctual state change for `quark` at `event_time`,
    /// flushing the previous ongoing state into `backend` as a closed
    /// interval when needed.
    ///
    /// Rejections (each leaves the ongoing state untouched):
    /// - `HistoryClosed` once [`TransientState::close`] has run,
    /// - `AttributeNotFound` for an unregistered quark,
    /// - `TimeRange` when `event_time` precedes the ongoing start
    ///   (out-of-order ingestion),
    /// - `ValueTypeMismatch` when a non-null value does not match the
    ///   kind declared by the first non-null value seen for this quark.
    pub fn process_state_change(
        &mut self,
        event_time: Timestamp,
        value: StateValue,
        quark: Quark,
        backend: &mut dyn IntervalBackend,
    ) -> Result<()> {
        if !self.active {
            return Err(HistoryError::HistoryClosed);
        }
        let index = self.check_quark(quark)?;

        let ongoing_start = self.ongoing_starts[index];
        if event_time < ongoing_start {
            return Err(HistoryError::TimeRange {
                time: event_time,
                detail: format!("out-of-order change for quark {quark}, ongoing state started at {ongoing_start}"),
            });
        }

        match (self.value_kinds[index], value.kind()) {
            // First non-null value declares the kind for this attribute.
            (None, incoming) => self.value_kinds[index] = incoming,
            // Null stays accepted whatever the declared kind.
            (Some(_), None) => {}
            (Some(expected), Some(got)) => {
                if expected != got {
                    return Err(HistoryError::ValueTypeMismatch {
                        quark,
                        expected,
                        got,
                    });
                }
            }
        }

        if self.ongoing_values[index] == value {
            // Same value again: keep the current interval going instead of
            // emitting a duplicate.
            return Ok(());
        }

        if ongoing_start < event_time {
            backend.insert_past_state(
                ongoing_start,
                Timestamp(event_time.0 - 1),
                quark,
                self.ongoing_values[index].clone(),
            )?;
            self.ongoing_starts[index] = event_time;
        }
        self.ongoing_values[index] = value;

        if self.latest_time < event_time {
            self.latest_time = event_time;
        }
        Ok(())
    }

    /// Run a "state at time `t`" query against the transient state only,
    /// filling dummy ongoing intervals into `results` (indexed by quark)
    /// wherever the ongoing state is valid at `t`.
    pub fn do_query(&self, results: &mut [Option<StateInterval>], t: Timestamp) {
        if !self.active {
            return;
        }
        let count = results.len().min(self.ongoing_values.len());
        for index in 0..count {
            if t >= self.ongoing_starts[index] {
                results[index] = Some(StateInterval::new(
                    Quark(index as u32),
                    self.ongoing_starts[index],
                    self.latest_time,
                    self.ongoing_values[index].clone(),
                ));
            }
        }
    }

    /// Replace the whole ongoing state in one go, e.g. when re-seeding
    /// from a checkpoint. Only the values and start times of the supplied
    /// intervals matter; declared kinds are rebuilt from the values.
    pub fn replace_ongoing(&mut self, intervals: Vec<StateInterval>) {
        self.ongoing_values = Vec::with_capacity(intervals.len());
        self.ongoing_starts = Vec::with_capacity(intervals.len());
        self.value_kinds = Vec::with_capacity(intervals.len());

        for interval in intervals {
            self.ongoing_starts.push(interval.start);
            self.value_kinds.push(interval.value.kind());
            self.ongoing_values.push(interval.value);
        }
    }

    /// Close off the transient state: flush every ongoing state as a final
    /// interval ending at `end_time` and become permanently inactive.
    ///
    /// Entries whose ongoing state starts after `end_time` ("future"
    /// updates from a partial or aborted run) are skipped, not flushed and
    /// not an error. Calling close on an already-closed state is a no-op.
    pub fn close(&mut self, end_time: Timestamp, backend: &mut dyn IntervalBackend) -> Result<()> {
        if !self.active {
            return Ok(());
        }

        for index in 0..self.ongoing_values.len() {
            if self.ongoing_starts[index] > end_time {
                continue;
            }
            backend.insert_past_state(
                self.ongoing_starts[index],
                end_time,
                Quark(index as u32),
                std::mem::take(&mut self.ongoing_values[index]),
            )?;
        }

        self.ongoing_values.clear();
        self.ongoing_starts.clear();
        self.value_kinds.clear();
        self.active = false;
        Ok(())
    }

    /// Mark the transient state inactive without flushing anything.
    /// Used when a build is cancelled.
    pub fn set_inactive(&mut self) {
        self.active = false;
    }
}
