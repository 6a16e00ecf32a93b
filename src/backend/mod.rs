//! Storage backends for finalized state intervals.
//!
//! The transient state flushes closed intervals into an [`IntervalBackend`];
//! queries read them back. The backend is chosen at construction time of
//! the state history system and hidden behind the trait afterwards, so an
//! in-memory history and a persisted one expose the same contract.

mod memory;

pub use memory::InMemoryBackend;

use crate::error::Result;
use crate::types::{Quark, StateInterval, StateValue, Timestamp};

/// Contract for storing finalized `[start, end] -> value` intervals per
/// quark and answering point-in-time queries.
///
/// Insertions arrive from the transient state in non-decreasing start
/// order per quark; implementations may rely on that but should validate
/// it defensively and reject violations with a time-range error.
pub trait IntervalBackend: Send + Sync {
    /// Start of the time range covered by this history.
    fn start_time(&self) -> Timestamp;

    /// End of the currently stored time range (>= `start_time`).
    fn end_time(&self) -> Timestamp;

    /// Append one finalized interval for `quark`.
    fn insert_past_state(
        &mut self,
        start: Timestamp,
        end: Timestamp,
        quark: Quark,
        value: StateValue,
    ) -> Result<()>;

    /// The stored interval containing `t` for `quark`, if any.
    ///
    /// `Ok(None)` means this backend holds nothing covering `t` for that
    /// quark; the caller decides whether the transient state fills the gap
    /// or the history is incoherent.
    fn do_singular_query(&self, t: Timestamp, quark: Quark) -> Result<Option<StateInterval>>;

    /// Fill `results` (indexed by quark) with the stored intervals
    /// containing `t`. Slots already filled by the caller are left alone.
    fn do_query(&self, results: &mut [Option<StateInterval>], t: Timestamp) -> Result<()>;

    /// Notification that ingestion is complete; `end_time` is the final
    /// end of the history.
    fn finished_building(&mut self, end_time: Timestamp) -> Result<()>;

    /// Release the backend's resources deterministically. Persisted
    /// backends hold OS file handles, so this must not be left to drop
    /// order alone.
    fn dispose(&mut self);
}
