//! The state history system: ingestion and query surface tying the
//! attribute tree, the transient state and the interval backend together.

use crate::attributes::AttributeTree;
use crate::backend::IntervalBackend;
use crate::error::{HistoryError, Result};
use crate::transient::TransientState;
use crate::types::{Quark, StateInterval, StateValue, StateValueKind, Timestamp};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// Cap on stack-attribute depth, so a buggy ingestion loop cannot grow
/// the attribute tree without bound.
const MAX_STACK_DEPTH: i32 = 100_000;

/// Components guarded by the system's reader-writer lock. Keeping all
/// three behind one lock makes quark creation atomic: a quark is never
/// resolvable in the tree before its transient entry exists.
struct Inner {
    tree: AttributeTree,
    transient: TransientState,
    backend: Box<dyn IntervalBackend>,
}

impl Inner {
    /// Append transient entries for quarks the tree just created.
    fn sync_new_quarks(&mut self) {
        while self.transient.len() < self.tree.len() {
            self.transient.add_entry();
        }
    }

    fn known_quark(&self, quark: Quark) -> Result<Quark> {
        if !self.tree.contains(quark) {
            return Err(HistoryError::AttributeNotFound(quark.to_string()));
        }
        Ok(quark)
    }

    fn end_time(&self) -> Timestamp {
        if self.transient.is_active() {
            self.backend.end_time().max(self.transient.latest_time())
        } else {
            self.backend.end_time()
        }
    }

    fn modify(&mut self, t: Timestamp, value: StateValue, quark: Quark) -> Result<()> {
        self.transient
            .process_state_change(t, value, quark, self.backend.as_mut())
    }

    /// Nullify `quark` and its whole subtree, children first.
    fn remove_recursive(&mut self, t: Timestamp, quark: Quark) -> Result<()> {
        for child in self.tree.sub_attributes(quark, false)? {
            self.remove_recursive(t, child)?;
        }
        self.modify(t, StateValue::Null, quark)
    }
}

/// A complete, independently owned state history.
///
/// One logical writer (the ingestion pipeline) pushes timestamped state
/// changes while any number of readers run point-in-time queries; the two
/// sides are serialized by a single reader-writer lock. The system owns
/// exactly one attribute tree, one transient state and one backend for its
/// whole lifetime, and releases the backend deterministically through
/// [`StateHistorySystem::dispose`].
pub struct StateHistorySystem {
    inner: RwLock<Inner>,

    /// Start of the history; fixed at construction.
    start_time: Timestamp,

    /// Set by `dispose`; every later call is rejected.
    disposed: AtomicBool,
}

impl StateHistorySystem {
    /// Build a state history on top of `backend` (strategy chosen by the
    /// caller; see [`crate::backend::InMemoryBackend`] for the reference
    /// implementation).
    pub fn new(backend: Box<dyn IntervalBackend>) -> Self {
        let start_time = backend.start_time();
        Self {
            inner: RwLock::new(Inner {
                tree: AttributeTree::new(),
                transient: TransientState::new(start_time),
                backend,
            }),
            start_time,
            disposed: AtomicBool::new(false),
        }
    }

    /// Convenience constructor using the in-memory reference backend.
    pub fn in_memory(start_time: Timestamp) -> Self {
        Self::new(Box::new(crate::backend::InMemoryBackend::new(start_time)))
    }

    fn check_disposed(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(HistoryError::Disposed);
        }
        Ok(())
    }

    // --------------------------------------------------------------------
    // Attribute tree surface
    // --------------------------------------------------------------------

    /// Resolve an absolute attribute path, creating missing nodes (and
    /// their transient entries) on demand.
    pub fn get_quark_absolute_and_add(&self, path: &[&str]) -> Result<Quark> {
        self.get_quark_relative_and_add(Quark::ROOT, path)
    }

    /// Resolve `path` relative to `start`, creating missing nodes on
    /// demand. New attributes cannot be created once the history is
    /// closed (they could never satisfy the coverage invariant).
    pub fn get_quark_relative_and_add(&self, start: Quark, path: &[&str]) -> Result<Quark> {
        self.check_disposed()?;
        let mut inner = self.inner.write();

        if let Some(quark) = inner.tree.get_quark(start, path) {
            return Ok(quark);
        }
        if !inner.transient.is_active() {
            return Err(HistoryError::HistoryClosed);
        }
        let quark = inner.tree.get_or_create_quark(start, path)?;
        inner.sync_new_quarks();
        trace!(quark = quark.0, "created attribute");
        Ok(quark)
    }

    /// Resolve an absolute path without creating anything.
    pub fn get_quark_absolute(&self, path: &[&str]) -> Result<Quark> {
        self.opt_quark_absolute(path)?
            .ok_or_else(|| HistoryError::AttributeNotFound(path.join("/")))
    }

    /// Like [`StateHistorySystem::get_quark_absolute`] but `None` instead
    /// of an error when the path does not exist.
    pub fn opt_quark_absolute(&self, path: &[&str]) -> Result<Option<Quark>> {
        self.check_disposed()?;
        Ok(self.inner.read().tree.get_quark(Quark::ROOT, path))
    }

    /// Resolve `path` relative to `start` without creating anything.
    pub fn get_quark_relative(&self, start: Quark, path: &[&str]) -> Result<Quark> {
        self.opt_quark_relative(start, path)?
            .ok_or_else(|| HistoryError::AttributeNotFound(path.join("/")))
    }

    /// Like [`StateHistorySystem::get_quark_relative`] but `None` instead
    /// of an error when the path does not exist.
    pub fn opt_quark_relative(&self, start: Quark, path: &[&str]) -> Result<Option<Quark>> {
        self.check_disposed()?;
        Ok(self.inner.read().tree.get_quark(start, path))
    }

    /// Direct children of `quark`, or its whole subtree in depth-first
    /// parent-before-children order when `recursive`. `Quark::ROOT` lists
    /// the entire tree.
    pub fn sub_attributes(&self, quark: Quark, recursive: bool) -> Result<Vec<Quark>> {
        self.check_disposed()?;
        self.inner.read().tree.sub_attributes(quark, recursive)
    }

    /// Parent of `quark`; `Quark::ROOT` for top-level attributes.
    pub fn parent_attribute(&self, quark: Quark) -> Result<Quark> {
        self.check_disposed()?;
        self.inner.read().tree.parent(quark)
    }

    /// Last path segment of `quark`.
    pub fn attribute_name(&self, quark: Quark) -> Result<String> {
        self.check_disposed()?;
        Ok(self.inner.read().tree.attribute_name(quark)?.to_string())
    }

    /// Full path of `quark`, segments joined by `/`.
    pub fn full_attribute_path(&self, quark: Quark) -> Result<String> {
        self.check_disposed()?;
        self.inner.read().tree.full_attribute_path(quark)
    }

    /// Full path of `quark` as individual segments.
    pub fn full_attribute_path_array(&self, quark: Quark) -> Result<Vec<String>> {
        self.check_disposed()?;
        self.inner.read().tree.full_attribute_path_array(quark)
    }

    /// Number of attributes created so far.
    pub fn nb_attributes(&self) -> usize {
        self.inner.read().tree.len()
    }

    // --------------------------------------------------------------------
    // Ingestion surface (single logical writer)
    // --------------------------------------------------------------------

    /// Record that `quark` changed to `value` at time `t`. This is the
    /// single ingestion entry point; calls for a given quark must arrive
    /// in non-decreasing time order.
    pub fn modify_attribute(&self, t: Timestamp, value: StateValue, quark: Quark) -> Result<()> {
        self.check_disposed()?;
        self.inner.write().modify(t, value, quark)
    }

    /// Set `quark` and every attribute below it to null at time `t`,
    /// children first. The attributes themselves stay in the tree.
    pub fn remove_attribute(&self, t: Timestamp, quark: Quark) -> Result<()> {
        self.check_disposed()?;
        let mut inner = self.inner.write();
        inner.known_quark(quark)?;
        inner.remove_recursive(t, quark)
    }

    /// Push `value` onto the stack attribute `quark` at time `t`.
    ///
    /// The stack depth lives in `quark` itself (an int, or null for an
    /// empty stack); the pushed value goes into the sub-attribute named
    /// after the new depth.
    pub fn push_attribute(&self, t: Timestamp, value: StateValue, quark: Quark) -> Result<()> {
        self.check_disposed()?;
        let mut inner = self.inner.write();

        let depth = match inner.transient.ongoing_value(quark)? {
            // First use of this attribute as a stack.
            StateValue::Null => 0,
            StateValue::Int(depth) => *depth,
            other => {
                return Err(HistoryError::ValueTypeMismatch {
                    quark,
                    expected: StateValueKind::Int,
                    got: other.kind().expect("non-null value has a kind"),
                })
            }
        };
        if depth >= MAX_STACK_DEPTH {
            return Err(HistoryError::StackDepthExceeded { quark, depth });
        }

        let depth = depth + 1;
        let depth_name = depth.to_string();
        let sub_quark = inner
            .tree
            .get_or_create_quark(quark, &[depth_name.as_str()])?;
        inner.sync_new_quarks();

        inner.modify(t, StateValue::Int(depth), quark)?;
        inner.modify(t, value, sub_quark)
    }

    /// Pop the top of the stack attribute `quark` at time `t`, returning
    /// the popped value. Popping an empty stack returns `None` (this is
    /// common at trace start, e.g. an exit event without its entry).
    pub fn pop_attribute(&self, t: Timestamp, quark: Quark) -> Result<Option<StateValue>> {
        self.check_disposed()?;
        let mut inner = self.inner.write();

        let depth = match inner.transient.ongoing_value(quark)? {
            StateValue::Null => return Ok(None),
            StateValue::Int(depth) => *depth,
            other => {
                return Err(HistoryError::ValueTypeMismatch {
                    quark,
                    expected: StateValueKind::Int,
                    got: other.kind().expect("non-null value has a kind"),
                })
            }
        };

        let depth_name = depth.to_string();
        let sub_quark = inner
            .tree
            .get_quark(quark, &[depth_name.as_str()])
            .ok_or_else(|| {
                HistoryError::AttributeNotFound(format!(
                    "stack {quark} missing sub-attribute for depth {depth}"
                ))
            })?;
        let popped = inner.transient.ongoing_value(sub_quark)?.clone();

        let next = if depth - 1 == 0 {
            StateValue::Null
        } else {
            StateValue::Int(depth - 1)
        };
        inner.modify(t, next, quark)?;
        inner.remove_recursive(t, sub_quark)?;
        Ok(Some(popped))
    }

    /// Overwrite the ongoing value of `quark` without recording a state
    /// change (no new interval, start time untouched). For fix-ups only.
    pub fn update_ongoing_state(&self, value: StateValue, quark: Quark) -> Result<()> {
        self.check_disposed()?;
        self.inner.write().transient.set_ongoing_value(quark, value)
    }

    /// Replace the whole ongoing state, e.g. when re-seeding from a
    /// checkpoint. Only values and start times of the supplied intervals
    /// are used.
    pub fn replace_ongoing_state(&self, intervals: Vec<StateInterval>) -> Result<()> {
        self.check_disposed()?;
        self.inner.write().transient.replace_ongoing(intervals);
        Ok(())
    }

    // --------------------------------------------------------------------
    // Query surface (concurrent readers)
    // --------------------------------------------------------------------

    /// Current ongoing value of `quark`.
    pub fn query_ongoing(&self, quark: Quark) -> Result<StateValue> {
        self.check_disposed()?;
        Ok(self.inner.read().transient.ongoing_value(quark)?.clone())
    }

    /// Start time of the state `quark` is currently in.
    pub fn ongoing_start_time(&self, quark: Quark) -> Result<Timestamp> {
        self.check_disposed()?;
        self.inner.read().transient.ongoing_start(quark)
    }

    /// The interval containing `t` for `quark`, merged from the transient
    /// state (still-ongoing values) and the backend (finalized intervals).
    pub fn query_single_state(&self, t: Timestamp, quark: Quark) -> Result<StateInterval> {
        self.check_disposed()?;
        let inner = self.inner.read();
        inner.known_quark(quark)?;
        self.check_query_time(&inner, t)?;

        let ongoing = if inner.transient.is_active() {
            inner.transient.interval_at(t, quark)?
        } else {
            None
        };
        match ongoing {
            Some(interval) => Ok(interval),
            None => inner
                .backend
                .do_singular_query(t, quark)?
                .ok_or(HistoryError::IncoherentHistory { quark, time: t }),
        }
    }

    /// The state of every known attribute at time `t`, indexed by quark.
    pub fn query_full_state(&self, t: Timestamp) -> Result<Vec<StateInterval>> {
        self.check_disposed()?;
        let inner = self.inner.read();
        self.check_query_time(&inner, t)?;
        trace!(time = t.0, "full state query");

        let mut results: Vec<Option<StateInterval>> = vec![None; inner.tree.len()];
        if inner.transient.is_active() {
            inner.transient.do_query(&mut results, t);
        }
        inner.backend.do_query(&mut results, t)?;

        results
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or(HistoryError::IncoherentHistory {
                    quark: Quark(index as u32),
                    time: t,
                })
            })
            .collect()
    }

    fn check_query_time(&self, inner: &Inner, t: Timestamp) -> Result<()> {
        if t < self.start_time {
            return Err(HistoryError::TimeRange {
                time: t,
                detail: format!("before history start {}", self.start_time),
            });
        }
        // While building, times past the last change are served by dummy
        // ongoing intervals; once closed the end is final.
        if !inner.transient.is_active() && t > inner.backend.end_time() {
            return Err(HistoryError::TimeRange {
                time: t,
                detail: format!("after history end {}", inner.backend.end_time()),
            });
        }
        Ok(())
    }

    /// Start of the history's time range.
    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    /// End of the currently known time range: the latest state-change or
    /// flushed-interval time while building, the final end after close.
    pub fn current_end_time(&self) -> Timestamp {
        self.inner.read().end_time()
    }

    /// Whether all state up to `t` has been seen, i.e. queries at `t`
    /// will not race ahead of ingestion. True for any `t` once the
    /// history is closed.
    pub fn is_queryable(&self, t: Timestamp) -> bool {
        if self.disposed.load(Ordering::Acquire) {
            return false;
        }
        let inner = self.inner.read();
        !inner.transient.is_active() || t < inner.transient.latest_time()
    }

    /// Whether the history has been closed (no further ingestion).
    pub fn is_closed(&self) -> bool {
        !self.inner.read().transient.is_active()
    }

    // --------------------------------------------------------------------
    // Lifecycle
    // --------------------------------------------------------------------

    /// Close out the history: flush every still-ongoing state as a final
    /// interval ending at `end_time` and mark the backend finished.
    ///
    /// If the backend already stored intervals past `end_time`, the later
    /// of the two becomes the real end. Ongoing states that start after
    /// the end time (future-dated changes from a partial run) are dropped,
    /// not flushed.
    pub fn close_history(&self, end_time: Timestamp) -> Result<()> {
        self.check_disposed()?;
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let real_end = end_time.max(inner.backend.end_time());
        inner.transient.close(real_end, inner.backend.as_mut())?;
        inner.backend.finished_building(real_end)?;
        debug!(end = real_end.0, "history closed");
        Ok(())
    }

    /// Release the system's resources deterministically. Any use after
    /// this returns [`HistoryError::Disposed`]. An unfinished build is
    /// cancelled, not flushed.
    pub fn dispose(&self) {
        let mut inner = self.inner.write();
        inner.transient.set_inactive();
        inner.backend.dispose();
        self.disposed.store(true, Ordering::Release);
        debug!("state history disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system(start: i64) -> StateHistorySystem {
        StateHistorySystem::in_memory(Timestamp(start))
    }

    #[test]
    fn test_quark_creation_keeps_transient_in_sync() {
        let ss = system(0);
        let q = ss
            .get_quark_absolute_and_add(&["CPU", "0", "status"])
            .unwrap();
        assert_eq!(ss.nb_attributes(), 3);
        // Every created quark has an ongoing entry, intermediate nodes
        // included.
        for quark in ss.sub_attributes(Quark::ROOT, true).unwrap() {
            assert_eq!(ss.query_ongoing(quark).unwrap(), StateValue::Null);
        }
        assert_eq!(ss.query_ongoing(q).unwrap(), StateValue::Null);
    }

    #[test]
    fn test_quark_creation_after_close_rejected() {
        let ss = system(0);
        let existing = ss.get_quark_absolute_and_add(&["a"]).unwrap();
        ss.close_history(Timestamp(100)).unwrap();

        // Resolving an existing path still works.
        assert_eq!(ss.get_quark_absolute_and_add(&["a"]).unwrap(), existing);
        // Creating a new one does not.
        let result = ss.get_quark_absolute_and_add(&["b"]);
        assert!(matches!(result, Err(HistoryError::HistoryClosed)));
    }

    #[test]
    fn test_end_time_follows_latest_change() {
        let ss = system(1000);
        let q = ss.get_quark_absolute_and_add(&["a"]).unwrap();
        assert_eq!(ss.current_end_time(), Timestamp(1000));

        ss.modify_attribute(Timestamp(1010), StateValue::Int(1), q)
            .unwrap();
        assert_eq!(ss.current_end_time(), Timestamp(1010));

        ss.close_history(Timestamp(1030)).unwrap();
        assert_eq!(ss.current_end_time(), Timestamp(1030));
    }

    #[test]
    fn test_is_queryable() {
        let ss = system(1000);
        let q = ss.get_quark_absolute_and_add(&["a"]).unwrap();

        assert!(!ss.is_queryable(Timestamp(1000)));
        ss.modify_attribute(Timestamp(1020), StateValue::Int(1), q)
            .unwrap();
        assert!(ss.is_queryable(Timestamp(1015)));
        assert!(!ss.is_queryable(Timestamp(1020)));

        ss.close_history(Timestamp(1030)).unwrap();
        assert!(ss.is_queryable(Timestamp(9999)));
    }

    #[test]
    fn test_query_before_start_rejected() {
        let ss = system(1000);
        ss.get_quark_absolute_and_add(&["a"]).unwrap();
        let result = ss.query_full_state(Timestamp(999));
        assert!(matches!(result, Err(HistoryError::TimeRange { .. })));
    }

    #[test]
    fn test_query_after_final_end_rejected() {
        let ss = system(1000);
        ss.get_quark_absolute_and_add(&["a"]).unwrap();
        ss.close_history(Timestamp(1030)).unwrap();
        let result = ss.query_full_state(Timestamp(1031));
        assert!(matches!(result, Err(HistoryError::TimeRange { .. })));
    }

    #[test]
    fn test_dispose_rejects_everything() {
        let ss = system(0);
        let q = ss.get_quark_absolute_and_add(&["a"]).unwrap();
        ss.dispose();

        assert!(matches!(
            ss.query_full_state(Timestamp(0)),
            Err(HistoryError::Disposed)
        ));
        assert!(matches!(
            ss.modify_attribute(Timestamp(10), StateValue::Int(1), q),
            Err(HistoryError::Disposed)
        ));
        assert!(matches!(
            ss.get_quark_absolute_and_add(&["b"]),
            Err(HistoryError::Disposed)
        ));
        assert!(!ss.is_queryable(Timestamp(0)));
    }
}
