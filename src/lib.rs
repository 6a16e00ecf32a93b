//! # State History
//!
//! A quark-indexed, time-interval database for recording and querying how
//! thousands of independent attributes (CPU state, per-thread status,
//! per-disk counters, ...) evolve over the lifetime of a trace.
//!
//! ## Core Concepts
//!
//! - **Attributes**: A dynamic hierarchical namespace; each path maps to a
//!   stable integer quark
//! - **Transient state**: Converts punctual state-change events into
//!   closed time intervals under type and ordering invariants
//! - **Backend**: Pluggable storage for finalized intervals; an in-memory
//!   reference implementation is provided
//! - **System**: Orchestrates the three and exposes the ingestion and
//!   query API, single writer with concurrent readers
//!
//! ## Example
//!
//! ```
//! use statehist::{StateHistorySystem, StateValue, Timestamp};
//!
//! let ss = StateHistorySystem::in_memory(Timestamp(1000));
//! let quark = ss.get_quark_absolute_and_add(&["CPU", "0", "status"])?;
//!
//! ss.modify_attribute(Timestamp(1010), StateValue::Int(2), quark)?;
//! ss.modify_attribute(Timestamp(1020), StateValue::Null, quark)?;
//! ss.close_history(Timestamp(1030))?;
//!
//! let interval = ss.query_single_state(Timestamp(1015), quark)?;
//! assert_eq!(interval.value, StateValue::Int(2));
//! # Ok::<(), statehist::HistoryError>(())
//! ```

pub mod attributes;
pub mod backend;
pub mod error;
pub mod system;
pub mod transient;
pub mod types;

// Re-exports
pub use attributes::AttributeTree;
pub use backend::{InMemoryBackend, IntervalBackend};
pub use error::{HistoryError, Result};
pub use system::StateHistorySystem;
pub use transient::TransientState;
pub use types::*;
