//! Error types for the state history.

use crate::types::{Quark, StateValueKind, Timestamp};
use thiserror::Error;

/// Main error type for state history operations.
///
/// Every variant is a rejection of the offending call: the engine never
/// retries and never silently corrects, so the ongoing state is left
/// untouched by a failed operation.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    #[error("Invalid attribute name: {0:?}")]
    InvalidAttributeName(String),

    #[error("State value type mismatch on quark {quark}: expected {expected}, got {got}")]
    ValueTypeMismatch {
        quark: Quark,
        expected: StateValueKind,
        got: StateValueKind,
    },

    #[error("Time {time} out of range: {detail}")]
    TimeRange { time: Timestamp, detail: String },

    #[error("History is closed, no further modifications accepted")]
    HistoryClosed,

    #[error("Stack depth limit reached on quark {quark} (depth {depth})")]
    StackDepthExceeded { quark: Quark, depth: i32 },

    #[error("State history system has been disposed")]
    Disposed,

    #[error("Incoherent interval storage: no interval for quark {quark} at time {time}")]
    IncoherentHistory { quark: Quark, time: Timestamp },
}

/// Result type for state history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;
