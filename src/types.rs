//! Core types for the state history.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable integer identifier for an attribute path.
///
/// Quarks are assigned 0..N in creation order and stay valid for the
/// entire life of the history: finalized intervals key on them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Quark(pub u32);

impl Quark {
    /// Sentinel meaning "no parent" / "the whole tree".
    ///
    /// Used as the starting node for absolute path resolution and as the
    /// parent of top-level attributes. It never indexes a real node.
    pub const ROOT: Quark = Quark(u32::MAX);

    /// Index into quark-keyed vectors.
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Quark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Quark::ROOT {
            write!(f, "Quark(ROOT)")
        } else {
            write!(f, "Quark({})", self.0)
        }
    }
}

impl fmt::Display for Quark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Quark::ROOT {
            write!(f, "ROOT")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A point on the trace clock. Unit-agnostic (whatever the trace uses,
/// typically nanoseconds).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The value an attribute holds during an interval.
///
/// Equality is exact (doubles compare bitwise-exactly, which is what
/// interval coalescing needs). `Null` is type-compatible with every
/// attribute regardless of its declared kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum StateValue {
    #[default]
    Null,
    Int(i32),
    Long(i64),
    Double(f64),
    Str(String),
}

impl StateValue {
    /// The type tag of this value, or `None` for `Null`.
    pub fn kind(&self) -> Option<StateValueKind> {
        match self {
            StateValue::Null => None,
            StateValue::Int(_) => Some(StateValueKind::Int),
            StateValue::Long(_) => Some(StateValueKind::Long),
            StateValue::Double(_) => Some(StateValueKind::Double),
            StateValue::Str(_) => Some(StateValueKind::Str),
        }
    }

    /// Whether this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, StateValue::Null)
    }
}

impl From<i32> for StateValue {
    fn from(v: i32) -> Self {
        StateValue::Int(v)
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        StateValue::Long(v)
    }
}

impl From<f64> for StateValue {
    fn from(v: f64) -> Self {
        StateValue::Double(v)
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        StateValue::Str(v.to_string())
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        StateValue::Str(v)
    }
}

/// Type tag for the non-null `StateValue` variants.
///
/// The first non-null value stored for an attribute declares its kind;
/// every later non-null value must match it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateValueKind {
    Int,
    Long,
    Double,
    Str,
}

impl fmt::Display for StateValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateValueKind::Int => "int",
            StateValueKind::Long => "long",
            StateValueKind::Double => "double",
            StateValueKind::Str => "string",
        };
        write!(f, "{name}")
    }
}

/// A closed time range `[start, end]` during which one attribute held one
/// value.
///
/// For a given quark, the intervals produced over the life of the history
/// partition `[start_time, current_end_time]` with no gaps and no overlaps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateInterval {
    pub quark: Quark,
    pub start: Timestamp,
    pub end: Timestamp,
    pub value: StateValue,
}

impl StateInterval {
    pub fn new(quark: Quark, start: Timestamp, end: Timestamp, value: StateValue) -> Self {
        Self {
            quark,
            start,
            end,
            value,
        }
    }

    /// Whether `t` falls inside this interval (bounds included).
    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quark_root_sentinel() {
        assert_eq!(format!("{:?}", Quark::ROOT), "Quark(ROOT)");
        assert_eq!(format!("{:?}", Quark(3)), "Quark(3)");
        assert_ne!(Quark(0), Quark::ROOT);
    }

    #[test]
    fn test_state_value_kinds() {
        assert_eq!(StateValue::Null.kind(), None);
        assert_eq!(StateValue::Int(1).kind(), Some(StateValueKind::Int));
        assert_eq!(StateValue::Long(1).kind(), Some(StateValueKind::Long));
        assert_eq!(StateValue::Double(1.0).kind(), Some(StateValueKind::Double));
        assert_eq!(
            StateValue::from("running").kind(),
            Some(StateValueKind::Str)
        );
    }

    #[test]
    fn test_state_value_equality_is_exact() {
        assert_eq!(StateValue::Int(5), StateValue::Int(5));
        assert_ne!(StateValue::Int(5), StateValue::Long(5));
        assert_ne!(StateValue::Double(0.1), StateValue::Double(0.2));
    }

    #[test]
    fn test_interval_contains() {
        let iv = StateInterval::new(Quark(0), Timestamp(10), Timestamp(19), StateValue::Int(2));
        assert!(iv.contains(Timestamp(10)));
        assert!(iv.contains(Timestamp(15)));
        assert!(iv.contains(Timestamp(19)));
        assert!(!iv.contains(Timestamp(9)));
        assert!(!iv.contains(Timestamp(20)));
    }
}
