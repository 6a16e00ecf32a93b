//! The attribute tree: a dynamic hierarchical namespace mapped to quarks.
//!
//! Attribute paths ("CPU/0/status") resolve to stable integer quarks that
//! the rest of the engine keys on. The tree only ever grows; a path keeps
//! its quark for the life of the history.

mod tree;

pub use tree::AttributeTree;
