//! Attribute tree implementation.

use crate::error::{HistoryError, Result};
use crate::types::Quark;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single node in the attribute tree.
///
/// Nodes live in the tree's flat arena and reference each other by quark
/// id, never by owning pointers, so the parent back-reference cannot form
/// an ownership cycle and the whole tree serializes trivially.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct AttributeNode {
    /// Last path segment of this attribute.
    name: String,

    /// Quark of the enclosing attribute, `Quark::ROOT` for top-level ones.
    parent: Quark,

    /// Children by segment name. BTreeMap keeps iteration order stable,
    /// which debugging output and recursive listings rely on.
    children: BTreeMap<String, Quark>,
}

/// Bidirectional mapping between hierarchical attribute paths and quarks.
///
/// Quarks are handed out in strictly increasing order and attributes are
/// never removed, so a quark obtained once stays resolvable forever.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AttributeTree {
    /// Arena of nodes, indexed by quark.
    nodes: Vec<AttributeNode>,

    /// Children of the conceptual root, by segment name.
    root_children: BTreeMap<String, Quark>,
}

impl AttributeTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of quarks ever created.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no attributes yet.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `quark` refers to an existing attribute (ROOT does not).
    pub fn contains(&self, quark: Quark) -> bool {
        quark != Quark::ROOT && quark.index() < self.nodes.len()
    }

    fn node(&self, quark: Quark) -> Result<&AttributeNode> {
        if !self.contains(quark) {
            return Err(HistoryError::AttributeNotFound(quark.to_string()));
        }
        Ok(&self.nodes[quark.index()])
    }

    fn children_of(&self, quark: Quark) -> Result<&BTreeMap<String, Quark>> {
        if quark == Quark::ROOT {
            Ok(&self.root_children)
        } else {
            Ok(&self.node(quark)?.children)
        }
    }

    /// Resolve `path` relative to `start` (use `Quark::ROOT` for absolute
    /// paths), creating every missing node along the way.
    ///
    /// The only failure modes are an unknown `start` quark and an empty
    /// path segment.
    pub fn get_or_create_quark(&mut self, start: Quark, path: &[&str]) -> Result<Quark> {
        if start != Quark::ROOT && !self.contains(start) {
            return Err(HistoryError::AttributeNotFound(start.to_string()));
        }

        let mut current = start;
        for segment in path {
            if segment.is_empty() {
                return Err(HistoryError::InvalidAttributeName(segment.to_string()));
            }

            let existing = self.children_of(current)?.get(*segment).copied();
            current = match existing {
                Some(quark) => quark,
                None => {
                    let quark = Quark(self.nodes.len() as u32);
                    self.nodes.push(AttributeNode {
                        name: segment.to_string(),
                        parent: current,
                        children: BTreeMap::new(),
                    });
                    let parent_children = if current == Quark::ROOT {
                        &mut self.root_children
                    } else {
                        &mut self.nodes[current.index()].children
                    };
                    parent_children.insert(segment.to_string(), quark);
                    quark
                }
            };
        }
        Ok(current)
    }

    /// Read-only resolution of `path` relative to `start`. Returns `None`
    /// as soon as any segment is missing; never creates nodes.
    pub fn get_quark(&self, start: Quark, path: &[&str]) -> Option<Quark> {
        if start != Quark::ROOT && !self.contains(start) {
            return None;
        }

        let mut current = start;
        for segment in path {
            current = *self.children_of(current).ok()?.get(*segment)?;
        }
        Some(current)
    }

    /// Quarks below `quark`: direct children, or the full subtree in
    /// depth-first parent-before-children order when `recursive`.
    ///
    /// `Quark::ROOT` lists from the top of the tree.
    pub fn sub_attributes(&self, quark: Quark, recursive: bool) -> Result<Vec<Quark>> {
        let children = self.children_of(quark)?;
        let mut result = Vec::new();
        for &child in children.values() {
            result.push(child);
            if recursive {
                result.extend(self.sub_attributes(child, true)?);
            }
        }
        Ok(result)
    }

    /// Parent of `quark`; `Quark::ROOT` for top-level attributes.
    pub fn parent(&self, quark: Quark) -> Result<Quark> {
        Ok(self.node(quark)?.parent)
    }

    /// Last path segment of `quark`.
    pub fn attribute_name(&self, quark: Quark) -> Result<&str> {
        Ok(&self.node(quark)?.name)
    }

    /// Full path of `quark`, segments joined by `/`.
    pub fn full_attribute_path(&self, quark: Quark) -> Result<String> {
        Ok(self.full_attribute_path_array(quark)?.join("/"))
    }

    /// Full path of `quark` as individual segments, root first.
    pub fn full_attribute_path_array(&self, quark: Quark) -> Result<Vec<String>> {
        let mut segments = Vec::new();
        let mut current = quark;
        while current != Quark::ROOT {
            let node = self.node(current)?;
            segments.push(node.name.clone());
            current = node.parent;
        }
        segments.reverse();
        Ok(segments)
    }
}
