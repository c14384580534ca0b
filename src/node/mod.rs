//! Typed node records and the invariants on their link/attribute/name fields.
//!
//! A [`Node`] is a tagged variant over a shared [`NodeDelegate`] plus the
//! per-kind extension fields. Mutators here are total:
//! they never fail, and only ever touch the slots the kind owns. This module
//! is purely in-memory bookkeeping; persistence is the page adapter's job
//! ([`crate::page`]).

mod keys;
mod kind;

pub use keys::{is_null, NameDictKind, NameKey, NodeKey, NULL_KEY, NULL_NAME_KEY, ROOT_KEY};
pub use kind::NodeKind;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Fields shared by every node kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDelegate {
    pub node_key: NodeKey,
    pub parent_key: NodeKey,
    pub hash: u64,
}

/// Child/sibling links and counts, owned by Root, Element, and Text nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralFields {
    pub first_child_key: NodeKey,
    pub left_sibling_key: NodeKey,
    pub right_sibling_key: NodeKey,
    pub child_count: u64,
    pub descendant_count: u64,
}

impl Default for StructuralFields {
    fn default() -> Self {
        StructuralFields {
            first_child_key: NULL_KEY,
            left_sibling_key: NULL_KEY,
            right_sibling_key: NULL_KEY,
            child_count: 0,
            descendant_count: 0,
        }
    }
}

/// Name dictionary references, owned by Element, Attribute, and Namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedFields {
    pub name_key: NameKey,
    pub uri_key: NameKey,
}

/// An opaque byte value plus whether it is stored compressed, owned by Text
/// and Attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuedFields {
    pub value: Vec<u8>,
    pub compressed: bool,
}

/// The per-kind extension data. The discriminant doubles as [`NodeKind`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeData {
    Root {
        structural: StructuralFields,
    },
    Element {
        structural: StructuralFields,
        named: NamedFields,
        /// Insertion-ordered attribute keys, keyed by the attribute's own
        /// name hash so uniqueness checks and iteration order share one
        /// structure.
        attributes: IndexMap<NameKey, NodeKey>,
        namespaces: Vec<NodeKey>,
    },
    Text {
        structural: StructuralFields,
        valued: ValuedFields,
    },
    Attribute {
        named: NamedFields,
        valued: ValuedFields,
    },
    Namespace {
        named: NamedFields,
    },
}

/// A single node record: the shared delegate plus its kind-specific data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub delegate: NodeDelegate,
    pub data: NodeData,
}

impl Node {
    pub fn key(&self) -> NodeKey {
        self.delegate.node_key
    }

    pub fn parent_key(&self) -> NodeKey {
        self.delegate.parent_key
    }

    pub fn set_parent_key(&mut self, parent_key: NodeKey) {
        self.delegate.parent_key = parent_key;
    }

    pub fn hash(&self) -> u64 {
        self.delegate.hash
    }

    pub fn set_hash(&mut self, hash: u64) {
        self.delegate.hash = hash;
    }

    pub fn kind(&self) -> NodeKind {
        match &self.data {
            NodeData::Root { .. } => NodeKind::Root,
            NodeData::Element { .. } => NodeKind::Element,
            NodeData::Text { .. } => NodeKind::Text,
            NodeData::Attribute { .. } => NodeKind::Attribute,
            NodeData::Namespace { .. } => NodeKind::Namespace,
        }
    }

    pub fn is_structural(&self) -> bool {
        self.kind().is_structural()
    }

    pub fn structural(&self) -> Option<&StructuralFields> {
        match &self.data {
            NodeData::Root { structural } | NodeData::Text { structural, .. } => Some(structural),
            NodeData::Element { structural, .. } => Some(structural),
            _ => None,
        }
    }

    pub fn structural_mut(&mut self) -> Option<&mut StructuralFields> {
        match &mut self.data {
            NodeData::Root { structural } | NodeData::Text { structural, .. } => Some(structural),
            NodeData::Element { structural, .. } => Some(structural),
            _ => None,
        }
    }

    pub fn named(&self) -> Option<&NamedFields> {
        match &self.data {
            NodeData::Element { named, .. }
            | NodeData::Attribute { named, .. }
            | NodeData::Namespace { named } => Some(named),
            _ => None,
        }
    }

    pub fn named_mut(&mut self) -> Option<&mut NamedFields> {
        match &mut self.data {
            NodeData::Element { named, .. }
            | NodeData::Attribute { named, .. }
            | NodeData::Namespace { named } => Some(named),
            _ => None,
        }
    }

    pub fn valued(&self) -> Option<&ValuedFields> {
        match &self.data {
            NodeData::Text { valued, .. } | NodeData::Attribute { valued, .. } => Some(valued),
            _ => None,
        }
    }

    pub fn valued_mut(&mut self) -> Option<&mut ValuedFields> {
        match &mut self.data {
            NodeData::Text { valued, .. } | NodeData::Attribute { valued, .. } => Some(valued),
            _ => None,
        }
    }

    pub fn attributes(&self) -> Option<&IndexMap<NameKey, NodeKey>> {
        match &self.data {
            NodeData::Element { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    pub fn attributes_mut(&mut self) -> Option<&mut IndexMap<NameKey, NodeKey>> {
        match &mut self.data {
            NodeData::Element { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    pub fn namespaces(&self) -> Option<&Vec<NodeKey>> {
        match &self.data {
            NodeData::Element { namespaces, .. } => Some(namespaces),
            _ => None,
        }
    }

    pub fn namespaces_mut(&mut self) -> Option<&mut Vec<NodeKey>> {
        match &mut self.data {
            NodeData::Element { namespaces, .. } => Some(namespaces),
            _ => None,
        }
    }

    /// Number of direct children plus attributes plus namespaces, used by
    /// the hash engine as the fan-in for a node's recurrence.
    pub fn child_count(&self) -> u64 {
        self.structural().map(|s| s.child_count).unwrap_or(0)
    }

    pub fn descendant_count(&self) -> u64 {
        self.structural().map(|s| s.descendant_count).unwrap_or(0)
    }

    // --- constructors -----------------------------------------------------

    pub fn new_root(node_key: NodeKey) -> Node {
        Node {
            delegate: NodeDelegate {
                node_key,
                parent_key: NULL_KEY,
                hash: 0,
            },
            data: NodeData::Root {
                structural: StructuralFields::default(),
            },
        }
    }

    pub fn new_element(
        node_key: NodeKey,
        parent_key: NodeKey,
        name_key: NameKey,
        uri_key: NameKey,
    ) -> Node {
        Node {
            delegate: NodeDelegate {
                node_key,
                parent_key,
                hash: 0,
            },
            data: NodeData::Element {
                structural: StructuralFields::default(),
                named: NamedFields { name_key, uri_key },
                attributes: IndexMap::new(),
                namespaces: Vec::new(),
            },
        }
    }

    pub fn new_text(node_key: NodeKey, parent_key: NodeKey, value: Vec<u8>, compressed: bool) -> Node {
        Node {
            delegate: NodeDelegate {
                node_key,
                parent_key,
                hash: 0,
            },
            data: NodeData::Text {
                structural: StructuralFields::default(),
                valued: ValuedFields { value, compressed },
            },
        }
    }

    pub fn new_attribute(
        node_key: NodeKey,
        parent_key: NodeKey,
        name_key: NameKey,
        uri_key: NameKey,
        value: Vec<u8>,
        compressed: bool,
    ) -> Node {
        Node {
            delegate: NodeDelegate {
                node_key,
                parent_key,
                hash: 0,
            },
            data: NodeData::Attribute {
                named: NamedFields { name_key, uri_key },
                valued: ValuedFields { value, compressed },
            },
        }
    }

    pub fn new_namespace(
        node_key: NodeKey,
        parent_key: NodeKey,
        name_key: NameKey,
        uri_key: NameKey,
    ) -> Node {
        Node {
            delegate: NodeDelegate {
                node_key,
                parent_key,
                hash: 0,
            },
            data: NodeData::Namespace {
                named: NamedFields { name_key, uri_key },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_capability_sets_match_spec() {
        assert!(NodeKind::Root.is_structural());
        assert!(!NodeKind::Root.is_named());
        assert!(Node::new_element(1, 0, 1, NULL_NAME_KEY).is_structural());
        assert!(Node::new_attribute(2, 1, 1, NULL_NAME_KEY, vec![], false)
            .kind()
            .is_valued());
        assert!(!Node::new_namespace(3, 1, 1, NULL_NAME_KEY).is_structural());
    }

    #[test]
    fn structural_defaults_use_null_key_not_zero() {
        let root = Node::new_root(ROOT_KEY);
        assert_eq!(root.structural().unwrap().first_child_key, NULL_KEY);
    }
}
