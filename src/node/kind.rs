//! Kind discriminant and the capability predicates derived from it.

use serde::{Deserialize, Serialize};

/// The five node kinds this tree knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Root,
    Element,
    Text,
    Attribute,
    Namespace,
}

impl NodeKind {
    /// Root, Element, Text: carry child/sibling links and counts.
    pub fn is_structural(self) -> bool {
        matches!(self, NodeKind::Root | NodeKind::Element | NodeKind::Text)
    }

    /// Element, Attribute, Namespace: carry name/uri dictionary references.
    pub fn is_named(self) -> bool {
        matches!(
            self,
            NodeKind::Element | NodeKind::Attribute | NodeKind::Namespace
        )
    }

    /// Text, Attribute: carry an opaque byte value.
    pub fn is_valued(self) -> bool {
        matches!(self, NodeKind::Text | NodeKind::Attribute)
    }
}
