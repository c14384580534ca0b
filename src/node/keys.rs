//! Key types shared by every node kind.

use serde::{Deserialize, Serialize};

/// A node's identity. Allocated monotonically by the page layer; stable for
/// the node's lifetime.
pub type NodeKey = i64;

/// Sentinel meaning "absent" wherever a [`NodeKey`] link field is read.
pub const NULL_KEY: NodeKey = -1;

/// The document root always lives at this key.
pub const ROOT_KEY: NodeKey = 0;

/// A 32-bit hash of a qualified-name string, as stored in the per-revision
/// name dictionary.
pub type NameKey = u32;

/// Sentinel meaning "no URI" for an unprefixed name.
pub const NULL_NAME_KEY: NameKey = u32::MAX;

/// Returns whether a key is a real node reference as opposed to [`NULL_KEY`].
pub fn is_null(key: NodeKey) -> bool {
    key == NULL_KEY
}

/// Which name dictionary an entry belongs to, passed through to
/// [`crate::page::PageTransaction::create_name_key`] /
/// [`crate::page::PageTransaction::remove_name`] so the page layer can keep
/// separate refcounted tables if it wants to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameDictKind {
    /// An element or attribute local name (with optional prefix).
    Name,
    /// A namespace URI.
    Uri,
}
