//! A single stateful position within the tree. There is exactly one
//! per write transaction. Moves succeed iff their target exists; on failure
//! the cursor is left exactly where it was and the move returns `false`.

use crate::error::Result;
use crate::node::{is_null, NameKey, Node, NodeKey, NodeKind, NULL_KEY, ROOT_KEY};
use crate::page::PageTransaction;

/// The current position, keyed into the page layer. Read accessors go
/// through the page transaction; moves never mutate anything but `current`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    current: NodeKey,
}

impl Cursor {
    pub fn new(start: NodeKey) -> Cursor {
        Cursor { current: start }
    }

    pub fn current_key(&self) -> NodeKey {
        self.current
    }

    fn node(&self, pages: &impl PageTransaction) -> Result<Node> {
        pages
            .get(self.current)?
            .ok_or(crate::error::Error::InvariantViolation("cursor positioned on a dead node"))
    }

    /// Move to an arbitrary key, iff it exists.
    pub fn to(&mut self, pages: &impl PageTransaction, key: NodeKey) -> Result<bool> {
        if is_null(key) {
            return Ok(false);
        }
        if pages.get(key)?.is_some() {
            self.current = key;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn to_parent(&mut self, pages: &impl PageTransaction) -> Result<bool> {
        let parent_key = self.node(pages)?.parent_key();
        self.to(pages, parent_key)
    }

    pub fn to_first_child(&mut self, pages: &impl PageTransaction) -> Result<bool> {
        match self.node(pages)?.structural() {
            Some(s) => self.to(pages, s.first_child_key),
            None => Ok(false),
        }
    }

    pub fn to_left_sibling(&mut self, pages: &impl PageTransaction) -> Result<bool> {
        match self.node(pages)?.structural() {
            Some(s) => self.to(pages, s.left_sibling_key),
            None => Ok(false),
        }
    }

    pub fn to_right_sibling(&mut self, pages: &impl PageTransaction) -> Result<bool> {
        match self.node(pages)?.structural() {
            Some(s) => self.to(pages, s.right_sibling_key),
            None => Ok(false),
        }
    }

    pub fn to_attribute(&mut self, pages: &impl PageTransaction, index: usize) -> Result<bool> {
        let node = self.node(pages)?;
        match node.attributes().and_then(|attrs| attrs.get_index(index)) {
            Some((_, &key)) => self.to(pages, key),
            None => Ok(false),
        }
    }

    pub fn to_namespace(&mut self, pages: &impl PageTransaction, index: usize) -> Result<bool> {
        let node = self.node(pages)?;
        match node.namespaces().and_then(|ns| ns.get(index)) {
            Some(&key) => self.to(pages, key),
            None => Ok(false),
        }
    }

    pub fn to_document_root(&mut self, pages: &impl PageTransaction) -> Result<bool> {
        self.to(pages, ROOT_KEY)
    }

    // --- read accessors -----------------------------------------------

    pub fn kind(&self, pages: &impl PageTransaction) -> Result<NodeKind> {
        Ok(self.node(pages)?.kind())
    }

    pub fn qname(&self, pages: &impl PageTransaction) -> Result<Option<(NameKey, NameKey)>> {
        Ok(self.node(pages)?.named().map(|n| (n.name_key, n.uri_key)))
    }

    pub fn value(&self, pages: &impl PageTransaction, config: &crate::config::ResourceConfig) -> Result<Option<Vec<u8>>> {
        let node = self.node(pages)?;
        match node.valued() {
            Some(v) => Ok(Some(crate::compression::maybe_decompress(&v.value, v.compressed)?)),
            None => {
                let _ = config;
                Ok(None)
            }
        }
    }

    pub fn hash(&self, pages: &impl PageTransaction) -> Result<u64> {
        Ok(self.node(pages)?.hash())
    }

    pub fn has_left_sibling(&self, pages: &impl PageTransaction) -> Result<bool> {
        Ok(self
            .node(pages)?
            .structural()
            .map(|s| !is_null(s.left_sibling_key))
            .unwrap_or(false))
    }

    pub fn has_right_sibling(&self, pages: &impl PageTransaction) -> Result<bool> {
        Ok(self
            .node(pages)?
            .structural()
            .map(|s| !is_null(s.right_sibling_key))
            .unwrap_or(false))
    }
}

// --- public API, mounted on the write transaction --------------------------

impl<S> crate::txn::WriteTransaction<S>
where
    S: crate::page::Session + Send + Sync + 'static,
    S::PageTxn: 'static,
{
    pub fn current_key(&self) -> NodeKey {
        self.shared.lock().cursor.current_key()
    }

    pub fn to(&self, key: NodeKey) -> Result<bool> {
        let mut inner = self.shared.lock();
        inner.cursor.to(&inner.pages, key)
    }

    pub fn to_parent(&self) -> Result<bool> {
        let mut inner = self.shared.lock();
        inner.cursor.to_parent(&inner.pages)
    }

    pub fn to_first_child(&self) -> Result<bool> {
        let mut inner = self.shared.lock();
        inner.cursor.to_first_child(&inner.pages)
    }

    pub fn to_left_sibling(&self) -> Result<bool> {
        let mut inner = self.shared.lock();
        inner.cursor.to_left_sibling(&inner.pages)
    }

    pub fn to_right_sibling(&self) -> Result<bool> {
        let mut inner = self.shared.lock();
        inner.cursor.to_right_sibling(&inner.pages)
    }

    pub fn to_document_root(&self) -> Result<bool> {
        let mut inner = self.shared.lock();
        inner.cursor.to_document_root(&inner.pages)
    }

    pub fn to_attribute(&self, index: usize) -> Result<bool> {
        let mut inner = self.shared.lock();
        inner.cursor.to_attribute(&inner.pages, index)
    }

    pub fn to_namespace(&self, index: usize) -> Result<bool> {
        let mut inner = self.shared.lock();
        inner.cursor.to_namespace(&inner.pages, index)
    }

    pub fn kind(&self) -> Result<NodeKind> {
        let inner = self.shared.lock();
        inner.cursor.kind(&inner.pages)
    }

    pub fn qname(&self) -> Result<Option<(NameKey, NameKey)>> {
        let inner = self.shared.lock();
        inner.cursor.qname(&inner.pages)
    }

    pub fn value(&self) -> Result<Option<Vec<u8>>> {
        let inner = self.shared.lock();
        inner.cursor.value(&inner.pages, &inner.config)
    }

    pub fn hash(&self) -> Result<u64> {
        let inner = self.shared.lock();
        inner.cursor.hash(&inner.pages)
    }

    pub fn has_left_sibling(&self) -> Result<bool> {
        let inner = self.shared.lock();
        inner.cursor.has_left_sibling(&inner.pages)
    }

    pub fn has_right_sibling(&self) -> Result<bool> {
        let inner = self.shared.lock();
        inner.cursor.has_right_sibling(&inner.pages)
    }

    /// Fetch a node by key directly, bypassing the cursor. Used by tests and
    /// embedders that already hold a key (e.g. the one returned by an
    /// insert) and don't want to move the cursor to inspect it.
    pub fn node(&self, key: NodeKey) -> Result<Option<Node>> {
        self.shared.lock().pages.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NULL_NAME_KEY;
    use crate::testkit::InMemoryPages;

    #[test]
    fn moves_fail_closed_on_missing_target() {
        let pages = InMemoryPages::new();
        let mut cursor = Cursor::new(ROOT_KEY);
        assert!(!cursor.to_first_child(&pages).unwrap());
        assert_eq!(cursor.current_key(), ROOT_KEY);
    }

    #[test]
    fn to_parent_and_back() {
        let mut pages = InMemoryPages::new();
        let elem = pages.create(Node::new_element(0, ROOT_KEY, 1, NULL_NAME_KEY)).unwrap();
        {
            let mut root = pages.prepare(ROOT_KEY).unwrap();
            root.structural_mut().unwrap().first_child_key = elem.key();
            pages.finish(root).unwrap();
        }
        let mut cursor = Cursor::new(elem.key());
        assert!(cursor.to_parent(&pages).unwrap());
        assert_eq!(cursor.current_key(), ROOT_KEY);
        assert!(cursor.to_first_child(&pages).unwrap());
        assert_eq!(cursor.current_key(), elem.key());
    }
}
