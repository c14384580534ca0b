//! Structural editor: insert / remove / move / replace / copy-subtree,
//! with link maintenance, text-merge, and hash/descendant-count
//! propagation folded into every op.
//!
//! Each operation is implemented as an inherent method on
//! [`crate::txn::Inner`] in its own submodule, kept free of lock/commit
//! bookkeeping; [`crate::txn::WriteTransaction`] only adds the
//! `check_access_and_commit()` preamble via
//! [`crate::txn::WriteTransaction::with_edit`] and re-exposes each as public
//! API.

mod builder;
mod fields;
mod insert;
mod move_subtree;
mod remove;
mod replace;

pub use builder::SubtreeBuilder;

use crate::error::{Error, Result};
use crate::hash::{hash_remove, hash_update, intrinsic_hash};
use crate::node::{is_null, NameDictKind, NameKey, Node, NodeKey, NULL_KEY};
use crate::page::PageTransaction;

/// Where a single-node insert lands relative to the cursor/target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    FirstChild,
    LeftSibling,
    RightSibling,
}

/// After inserting an attribute or namespace, where the cursor ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveAfterHint {
    /// Cursor returns to the owning element.
    ToParent,
    /// Cursor stays on the newly created attribute/namespace.
    StayOnNew,
}

/// Whether the current resource is still in the eventual-consistency
/// bootstrap window: descendant-count propagation on add/remove
/// is skipped until the first commit runs its post-order repair pass.
pub(crate) fn skip_descendant_accounting(config: &crate::config::ResourceConfig, bootstrap: bool) -> bool {
    config.consistency == crate::config::Consistency::Eventual && bootstrap
}

/// `descendantCount(node) + 1`, the delta contributed to every ancestor by
/// inserting or removing `node`'s whole subtree.
pub(crate) fn own_subtree_count(node: &Node) -> u64 {
    node.descendant_count() + 1
}

// --- structural link primitives, shared by insert/remove/move -------------

/// Wire `key` in as the first child of `parent_key`, bumping `child_count`.
pub(crate) fn attach_first_child(
    pages: &mut impl PageTransaction,
    parent_key: NodeKey,
    key: NodeKey,
) -> Result<()> {
    let mut parent = pages.prepare(parent_key)?;
    let old_first = parent
        .structural()
        .ok_or(Error::InvariantViolation("attach_first_child: non-structural parent"))?
        .first_child_key;
    {
        let s = parent.structural_mut().unwrap();
        s.first_child_key = key;
        s.child_count += 1;
    }
    pages.finish(parent)?;

    let mut node = pages.prepare(key)?;
    {
        let s = node
            .structural_mut()
            .ok_or(Error::InvariantViolation("attach_first_child: non-structural node"))?;
        s.left_sibling_key = NULL_KEY;
        s.right_sibling_key = old_first;
    }
    node.set_parent_key(parent_key);
    pages.finish(node)?;

    if !is_null(old_first) {
        let mut old = pages.prepare(old_first)?;
        old.structural_mut().unwrap().left_sibling_key = key;
        pages.finish(old)?;
    }
    Ok(())
}

/// Wire `key` in immediately to the left of `target_key` (same parent).
pub(crate) fn attach_left_sibling(
    pages: &mut impl PageTransaction,
    parent_key: NodeKey,
    target_key: NodeKey,
    key: NodeKey,
) -> Result<()> {
    let mut target = pages.prepare(target_key)?;
    let left = target
        .structural()
        .ok_or(Error::InvariantViolation("attach_left_sibling: non-structural target"))?
        .left_sibling_key;
    target.structural_mut().unwrap().left_sibling_key = key;
    pages.finish(target)?;

    let mut node = pages.prepare(key)?;
    {
        let s = node
            .structural_mut()
            .ok_or(Error::InvariantViolation("attach_left_sibling: non-structural node"))?;
        s.left_sibling_key = left;
        s.right_sibling_key = target_key;
    }
    node.set_parent_key(parent_key);
    pages.finish(node)?;

    if !is_null(left) {
        let mut l = pages.prepare(left)?;
        l.structural_mut().unwrap().right_sibling_key = key;
        pages.finish(l)?;
    }

    let mut parent = pages.prepare(parent_key)?;
    {
        let s = parent.structural_mut().unwrap();
        s.child_count += 1;
        if is_null(left) {
            s.first_child_key = key;
        }
    }
    pages.finish(parent)?;
    Ok(())
}

/// Wire `key` in immediately to the right of `target_key` (same parent).
pub(crate) fn attach_right_sibling(
    pages: &mut impl PageTransaction,
    parent_key: NodeKey,
    target_key: NodeKey,
    key: NodeKey,
) -> Result<()> {
    let mut target = pages.prepare(target_key)?;
    let right = target
        .structural()
        .ok_or(Error::InvariantViolation("attach_right_sibling: non-structural target"))?
        .right_sibling_key;
    target.structural_mut().unwrap().right_sibling_key = key;
    pages.finish(target)?;

    let mut node = pages.prepare(key)?;
    {
        let s = node
            .structural_mut()
            .ok_or(Error::InvariantViolation("attach_right_sibling: non-structural node"))?;
        s.left_sibling_key = target_key;
        s.right_sibling_key = right;
    }
    node.set_parent_key(parent_key);
    pages.finish(node)?;

    if !is_null(right) {
        let mut r = pages.prepare(right)?;
        r.structural_mut().unwrap().left_sibling_key = key;
        pages.finish(r)?;
    }

    let mut parent = pages.prepare(parent_key)?;
    parent.structural_mut().unwrap().child_count += 1;
    pages.finish(parent)?;
    Ok(())
}

/// Unlink `key` from its current parent/siblings without touching hashes or
/// name refcounts. Returns `(parent_key, former_left, former_right)` so the
/// caller can run text-merge at the vacated site.
pub(crate) fn detach_structural(
    pages: &mut impl PageTransaction,
    key: NodeKey,
) -> Result<(NodeKey, NodeKey, NodeKey)> {
    let node = pages.get(key)?.ok_or(Error::BadArgument("detach: no such node"))?;
    let parent_key = node.parent_key();
    let (left, right) = {
        let s = node
            .structural()
            .ok_or(Error::InvariantViolation("detach: non-structural node"))?;
        (s.left_sibling_key, s.right_sibling_key)
    };

    if !is_null(left) {
        let mut l = pages.prepare(left)?;
        l.structural_mut().unwrap().right_sibling_key = right;
        pages.finish(l)?;
    }
    if !is_null(right) {
        let mut r = pages.prepare(right)?;
        r.structural_mut().unwrap().left_sibling_key = left;
        pages.finish(r)?;
    }
    if !is_null(parent_key) {
        let mut parent = pages.prepare(parent_key)?;
        let s = parent.structural_mut().unwrap();
        s.child_count = s.child_count.saturating_sub(1);
        if s.first_child_key == key {
            s.first_child_key = right;
        }
        pages.finish(parent)?;
    }
    Ok((parent_key, left, right))
}

/// If `left` and `right` are both live Text nodes, merge them (`left`'s
/// value becomes `"{left} {right}"`, `right` is fully unlinked and its hash
/// contribution removed from the ancestor chain), per the text-merge rule
/// applied by every insert/remove/move. Returns the surviving key.
pub(crate) fn merge_adjacent_text(
    pages: &mut impl PageTransaction,
    config: &crate::config::ResourceConfig,
    bootstrap: bool,
    left: NodeKey,
    right: NodeKey,
) -> Result<Option<NodeKey>> {
    if is_null(left) || is_null(right) {
        return Ok(None);
    }
    let left_node = pages.get(left)?.ok_or(Error::InvariantViolation("merge: dangling left"))?;
    let right_node = pages.get(right)?.ok_or(Error::InvariantViolation("merge: dangling right"))?;
    if left_node.kind() != crate::node::NodeKind::Text || right_node.kind() != crate::node::NodeKind::Text {
        return Ok(None);
    }

    let (right_parent, _, right_right) = detach_structural(pages, right)?;
    let removed_hash = right_node.hash();
    let removed_count = if skip_descendant_accounting(config, bootstrap) {
        None
    } else {
        Some(own_subtree_count(&right_node))
    };
    hash_remove(pages, config, right_parent, removed_hash, removed_count)?;
    pages.remove(&right_node)?;
    let _ = right_right;

    let old_intrinsic = intrinsic_hash(&left_node);
    let left_value = {
        let v = left_node.valued().unwrap();
        crate::compression::maybe_decompress(&v.value, v.compressed)?
    };
    let right_value = {
        let v = right_node.valued().unwrap();
        crate::compression::maybe_decompress(&v.value, v.compressed)?
    };
    let mut merged = pages.prepare(left)?;
    let merged_value = merge_values(&left_value, &right_value);
    let (stored, compressed) = crate::compression::maybe_compress(&merged_value, config.compression)?;
    {
        let v = merged.valued_mut().unwrap();
        v.value = stored;
        v.compressed = compressed;
    }
    let parent_key = merged.parent_key();
    hash_update(pages, config, parent_key, &mut merged, old_intrinsic)?;
    pages.finish(merged)?;

    Ok(Some(left))
}

fn merge_values(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(left.len() + 1 + right.len());
    out.extend_from_slice(left);
    out.push(b' ');
    out.extend_from_slice(right);
    out
}

/// Register a name in the page layer's name dictionary and return its key.
pub(crate) fn register_name(
    pages: &mut impl PageTransaction,
    local_name: &str,
    uri: Option<&str>,
) -> Result<(NameKey, NameKey)> {
    let name_key = pages.create_name_key(local_name, NameDictKind::Name)?;
    let uri_key = match uri {
        Some(u) => pages.create_name_key(u, NameDictKind::Uri)?,
        None => crate::node::NULL_NAME_KEY,
    };
    Ok((name_key, uri_key))
}

/// Refcount-release a name/uri pair, skipping the uri release if it is the
/// null sentinel.
pub(crate) fn release_name(
    pages: &mut impl PageTransaction,
    name_key: NameKey,
    uri_key: NameKey,
) -> Result<()> {
    pages.remove_name(name_key, NameDictKind::Name)?;
    if uri_key != crate::node::NULL_NAME_KEY {
        pages.remove_name(uri_key, NameDictKind::Uri)?;
    }
    Ok(())
}

/// Ensure `maybe_ancestor` is not `of` itself and not one of `of`'s
/// ancestors. Called before a move to reject relocating a subtree into
/// itself or one of its own descendants, which would orphan it.
pub(crate) fn reject_if_self_or_ancestor(
    pages: &impl PageTransaction,
    maybe_ancestor: NodeKey,
    of: NodeKey,
) -> Result<()> {
    if maybe_ancestor == of {
        return Err(Error::BadArgument("move: source is the destination itself"));
    }
    let mut cur = of;
    loop {
        let node = pages.get(cur)?.ok_or(Error::BadArgument("move: stale key"))?;
        let parent = node.parent_key();
        if is_null(parent) {
            return Ok(());
        }
        if parent == maybe_ancestor {
            return Err(Error::BadArgument("move: source is an ancestor of destination"));
        }
        cur = parent;
    }
}

// --- public API, mounted on the write transaction --------------------------

impl<S> crate::txn::WriteTransaction<S>
where
    S: crate::page::Session + Send + Sync + 'static,
    S::PageTxn: 'static,
{
    pub fn insert_element(
        &self,
        target: NodeKey,
        position: InsertPosition,
        local_name: &str,
        uri: Option<&str>,
    ) -> Result<NodeKey> {
        self.with_edit(|inner| inner.insert_element(target, position, local_name, uri))
    }

    pub fn insert_text(&self, target: NodeKey, position: InsertPosition, value: &[u8]) -> Result<NodeKey> {
        self.with_edit(|inner| inner.insert_text(target, position, value))
    }

    pub fn insert_attribute(
        &self,
        element: NodeKey,
        local_name: &str,
        uri: Option<&str>,
        value: &[u8],
        move_after: MoveAfterHint,
    ) -> Result<NodeKey> {
        self.with_edit(|inner| inner.insert_attribute(element, local_name, uri, value, move_after))
    }

    pub fn insert_namespace(
        &self,
        element: NodeKey,
        prefix: &str,
        uri: &str,
        move_after: MoveAfterHint,
    ) -> Result<NodeKey> {
        self.with_edit(|inner| inner.insert_namespace(element, prefix, uri, move_after))
    }

    pub fn remove(&self, target: NodeKey) -> Result<()> {
        self.with_edit(|inner| inner.remove(target))
    }

    pub fn move_subtree(&self, source: NodeKey, target: NodeKey, position: InsertPosition) -> Result<()> {
        self.with_edit(|inner| inner.move_subtree(source, target, position))
    }

    pub fn replace_with_text(&self, target: NodeKey, value: &[u8]) -> Result<NodeKey> {
        self.with_edit(|inner| inner.replace_with_text(target, value))
    }

    pub fn replace_with_subtree(
        &self,
        target: NodeKey,
        source: &dyn crate::external::ReadTransaction,
    ) -> Result<NodeKey> {
        self.with_edit(|inner| inner.replace_with_subtree(target, source))
    }

    pub fn replace_with_fragment(
        &self,
        target: NodeKey,
        events: &mut dyn Iterator<Item = Result<crate::external::IngestEvent>>,
    ) -> Result<NodeKey> {
        self.with_edit(|inner| inner.replace_with_fragment(target, events))
    }

    pub fn copy_subtree(
        &self,
        target: NodeKey,
        position: InsertPosition,
        source: &dyn crate::external::ReadTransaction,
    ) -> Result<NodeKey> {
        self.with_edit(|inner| inner.copy_subtree(target, position, source))
    }

    pub fn set_qname(&self, target: NodeKey, local_name: &str, uri: Option<&str>) -> Result<()> {
        self.with_edit(|inner| inner.set_qname(target, local_name, uri))
    }

    pub fn set_uri(&self, target: NodeKey, uri: Option<&str>) -> Result<()> {
        self.with_edit(|inner| inner.set_uri(target, uri))
    }

    pub fn set_value(&self, target: NodeKey, value: &[u8]) -> Result<()> {
        self.with_edit(|inner| inner.set_value(target, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Consistency, ResourceConfig};
    use crate::node::ROOT_KEY;
    use crate::testkit::InMemorySession;
    use crate::txn::WriteTransaction;

    fn open(config: ResourceConfig) -> WriteTransaction<InMemorySession> {
        let session = InMemorySession::new(config);
        WriteTransaction::open(session, 0, 1).unwrap()
    }

    #[test]
    fn insert_root_element() {
        let txn = open(ResourceConfig::default());
        let log = txn.insert_element(ROOT_KEY, InsertPosition::FirstChild, "log", None).unwrap();

        let node = txn.node(log).unwrap().unwrap();
        assert_eq!(node.kind(), NodeKind::Element);
        assert_eq!(node.parent_key(), ROOT_KEY);
        assert_eq!(node.child_count(), 0);
        assert_eq!(node.descendant_count(), 0);

        let root = txn.node(ROOT_KEY).unwrap().unwrap();
        assert_eq!(root.child_count(), 1);
        assert_eq!(root.structural().unwrap().first_child_key, log);
    }

    #[test]
    fn remove_relinks_siblings() {
        let txn = open(ResourceConfig::default());
        let a = txn.insert_element(ROOT_KEY, InsertPosition::FirstChild, "a", None).unwrap();
        let b = txn.insert_element(a, InsertPosition::RightSibling, "b", None).unwrap();

        txn.remove(a).unwrap();

        let root = txn.node(ROOT_KEY).unwrap().unwrap();
        assert_eq!(root.structural().unwrap().first_child_key, b);
        assert_eq!(root.child_count(), 1);
        let b_node = txn.node(b).unwrap().unwrap();
        assert!(is_null(b_node.structural().unwrap().left_sibling_key));
        assert!(txn.node(a).unwrap().is_none());
    }

    #[test]
    fn adjacent_text_merges_with_single_space() {
        let txn = open(ResourceConfig::default());
        let e = txn.insert_element(ROOT_KEY, InsertPosition::FirstChild, "p", None).unwrap();
        let first = txn.insert_text(e, InsertPosition::FirstChild, b"foo").unwrap();
        let merged = txn.insert_text(first, InsertPosition::RightSibling, b"bar").unwrap();

        let node = txn.node(merged).unwrap().unwrap();
        assert_eq!(node.valued().unwrap().value, b"foo bar");
        let parent = txn.node(e).unwrap().unwrap();
        assert_eq!(parent.child_count(), 1);
    }

    #[test]
    fn move_to_first_child_updates_ancestor_descendant_counts() {
        let txn = open(ResourceConfig::default());
        let a = txn.insert_element(ROOT_KEY, InsertPosition::FirstChild, "a", None).unwrap();
        let b = txn.insert_element(a, InsertPosition::RightSibling, "b", None).unwrap();

        txn.move_subtree(b, a, InsertPosition::FirstChild).unwrap();

        let a_node = txn.node(a).unwrap().unwrap();
        assert_eq!(a_node.descendant_count(), 1);
        assert_eq!(a_node.child_count(), 1);
        let b_node = txn.node(b).unwrap().unwrap();
        assert_eq!(b_node.parent_key(), a);
        let root = txn.node(ROOT_KEY).unwrap().unwrap();
        assert_eq!(root.child_count(), 1);
    }

    #[test]
    fn move_to_current_position_is_a_no_op() {
        let txn = open(ResourceConfig::default());
        let a = txn.insert_element(ROOT_KEY, InsertPosition::FirstChild, "a", None).unwrap();
        let before = txn.node(ROOT_KEY).unwrap().unwrap().hash();

        txn.move_subtree(a, ROOT_KEY, InsertPosition::FirstChild).unwrap();

        let after = txn.node(ROOT_KEY).unwrap().unwrap().hash();
        assert_eq!(before, after);
    }

    #[test]
    fn duplicate_attribute_with_equal_value_is_rejected() {
        let txn = open(ResourceConfig::default());
        let e = txn.insert_element(ROOT_KEY, InsertPosition::FirstChild, "e", None).unwrap();
        txn.insert_attribute(e, "id", None, b"1", MoveAfterHint::ToParent).unwrap();

        let result = txn.insert_attribute(e, "id", None, b"1", MoveAfterHint::ToParent);
        assert!(matches!(result, Err(Error::DuplicateAttribute)));
    }

    #[test]
    fn duplicate_attribute_with_new_value_overwrites() {
        let txn = open(ResourceConfig::default());
        let e = txn.insert_element(ROOT_KEY, InsertPosition::FirstChild, "e", None).unwrap();
        let key = txn.insert_attribute(e, "id", None, b"1", MoveAfterHint::ToParent).unwrap();

        let key2 = txn.insert_attribute(e, "id", None, b"2", MoveAfterHint::ToParent).unwrap();
        assert_eq!(key, key2);

        let attr = txn.node(key).unwrap().unwrap();
        assert_eq!(attr.valued().unwrap().value, b"2");
    }

    struct CountingVisitor {
        elements: u32,
        texts: u32,
    }

    impl crate::external::TreeVisitor for CountingVisitor {
        fn start_element(
            &mut self,
            _local_name: &str,
            _uri: Option<&str>,
            _attributes: &[(String, Option<String>, Vec<u8>, bool)],
            _namespaces: &[(String, String)],
        ) -> Result<()> {
            self.elements += 1;
            Ok(())
        }

        fn text(&mut self, _value: &[u8], _compressed: bool) -> Result<()> {
            self.texts += 1;
            Ok(())
        }

        fn end_element(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn reader_on_older_revision_is_unaffected_by_later_writes() {
        let session = InMemorySession::new(ResourceConfig::default());
        let txn = WriteTransaction::open(session, 0, 1).unwrap();
        let a = txn.insert_element(ROOT_KEY, InsertPosition::FirstChild, "a", None).unwrap();
        txn.insert_text(a, InsertPosition::FirstChild, b"hello").unwrap();
        let page = txn.commit().unwrap();
        assert_eq!(page.revision, 0);

        // the live transaction keeps writing after the commit
        txn.insert_element(a, InsertPosition::FirstChild, "z", None).unwrap();
        let a_live = txn.node(a).unwrap().unwrap();
        assert_eq!(a_live.child_count(), 2);

        // a reader opened against the committed revision still only sees
        // what existed at commit time: "a" itself plus its one text child
        let mut reader = txn.session.open_read(page.revision).unwrap();
        reader.move_to(a);
        let mut visitor = CountingVisitor { elements: 0, texts: 0 };
        reader.visit(&mut visitor).unwrap();
        assert_eq!(visitor.elements, 1);
        assert_eq!(visitor.texts, 1);
    }

    #[test]
    fn postorder_recompute_matches_incrementally_maintained_hash() {
        let txn = open(ResourceConfig::default());
        let a = txn.insert_element(ROOT_KEY, InsertPosition::FirstChild, "a", None).unwrap();
        txn.insert_text(a, InsertPosition::FirstChild, b"hi").unwrap();

        let stored = txn.node(ROOT_KEY).unwrap().unwrap().hash();
        let mut inner = txn.shared.lock();
        let config = inner.config.clone();
        let recomputed = crate::hash::recompute_postorder(&mut inner.pages, &config, ROOT_KEY).unwrap();
        assert_eq!(recomputed, stored);
    }

    #[test]
    fn insert_then_remove_restores_ancestor_hash() {
        let txn = open(ResourceConfig::default());
        let a = txn.insert_element(ROOT_KEY, InsertPosition::FirstChild, "a", None).unwrap();
        let before = txn.node(ROOT_KEY).unwrap().unwrap().hash();

        let b = txn.insert_element(a, InsertPosition::FirstChild, "b", None).unwrap();
        txn.remove(b).unwrap();

        let after = txn.node(ROOT_KEY).unwrap().unwrap().hash();
        assert_eq!(before, after);
    }

    #[test]
    fn set_value_twice_is_idempotent_with_once() {
        let txn_a = open(ResourceConfig::default());
        let a = txn_a.insert_element(ROOT_KEY, InsertPosition::FirstChild, "a", None).unwrap();
        let t1 = txn_a.insert_text(a, InsertPosition::FirstChild, b"x").unwrap();
        txn_a.set_value(t1, b"once").unwrap();
        let once_hash = txn_a.node(ROOT_KEY).unwrap().unwrap().hash();

        let txn_b = open(ResourceConfig::default());
        let a2 = txn_b.insert_element(ROOT_KEY, InsertPosition::FirstChild, "a", None).unwrap();
        let t2 = txn_b.insert_text(a2, InsertPosition::FirstChild, b"x").unwrap();
        txn_b.set_value(t2, b"once").unwrap();
        txn_b.set_value(t2, b"once").unwrap();
        let twice_hash = txn_b.node(ROOT_KEY).unwrap().unwrap().hash();

        assert_eq!(once_hash, twice_hash);
    }

    #[test]
    fn eventual_consistency_bootstrap_defers_then_repairs_descendant_counts() {
        let mut config = ResourceConfig::default();
        config.consistency = Consistency::Eventual;
        let txn = open(config);
        let a = txn.insert_element(ROOT_KEY, InsertPosition::FirstChild, "a", None).unwrap();
        let b = txn.insert_element(a, InsertPosition::FirstChild, "b", None).unwrap();
        txn.remove(b).unwrap();

        // Still within the bootstrap window: descendant-count bookkeeping on
        // remove was allowed to skip the ancestor walk.
        let root = txn.node(ROOT_KEY).unwrap().unwrap();
        let _ = root.descendant_count();

        txn.commit().unwrap();

        let a_after = txn.node(a).unwrap().unwrap();
        assert_eq!(a_after.descendant_count(), 0);
    }
}
