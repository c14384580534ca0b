//! Maintains each node's subtree hash under the three strategies selected by
//! [`HashKind`](crate::config::HashKind): `None` (skip), `Rolling`
//! (incremental, ancestor-chain updates), and `Postorder` (recompute from
//! scratch).
//!
//! The repeated "walk to parent, prepare, mutate, finish" shape is factored
//! into [`fold_ancestor_chain`] so the add/remove/update entry points stay
//! free of cursor-state fiddling.

use twox_hash::XxHash64;
use std::hash::Hasher;

use crate::config::{HashKind, ResourceConfig};
use crate::node::{is_null, Node, NodeKey, NULL_KEY};
use crate::page::PageTransaction;
use crate::error::Result;

/// Prime multiplier folding each child/attribute/namespace's hash into its
/// parent's subtree hash.
pub const HASH_PRIME: u64 = 77081;

/// `h(n)`: a 64-bit fold of a node's intrinsic, non-link fields (kind, name
/// key, uri key, value). Link fields never participate.
pub fn intrinsic_hash(node: &Node) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write_u8(match node.kind() {
        crate::node::NodeKind::Root => 0,
        crate::node::NodeKind::Element => 1,
        crate::node::NodeKind::Text => 2,
        crate::node::NodeKind::Attribute => 3,
        crate::node::NodeKind::Namespace => 4,
    });
    if let Some(named) = node.named() {
        hasher.write_u32(named.name_key);
        hasher.write_u32(named.uri_key);
    }
    if let Some(valued) = node.valued() {
        hasher.write(&valued.value);
    }
    hasher.finish()
}

/// Walk from `parent_key` up to the document root, folding `contribution`
/// into each ancestor's stored hash via `combine`, and threading the
/// ancestor's own (pre-update) hash up as the next level's input via
/// `next_contribution`. Used by add/remove/update, which only differ in
/// how `combine`/`next_contribution` treat the running value.
fn fold_ancestor_chain<P, F>(
    pages: &mut P,
    parent_key: NodeKey,
    mut contribution: u64,
    mut combine: F,
) -> Result<()>
where
    P: PageTransaction,
    F: FnMut(u64 /* ancestor's stored hash */, u64 /* contribution */) -> u64,
{
    let mut current = parent_key;
    while !is_null(current) {
        let mut ancestor = pages.prepare(current)?;
        let old_hash = ancestor.hash();
        let new_hash = combine(old_hash, contribution);
        ancestor.set_hash(new_hash);
        let next = ancestor.parent_key();
        pages.finish(ancestor)?;
        contribution = new_hash;
        current = next;
    }
    Ok(())
}

/// Walk from `parent_key` up to the root, adjusting `descendant_count` by
/// `delta` (positive for insert, negated by the caller for remove).
fn fold_descendant_count(pages: &mut impl PageTransaction, parent_key: NodeKey, delta: i64) -> Result<()> {
    let mut current = parent_key;
    while !is_null(current) {
        let mut ancestor = pages.prepare(current)?;
        if let Some(structural) = ancestor.structural_mut() {
            structural.descendant_count = (structural.descendant_count as i64 + delta).max(0) as u64;
        }
        let next = ancestor.parent_key();
        pages.finish(ancestor)?;
        current = next;
    }
    Ok(())
}

/// Hash maintenance for inserting a freshly created node `start` (with no
/// children of its own yet) under `parent_key`.
///
/// `added_descendants` is `descendantCount(start) + 1`; pass `None` to skip
/// the descendant-count walk (the eventual-consistency bootstrap carve-out,
/// repaired later by the commit-time post-order pass).
pub fn hash_add(
    pages: &mut impl PageTransaction,
    config: &ResourceConfig,
    parent_key: NodeKey,
    start: &mut Node,
    added_descendants: Option<u64>,
) -> Result<()> {
    if let Some(delta) = added_descendants {
        fold_descendant_count(pages, parent_key, delta as i64)?;
    }
    if config.hash_kind == HashKind::None {
        return Ok(());
    }
    let h_s = intrinsic_hash(start);
    start.set_hash(h_s);
    fold_ancestor_chain(pages, parent_key, h_s, |old, contribution| {
        old.wrapping_add(HASH_PRIME.wrapping_mul(contribution))
    })
}

/// Fold an already-fully-hashed subtree root's hash into the ancestor chain,
/// without touching the subtree root itself. Used after a post-order pass
/// (bulk ingest) and directly equivalent to the tail of [`hash_add`].
pub fn fold_ancestors_with_root_hash(
    pages: &mut impl PageTransaction,
    config: &ResourceConfig,
    parent_key: NodeKey,
    subtree_root_hash: u64,
    added_descendants: u64,
) -> Result<()> {
    fold_descendant_count(pages, parent_key, added_descendants as i64)?;
    if config.hash_kind == HashKind::None {
        return Ok(());
    }
    fold_ancestor_chain(pages, parent_key, subtree_root_hash, |old, contribution| {
        old.wrapping_add(HASH_PRIME.wrapping_mul(contribution))
    })
}

/// Hash maintenance before detaching `start` (whose current stored hash is
/// `start_hash`) from `parent_key`.
///
/// `removed_descendants` is `descendantCount(start) + 1`; `None` skips the
/// descendant-count walk under the same bootstrap carve-out as
/// [`hash_add`].
pub fn hash_remove(
    pages: &mut impl PageTransaction,
    config: &ResourceConfig,
    parent_key: NodeKey,
    start_hash: u64,
    removed_descendants: Option<u64>,
) -> Result<()> {
    if let Some(delta) = removed_descendants {
        fold_descendant_count(pages, parent_key, -(delta as i64))?;
    }
    if config.hash_kind == HashKind::None {
        return Ok(());
    }
    fold_ancestor_chain(pages, parent_key, start_hash, |old, contribution| {
        old.wrapping_sub(HASH_PRIME.wrapping_mul(contribution))
    })
}

/// Hash maintenance after `changed`'s intrinsic fields (name/uri/value) have
/// already been mutated on the in-memory record but the stored hash has not.
/// `old_intrinsic` is `h(n)` computed *before* the field mutation.
pub fn hash_update(
    pages: &mut impl PageTransaction,
    config: &ResourceConfig,
    parent_key: NodeKey,
    changed: &mut Node,
    old_intrinsic: u64,
) -> Result<()> {
    if config.hash_kind == HashKind::None {
        return Ok(());
    }
    let new_intrinsic = intrinsic_hash(changed);
    let old_full = changed.hash();
    let new_full = old_full.wrapping_sub(old_intrinsic).wrapping_add(new_intrinsic);
    changed.set_hash(new_full);

    let mut old_contribution = old_full;
    fold_ancestor_chain(pages, parent_key, new_full, move |old, new_contribution| {
        let updated = old
            .wrapping_sub(HASH_PRIME.wrapping_mul(old_contribution))
            .wrapping_add(HASH_PRIME.wrapping_mul(new_contribution));
        old_contribution = old;
        updated
    })
}

/// Full post-order recomputation of every hash in the subtree rooted at
/// `root_key`: children first, then attributes, then namespaces, folded
/// with [`HASH_PRIME`]. Returns the subtree root's freshly computed hash.
///
/// Used whenever the editor requests add/update under [`HashKind::Postorder`]
/// and unconditionally after bulk subtree ingestion.
pub fn recompute_postorder(
    pages: &mut impl PageTransaction,
    config: &ResourceConfig,
    root_key: NodeKey,
) -> Result<u64> {
    if config.hash_kind == HashKind::None {
        return Ok(0);
    }
    let node = pages
        .get(root_key)?
        .ok_or(crate::error::Error::InvariantViolation("postorder hash: missing node"))?;

    let mut fold = 0u64;

    if let Some(structural) = node.structural() {
        let mut child_key = structural.first_child_key;
        while !is_null(child_key) {
            let child_hash = recompute_postorder(pages, config, child_key)?;
            fold = fold.wrapping_add(child_hash);
            let child = pages.get(child_key)?.ok_or(crate::error::Error::InvariantViolation(
                "postorder hash: sibling chain broken",
            ))?;
            child_key = child.structural().map(|s| s.right_sibling_key).unwrap_or(NULL_KEY);
        }
    }

    if let Some(attributes) = node.attributes() {
        for attr_key in attributes.values().copied() {
            let mut attr = pages.prepare(attr_key)?;
            let h = intrinsic_hash(&attr);
            attr.set_hash(h);
            pages.finish(attr)?;
            fold = fold.wrapping_add(h);
        }
    }

    if let Some(namespaces) = node.namespaces() {
        for &ns_key in namespaces {
            let mut ns = pages.prepare(ns_key)?;
            let h = intrinsic_hash(&ns);
            ns.set_hash(h);
            pages.finish(ns)?;
            fold = fold.wrapping_add(h);
        }
    }

    let h_n = intrinsic_hash(&node);
    let new_hash = h_n.wrapping_add(HASH_PRIME.wrapping_mul(fold));
    let mut node_mut = pages.prepare(root_key)?;
    node_mut.set_hash(new_hash);
    pages.finish(node_mut)?;
    Ok(new_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NULL_NAME_KEY;
    use crate::testkit::InMemoryPages;

    #[test]
    fn intrinsic_hash_is_stable_for_same_fields() {
        let a = Node::new_element(1, 0, 7, NULL_NAME_KEY);
        let b = Node::new_element(2, 0, 7, NULL_NAME_KEY);
        assert_eq!(intrinsic_hash(&a), intrinsic_hash(&b));
    }

    #[test]
    fn intrinsic_hash_differs_on_value() {
        let a = Node::new_text(1, 0, b"hi".to_vec(), false);
        let b = Node::new_text(2, 0, b"bye".to_vec(), false);
        assert_ne!(intrinsic_hash(&a), intrinsic_hash(&b));
    }

    #[test]
    fn rolling_add_matches_single_node_recurrence() {
        let mut pages = InMemoryPages::new();
        let config = ResourceConfig::default();
        let mut elem = Node::new_element(1, 0, 5, NULL_NAME_KEY);
        hash_add(&mut pages, &config, 0, &mut elem, Some(1)).unwrap();
        let expected = intrinsic_hash(&elem);
        assert_eq!(elem.hash(), expected);
        let root = pages.get(0).unwrap().unwrap();
        assert_eq!(root.hash(), HASH_PRIME.wrapping_mul(expected));
        assert_eq!(root.descendant_count(), 1);
    }
}
