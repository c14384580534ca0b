//! Bulk-loads a shredded event stream into a fresh subtree without paying
//! per-node hash maintenance, then runs one post-order hash pass plus a
//! single ancestor fold once the whole subtree is wired up.

use crate::editor::{merge_adjacent_text, InsertPosition, SubtreeBuilder};
use crate::error::{Error, Result};
use crate::external::IngestEvent;
use crate::hash::{fold_ancestors_with_root_hash, recompute_postorder};
use crate::node::{is_null, NodeKey, NodeKind, NULL_KEY};
use crate::page::{PageTransaction, Session};
use crate::txn::{Inner, WriteTransaction};

impl<P: PageTransaction> Inner<P> {
    /// Bulk-ingest `events` as a new subtree positioned (first-child /
    /// left-sibling / right-sibling) relative to `target`. Unlike
    /// `replace_with_fragment`/`copy_subtree`, every node attached while
    /// building skips the ancestor hash walk entirely; once the stream is
    /// exhausted a single post-order pass recomputes every hash and
    /// `descendant_count` in the new subtree, then one ancestor fold carries
    /// the root's hash and total descendant count up.
    pub(crate) fn ingest_subtree(
        &mut self,
        target: NodeKey,
        position: InsertPosition,
        events: &mut dyn Iterator<Item = Result<IngestEvent>>,
    ) -> Result<NodeKey> {
        let target_node = self
            .pages
            .get(target)?
            .ok_or(Error::BadArgument("ingest: no such target node"))?;

        let (parent_key, seed_left, left_neighbor, right_neighbor) = match position {
            InsertPosition::FirstChild => {
                if !matches!(target_node.kind(), NodeKind::Element | NodeKind::Root) {
                    return Err(Error::BadArgument("ingest: target cannot hold children"));
                }
                let right = target_node.structural().unwrap().first_child_key;
                (target, None, NULL_KEY, right)
            }
            InsertPosition::LeftSibling => {
                if target_node.kind() == NodeKind::Root || !target_node.is_structural() {
                    return Err(Error::BadArgument("ingest: target cannot take a sibling"));
                }
                let left = target_node.structural().unwrap().left_sibling_key;
                (
                    target_node.parent_key(),
                    Some(left).filter(|k| !is_null(*k)),
                    left,
                    target,
                )
            }
            InsertPosition::RightSibling => {
                if target_node.kind() == NodeKind::Root || !target_node.is_structural() {
                    return Err(Error::BadArgument("ingest: target cannot take a sibling"));
                }
                let right = target_node.structural().unwrap().right_sibling_key;
                (target_node.parent_key(), Some(target), target, right)
            }
        };

        self.bulk_insert = true;
        let (root_key, last_key) = {
            let mut builder =
                SubtreeBuilder::new(&mut self.pages, &self.config, self.bootstrap, parent_key, seed_left, true);
            for event in events {
                builder.feed_event(&event?)?;
            }
            (builder.root_key(), builder.top_level_last_child())
        };
        self.bulk_insert = false;
        let root_key = root_key.ok_or(Error::BadArgument("ingest: empty event stream"))?;
        let last_key = last_key.unwrap_or(root_key);

        // A bulk stream can carry more than one top-level node; walk the
        // whole run the builder attached (`root_key..=last_key` via
        // right-sibling links) and fold each one's post-order hash and
        // descendant count into the ancestor chain individually, instead of
        // only the first.
        let mut top_level_key = root_key;
        loop {
            let total_descendants = recompute_descendant_counts(&mut self.pages, top_level_key)?;
            let root_hash = recompute_postorder(&mut self.pages, &self.config, top_level_key)?;
            fold_ancestors_with_root_hash(
                &mut self.pages,
                &self.config,
                parent_key,
                root_hash,
                total_descendants + 1,
            )?;
            if top_level_key == last_key {
                break;
            }
            let node = self
                .pages
                .get(top_level_key)?
                .ok_or(Error::InvariantViolation("ingest: top-level chain broken"))?;
            top_level_key = node.structural().map(|s| s.right_sibling_key).unwrap_or(NULL_KEY);
            if is_null(top_level_key) {
                break;
            }
        }

        let mut final_key = root_key;
        if let Some(survivor) =
            merge_adjacent_text(&mut self.pages, &self.config, self.bootstrap, left_neighbor, root_key)?
        {
            final_key = survivor;
        }
        let tail = if last_key == root_key { final_key } else { last_key };
        if let Some(survivor) =
            merge_adjacent_text(&mut self.pages, &self.config, self.bootstrap, tail, right_neighbor)?
        {
            final_key = survivor;
        } else if last_key != root_key {
            final_key = tail;
        }

        self.cursor = crate::cursor::Cursor::new(final_key);
        Ok(final_key)
    }
}

/// Post-order recompute of `descendant_count` for every structural node in
/// the subtree rooted at `root_key` (skipped entirely while
/// `SubtreeBuilder` runs in `suppress_hash` mode, and while the
/// eventual-consistency bootstrap carve-out is active). Returns the root's
/// own `descendant_count`.
pub(crate) fn recompute_descendant_counts(pages: &mut impl PageTransaction, root_key: NodeKey) -> Result<u64> {
    let node = pages
        .get(root_key)?
        .ok_or(Error::InvariantViolation("ingest: subtree node vanished"))?;

    let mut total = 0u64;
    if let Some(structural) = node.structural() {
        let mut child_key = structural.first_child_key;
        while !is_null(child_key) {
            total += recompute_descendant_counts(pages, child_key)? + 1;
            let child = pages
                .get(child_key)?
                .ok_or(Error::InvariantViolation("ingest: sibling chain broken"))?;
            child_key = child.structural().map(|s| s.right_sibling_key).unwrap_or(NULL_KEY);
        }
    }

    if node.is_structural() {
        let mut n = pages.prepare(root_key)?;
        n.structural_mut().unwrap().descendant_count = total;
        pages.finish(n)?;
    }
    Ok(total)
}

impl<S> WriteTransaction<S>
where
    S: Session + Send + Sync + 'static,
    S::PageTxn: 'static,
{
    /// Bulk-ingest a shredded event stream as a new subtree next to
    /// `target`. Prefer this over repeated `insert_element`/
    /// `insert_text` calls when loading a large subtree at once — hash and
    /// descendant-count maintenance run once at the end instead of once per
    /// node.
    pub fn ingest_subtree(
        &self,
        target: NodeKey,
        position: InsertPosition,
        events: &mut dyn Iterator<Item = Result<IngestEvent>>,
    ) -> Result<NodeKey> {
        self.with_edit(|inner| inner.ingest_subtree(target, position, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::node::ROOT_KEY;
    use crate::testkit::InMemorySession;

    fn events(xs: Vec<IngestEvent>) -> Vec<Result<IngestEvent>> {
        xs.into_iter().map(Ok).collect()
    }

    #[test]
    fn ingest_builds_subtree_and_folds_hash_once() {
        let session = InMemorySession::new(ResourceConfig::default());
        let txn = WriteTransaction::open(session, 0, 1).unwrap();
        let mut stream = events(vec![
            IngestEvent::StartElement {
                local_name: "book".into(),
                uri: None,
                attributes: vec![("id".into(), None, b"1".to_vec())],
                namespaces: vec![],
            },
            IngestEvent::StartElement {
                local_name: "title".into(),
                uri: None,
                attributes: vec![],
                namespaces: vec![],
            },
            IngestEvent::Text(b"Hyperion".to_vec()),
            IngestEvent::EndElement,
            IngestEvent::EndElement,
        ])
        .into_iter();

        let root = txn
            .ingest_subtree(ROOT_KEY, InsertPosition::FirstChild, &mut stream)
            .unwrap();

        let inner = txn.shared.lock();
        let node = inner.pages.get(root).unwrap().unwrap();
        assert_eq!(node.kind(), NodeKind::Element);
        assert_eq!(node.descendant_count(), 1);
        assert_ne!(node.hash(), 0);
        let root_node = inner.pages.get(ROOT_KEY).unwrap().unwrap();
        assert_eq!(root_node.hash(), crate::hash::HASH_PRIME.wrapping_mul(node.hash()));
    }

    #[test]
    fn ingest_with_multiple_top_level_nodes_hashes_and_counts_every_root() {
        let session = InMemorySession::new(ResourceConfig::default());
        let txn = WriteTransaction::open(session, 0, 1).unwrap();
        let mut stream = events(vec![
            IngestEvent::StartElement {
                local_name: "book".into(),
                uri: None,
                attributes: vec![],
                namespaces: vec![],
            },
            IngestEvent::EndElement,
            IngestEvent::StartElement {
                local_name: "movie".into(),
                uri: None,
                attributes: vec![],
                namespaces: vec![],
            },
            IngestEvent::EndElement,
        ])
        .into_iter();

        txn.ingest_subtree(ROOT_KEY, InsertPosition::FirstChild, &mut stream)
            .unwrap();

        let inner = txn.shared.lock();
        let root_node = inner.pages.get(ROOT_KEY).unwrap().unwrap();
        let book = inner.pages.get(root_node.structural().unwrap().first_child_key).unwrap().unwrap();
        let movie_key = book.structural().unwrap().right_sibling_key;
        let movie = inner.pages.get(movie_key).unwrap().unwrap();

        assert_eq!(movie.structural().unwrap().left_sibling_key, book.key());
        assert_ne!(book.hash(), 0);
        assert_ne!(movie.hash(), 0);
        assert_eq!(root_node.child_count(), 2);
        assert_eq!(root_node.descendant_count(), 2);
        assert_eq!(
            root_node.hash(),
            crate::hash::HASH_PRIME
                .wrapping_mul(book.hash())
                .wrapping_add(crate::hash::HASH_PRIME.wrapping_mul(movie.hash()))
        );
    }

    #[test]
    fn ingest_rejects_empty_stream() {
        let session = InMemorySession::new(ResourceConfig::default());
        let txn = WriteTransaction::open(session, 0, 1).unwrap();
        let mut stream = events(vec![]).into_iter();
        assert!(matches!(
            txn.ingest_subtree(ROOT_KEY, InsertPosition::FirstChild, &mut stream),
            Err(Error::BadArgument(_))
        ));
    }
}
