use crate::error::{Error, Result};
use crate::hash::{fold_ancestors_with_root_hash, hash_remove};
use crate::node::{is_null, NodeKey, NodeKind, ROOT_KEY};
use crate::page::PageTransaction;
use crate::txn::Inner;

use super::{
    attach_first_child, attach_left_sibling, attach_right_sibling, detach_structural,
    merge_adjacent_text, own_subtree_count, reject_if_self_or_ancestor, skip_descendant_accounting,
    InsertPosition,
};

impl<P: PageTransaction> Inner<P> {
    /// Move the subtree rooted at `source` to first-child / left-sibling /
    /// right-sibling of `target`. Rejects the document root as a source,
    /// `source == target`, and `source` being an ancestor of `target`.
    pub(crate) fn move_subtree(
        &mut self,
        source: NodeKey,
        target: NodeKey,
        position: InsertPosition,
    ) -> Result<()> {
        if source == ROOT_KEY {
            return Err(Error::BadArgument("move: cannot move the document root"));
        }
        let source_node = self
            .pages
            .get(source)?
            .ok_or(Error::BadArgument("move: no such source node"))?;
        if !source_node.is_structural() {
            return Err(Error::BadArgument("move: source is not a structural node"));
        }
        reject_if_self_or_ancestor(&self.pages, source, target)?;

        if self.is_already_in_position(&source_node, target, position)? {
            return Ok(());
        }

        // Validate the destination before any mutation happens: a rejected
        // move must leave `source` exactly where it was.
        let dest_parent_key = match position {
            InsertPosition::FirstChild => {
                if !matches!(self.pages.get(target)?.map(|n| n.kind()), Some(NodeKind::Element) | Some(NodeKind::Root)) {
                    return Err(Error::BadArgument("move: destination cannot hold children"));
                }
                None
            }
            InsertPosition::LeftSibling | InsertPosition::RightSibling => {
                let dest = self
                    .pages
                    .get(target)?
                    .ok_or(Error::BadArgument("move: no such destination node"))?;
                if dest.kind() == NodeKind::Root || !dest.is_structural() {
                    return Err(Error::BadArgument("move: destination cannot take a sibling"));
                }
                Some(dest.parent_key())
            }
        };

        let old_parent = source_node.parent_key();
        let (old_left, old_right) = {
            let s = source_node.structural().unwrap();
            (s.left_sibling_key, s.right_sibling_key)
        };
        let own_hash = source_node.hash();
        let own_count = own_subtree_count(&source_node);

        detach_structural(&mut self.pages, source)?;
        let removed = if skip_descendant_accounting(&self.config, self.bootstrap) {
            None
        } else {
            Some(own_count)
        };
        hash_remove(&mut self.pages, &self.config, old_parent, own_hash, removed)?;
        merge_adjacent_text(&mut self.pages, &self.config, self.bootstrap, old_left, old_right)?;

        let new_parent = match position {
            InsertPosition::FirstChild => {
                attach_first_child(&mut self.pages, target, source)?;
                target
            }
            InsertPosition::LeftSibling => {
                let parent_key = dest_parent_key.unwrap();
                attach_left_sibling(&mut self.pages, parent_key, target, source)?;
                parent_key
            }
            InsertPosition::RightSibling => {
                let parent_key = dest_parent_key.unwrap();
                attach_right_sibling(&mut self.pages, parent_key, target, source)?;
                parent_key
            }
        };

        let added = if skip_descendant_accounting(&self.config, self.bootstrap) {
            0
        } else {
            own_count
        };
        fold_ancestors_with_root_hash(&mut self.pages, &self.config, new_parent, own_hash, added)?;

        let (new_left, new_right) = {
            let node = self.pages.get(source)?.unwrap();
            let s = node.structural().unwrap();
            (s.left_sibling_key, s.right_sibling_key)
        };
        if let Some(survivor) =
            merge_adjacent_text(&mut self.pages, &self.config, self.bootstrap, new_left, source)?
        {
            self.cursor = crate::cursor::Cursor::new(survivor);
        } else if let Some(survivor) =
            merge_adjacent_text(&mut self.pages, &self.config, self.bootstrap, source, new_right)?
        {
            self.cursor = crate::cursor::Cursor::new(survivor);
        } else {
            self.cursor = crate::cursor::Cursor::new(source);
        }
        Ok(())
    }

    fn is_already_in_position(
        &self,
        source_node: &crate::node::Node,
        target: NodeKey,
        position: InsertPosition,
    ) -> Result<bool> {
        let s = source_node.structural().unwrap();
        Ok(match position {
            InsertPosition::FirstChild => source_node.parent_key() == target && is_null(s.left_sibling_key),
            InsertPosition::LeftSibling => s.right_sibling_key == target,
            InsertPosition::RightSibling => s.left_sibling_key == target,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ResourceConfig;
    use crate::editor::InsertPosition;
    use crate::error::Error;
    use crate::node::ROOT_KEY;
    use crate::testkit::InMemorySession;
    use crate::txn::WriteTransaction;

    #[test]
    fn rejected_sibling_move_to_root_leaves_tree_unchanged() {
        let session = InMemorySession::new(ResourceConfig::default());
        let txn = WriteTransaction::open(session, 0, 1).unwrap();
        let a = txn.insert_element(ROOT_KEY, InsertPosition::FirstChild, "a", None).unwrap();

        let root_before = txn.node(ROOT_KEY).unwrap().unwrap();
        let a_before = txn.node(a).unwrap().unwrap();

        let result = txn.move_subtree(a, ROOT_KEY, InsertPosition::RightSibling);
        assert!(matches!(result, Err(Error::BadArgument(_))));

        let root_after = txn.node(ROOT_KEY).unwrap().unwrap();
        let a_after = txn.node(a).unwrap().unwrap();
        assert_eq!(root_after.hash(), root_before.hash());
        assert_eq!(root_after.child_count(), root_before.child_count());
        assert_eq!(root_after.structural().unwrap().first_child_key, a);
        assert_eq!(a_after.parent_key(), a_before.parent_key());
        assert_eq!(a_after.structural().unwrap().left_sibling_key, a_before.structural().unwrap().left_sibling_key);
        assert_eq!(a_after.structural().unwrap().right_sibling_key, a_before.structural().unwrap().right_sibling_key);
    }

    #[test]
    fn rejected_first_child_move_into_text_leaves_tree_unchanged() {
        let session = InMemorySession::new(ResourceConfig::default());
        let txn = WriteTransaction::open(session, 0, 1).unwrap();
        let e = txn.insert_element(ROOT_KEY, InsertPosition::FirstChild, "e", None).unwrap();
        let t = txn.insert_text(e, InsertPosition::FirstChild, b"hi").unwrap();
        let a = txn.insert_element(e, InsertPosition::RightSibling, "a", None).unwrap();

        let root_before = txn.node(ROOT_KEY).unwrap().unwrap();

        let result = txn.move_subtree(a, t, InsertPosition::FirstChild);
        assert!(matches!(result, Err(Error::BadArgument(_))));

        let root_after = txn.node(ROOT_KEY).unwrap().unwrap();
        assert_eq!(root_after.hash(), root_before.hash());
        let a_after = txn.node(a).unwrap().unwrap();
        assert_eq!(a_after.parent_key(), ROOT_KEY);
    }
}
