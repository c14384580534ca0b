use crate::error::{Error, Result};
use crate::external::ReadTransaction;
use crate::hash::hash_add;
use crate::node::{is_null, Node, NodeKey, NodeKind};
use crate::page::PageTransaction;
use crate::txn::Inner;

use super::{
    attach_first_child, attach_right_sibling, merge_adjacent_text, skip_descendant_accounting,
    InsertPosition, SubtreeBuilder,
};

impl<P: PageTransaction> Inner<P> {
    /// Replace `target` (must be a Text node) with a freshly created text
    /// value, landing in the exact slot `target` occupied. Role-preserving:
    /// a text replacement only ever takes a Text node's place — replacing an
    /// attribute's value is `set_value`, not a structural replace.
    pub(crate) fn replace_with_text(&mut self, target: NodeKey, value: &[u8]) -> Result<NodeKey> {
        let node = self
            .pages
            .get(target)?
            .ok_or(Error::BadArgument("replace: no such node"))?;
        if node.kind() != NodeKind::Text {
            return Err(Error::BadArgument("replace_with_text: target is not a text node"));
        }

        let (parent_key, left, right) = self.remove_structural_no_merge(target, &node)?;

        let (stored, compressed) = crate::compression::maybe_compress(value, self.config.compression)?;
        let created = self.pages.create(Node::new_text(0, 0, stored, compressed))?;
        let key = created.key();
        if is_null(left) {
            attach_first_child(&mut self.pages, parent_key, key)?;
        } else {
            attach_right_sibling(&mut self.pages, parent_key, left, key)?;
        }

        let final_key = self.merge_or_register_leaf(parent_key, key, left, right)?;
        self.cursor = crate::cursor::Cursor::new(final_key);
        Ok(final_key)
    }

    /// Replace `target` with a copy of the subtree at `source`'s current
    /// position, in the same slot. `source`'s kind must be in the same role
    /// class as `target`'s (structural for structural; attribute/namespace
    /// replacement goes through `set_value`/`set_qname` instead since there
    /// is nothing to "visit").
    pub(crate) fn replace_with_subtree(
        &mut self,
        target: NodeKey,
        source: &dyn ReadTransaction,
    ) -> Result<NodeKey> {
        let node = self
            .pages
            .get(target)?
            .ok_or(Error::BadArgument("replace: no such node"))?;
        if !node.is_structural() {
            return Err(Error::BadArgument(
                "replace_with_subtree: only structural nodes (Element/Text) can be replaced this way",
            ));
        }
        if !source.kind().is_structural() {
            return Err(Error::BadArgument("replace_with_subtree: source is not structural"));
        }

        let (parent_key, left, right) = self.remove_structural_no_merge(target, &node)?;

        let mut builder = SubtreeBuilder::new(&mut self.pages, &self.config, self.bootstrap, parent_key, Some(left).filter(|k| !is_null(*k)), false);
        source.visit(&mut builder)?;
        let new_root = builder
            .root_key()
            .ok_or(Error::BadArgument("replace_with_subtree: empty source"))?;

        let final_key = self.merge_built_run(new_root, new_root, left, right)?;
        self.cursor = crate::cursor::Cursor::new(final_key);
        Ok(final_key)
    }

    /// Replace `target` with the subtree built by feeding `events` (an
    /// already-shredded stream; this crate does no XML parsing itself) into
    /// the same vacated slot.
    pub(crate) fn replace_with_fragment(
        &mut self,
        target: NodeKey,
        events: &mut dyn Iterator<Item = Result<crate::external::IngestEvent>>,
    ) -> Result<NodeKey> {
        let node = self
            .pages
            .get(target)?
            .ok_or(Error::BadArgument("replace: no such node"))?;
        if !node.is_structural() {
            return Err(Error::BadArgument(
                "replace_with_fragment: only structural nodes (Element/Text) can be replaced this way",
            ));
        }

        let (parent_key, left, right) = self.remove_structural_no_merge(target, &node)?;

        let mut builder = SubtreeBuilder::new(&mut self.pages, &self.config, self.bootstrap, parent_key, Some(left).filter(|k| !is_null(*k)), false);
        for event in events {
            builder.feed_event(&event?)?;
        }
        let new_root = builder
            .root_key()
            .ok_or(Error::BadArgument("replace_with_fragment: empty fragment"))?;
        let last = builder.top_level_last_child().unwrap_or(new_root);

        let final_key = self.merge_built_run(new_root, last, left, right)?;
        self.cursor = crate::cursor::Cursor::new(final_key);
        Ok(final_key)
    }

    /// Copy the subtree at `source`'s current position in as a new
    /// first-child / left-sibling / right-sibling of `target`, re-registering
    /// names in this resource's dictionary. `target` itself is untouched.
    pub(crate) fn copy_subtree(
        &mut self,
        target: NodeKey,
        position: InsertPosition,
        source: &dyn ReadTransaction,
    ) -> Result<NodeKey> {
        if !source.kind().is_structural() {
            return Err(Error::BadArgument("copy_subtree: source is not structural"));
        }
        let target_node = self
            .pages
            .get(target)?
            .ok_or(Error::BadArgument("copy_subtree: no such target node"))?;

        let (parent_key, seed_left) = match position {
            InsertPosition::FirstChild => {
                if !matches!(target_node.kind(), NodeKind::Element | NodeKind::Root) {
                    return Err(Error::BadArgument("copy_subtree: target cannot hold children"));
                }
                (target, None)
            }
            InsertPosition::LeftSibling => {
                if target_node.kind() == NodeKind::Root || !target_node.is_structural() {
                    return Err(Error::BadArgument("copy_subtree: target cannot take a sibling"));
                }
                let left = target_node.structural().unwrap().left_sibling_key;
                (target_node.parent_key(), Some(left).filter(|k| !is_null(*k)))
            }
            InsertPosition::RightSibling => {
                if target_node.kind() == NodeKind::Root || !target_node.is_structural() {
                    return Err(Error::BadArgument("copy_subtree: target cannot take a sibling"));
                }
                (target_node.parent_key(), Some(target))
            }
        };

        let left_neighbor = seed_left.unwrap_or(crate::node::NULL_KEY);
        let right_neighbor = match position {
            InsertPosition::FirstChild => target_node.structural().unwrap().first_child_key,
            InsertPosition::LeftSibling => target,
            InsertPosition::RightSibling => target_node.structural().unwrap().right_sibling_key,
        };

        let mut builder = SubtreeBuilder::new(&mut self.pages, &self.config, self.bootstrap, parent_key, seed_left, false);
        source.visit(&mut builder)?;
        let new_root = builder
            .root_key()
            .ok_or(Error::BadArgument("copy_subtree: empty source"))?;

        let final_key = self.merge_built_run(new_root, new_root, left_neighbor, right_neighbor)?;
        self.cursor = crate::cursor::Cursor::new(final_key);
        Ok(final_key)
    }

    /// After attaching a lone, not-yet-hashed leaf node (`key`, still holding
    /// its default zero hash) at the gap between `left` and `right`, either
    /// merge it into a neighboring Text node or fold its own hash in — the
    /// same dance `insert_text` runs after an insert.
    fn merge_or_register_leaf(
        &mut self,
        parent_key: NodeKey,
        key: NodeKey,
        left: NodeKey,
        right: NodeKey,
    ) -> Result<NodeKey> {
        if let Some(survivor) = merge_adjacent_text(&mut self.pages, &self.config, self.bootstrap, left, key)? {
            return Ok(survivor);
        }
        if let Some(survivor) = merge_adjacent_text(&mut self.pages, &self.config, self.bootstrap, key, right)? {
            return Ok(survivor);
        }
        let added = if skip_descendant_accounting(&self.config, self.bootstrap) {
            None
        } else {
            Some(1)
        };
        let mut node = self.pages.prepare(key)?;
        hash_add(&mut self.pages, &self.config, parent_key, &mut node, added)?;
        self.pages.finish(node)?;
        Ok(key)
    }

    /// After a [`SubtreeBuilder`] run (which already hashes every node it
    /// attaches), check for text-merge at both edges of the inserted run:
    /// `left` against the run's first node (`first`), and the run's last
    /// node (`last`) against `right`.
    fn merge_built_run(
        &mut self,
        first: NodeKey,
        last: NodeKey,
        left: NodeKey,
        right: NodeKey,
    ) -> Result<NodeKey> {
        let mut result = first;
        if let Some(survivor) = merge_adjacent_text(&mut self.pages, &self.config, self.bootstrap, left, first)? {
            result = survivor;
        }
        let tail = if last == first { result } else { last };
        if let Some(survivor) = merge_adjacent_text(&mut self.pages, &self.config, self.bootstrap, tail, right)? {
            result = survivor;
        } else if last != first {
            result = tail;
        }
        Ok(result)
    }
}
