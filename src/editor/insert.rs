use crate::error::{Error, Result};
use crate::hash::hash_add;
use crate::node::{Node, NodeKey, NodeKind};
use crate::page::PageTransaction;
use crate::txn::Inner;

use super::{
    attach_first_child, attach_left_sibling, attach_right_sibling, merge_adjacent_text,
    register_name, skip_descendant_accounting, InsertPosition, MoveAfterHint,
};

impl<P: PageTransaction> Inner<P> {
    fn resolve_parent_and_attach(
        &mut self,
        target: NodeKey,
        position: InsertPosition,
        key: NodeKey,
    ) -> Result<NodeKey> {
        let target_node = self
            .pages
            .get(target)?
            .ok_or(Error::BadArgument("insert: no such target node"))?;
        let parent_key = match position {
            InsertPosition::FirstChild => target,
            InsertPosition::LeftSibling | InsertPosition::RightSibling => target_node.parent_key(),
        };
        match position {
            InsertPosition::FirstChild => attach_first_child(&mut self.pages, target, key)?,
            InsertPosition::LeftSibling => {
                attach_left_sibling(&mut self.pages, parent_key, target, key)?
            }
            InsertPosition::RightSibling => {
                attach_right_sibling(&mut self.pages, parent_key, target, key)?
            }
        }
        Ok(parent_key)
    }

    fn finish_insert_hash(&mut self, parent_key: NodeKey, key: NodeKey) -> Result<()> {
        let mut node = self.pages.prepare(key)?;
        let added = if skip_descendant_accounting(&self.config, self.bootstrap) {
            None
        } else {
            Some(1)
        };
        hash_add(&mut self.pages, &self.config, parent_key, &mut node, added)?;
        self.pages.finish(node)?;
        Ok(())
    }

    /// Insert element: self ∈ {Element, Root} for FirstChild; sibling
    /// insertions require self structural (and the root never has
    /// siblings).
    pub(crate) fn insert_element(
        &mut self,
        target: NodeKey,
        position: InsertPosition,
        local_name: &str,
        uri: Option<&str>,
    ) -> Result<NodeKey> {
        let target_node = self
            .pages
            .get(target)?
            .ok_or(Error::BadArgument("insert: no such target node"))?;
        match position {
            InsertPosition::FirstChild => {
                if !matches!(target_node.kind(), NodeKind::Element | NodeKind::Root) {
                    return Err(Error::BadArgument("insert element: target cannot hold children"));
                }
            }
            InsertPosition::LeftSibling | InsertPosition::RightSibling => {
                if target_node.kind() == NodeKind::Root {
                    return Err(Error::BadArgument("insert element: root has no siblings"));
                }
                if !target_node.is_structural() {
                    return Err(Error::BadArgument("insert element: target is not structural"));
                }
            }
        }

        let (name_key, uri_key) = register_name(&mut self.pages, local_name, uri)?;
        let created = self.pages.create(Node::new_element(0, 0, name_key, uri_key))?;
        let key = created.key();
        let parent_key = self.resolve_parent_and_attach(target, position, key)?;
        self.finish_insert_hash(parent_key, key)?;
        self.cursor = crate::cursor::Cursor::new(key);
        Ok(key)
    }

    /// Insert text: self ∈ {Element, Text} for FirstChild; sibling-text
    /// insertions merge instead of producing a new adjacent text node.
    pub(crate) fn insert_text(
        &mut self,
        target: NodeKey,
        position: InsertPosition,
        value: &[u8],
    ) -> Result<NodeKey> {
        let target_node = self
            .pages
            .get(target)?
            .ok_or(Error::BadArgument("insert: no such target node"))?;
        match position {
            InsertPosition::FirstChild => {
                if !matches!(target_node.kind(), NodeKind::Element | NodeKind::Text) {
                    return Err(Error::BadArgument("insert text: target cannot hold a text child"));
                }
            }
            InsertPosition::LeftSibling | InsertPosition::RightSibling => {
                if target_node.kind() == NodeKind::Root {
                    return Err(Error::BadArgument("insert text: root has no siblings"));
                }
                if !target_node.is_structural() {
                    return Err(Error::BadArgument("insert text: target is not structural"));
                }
            }
        }

        let (stored, compressed) =
            crate::compression::maybe_compress(value, self.config.compression)?;
        let created = self
            .pages
            .create(Node::new_text(0, 0, stored, compressed))?;
        let key = created.key();
        let parent_key = self.resolve_parent_and_attach(target, position, key)?;

        // Re-read `key`'s own links, now wired by `resolve_parent_and_attach`,
        // so the merge check is position-agnostic.
        let (left, right) = {
            let node = self.pages.get(key)?.unwrap();
            let s = node.structural().unwrap();
            (s.left_sibling_key, s.right_sibling_key)
        };
        let merged_key = self.try_merge_both_sides(key, left, right)?;

        let final_key = merged_key.unwrap_or(key);
        if merged_key.is_none() {
            self.finish_insert_hash(parent_key, key)?;
        }
        self.cursor = crate::cursor::Cursor::new(final_key);
        Ok(final_key)
    }

    /// Try merging `key` with its left neighbor, then with its right
    /// neighbor (a node can only ever end up adjacent to one text node on
    /// each side after a single insert). Returns the surviving key if any
    /// merge happened.
    fn try_merge_both_sides(
        &mut self,
        key: NodeKey,
        left: NodeKey,
        right: NodeKey,
    ) -> Result<Option<NodeKey>> {
        if let Some(survivor) =
            merge_adjacent_text(&mut self.pages, &self.config, self.bootstrap, left, key)?
        {
            return Ok(Some(survivor));
        }
        if let Some(survivor) =
            merge_adjacent_text(&mut self.pages, &self.config, self.bootstrap, key, right)?
        {
            return Ok(Some(survivor));
        }
        Ok(None)
    }

    /// Insert attribute on an element; duplicate by name-hash overwrites if
    /// values differ, fails `DuplicateAttribute` if they are equal.
    pub(crate) fn insert_attribute(
        &mut self,
        element: NodeKey,
        local_name: &str,
        uri: Option<&str>,
        value: &[u8],
        move_after: MoveAfterHint,
    ) -> Result<NodeKey> {
        let elem = self
            .pages
            .get(element)?
            .ok_or(Error::BadArgument("insert attribute: no such element"))?;
        if elem.kind() != NodeKind::Element {
            return Err(Error::BadArgument("insert attribute: target is not an element"));
        }

        let (name_key, uri_key) = register_name(&mut self.pages, local_name, uri)?;
        if let Some(&existing_key) = elem.attributes().unwrap().get(&name_key) {
            let existing = self.pages.get(existing_key)?.unwrap();
            let existing_value =
                crate::compression::maybe_decompress(&existing.valued().unwrap().value, existing.valued().unwrap().compressed)?;
            super::release_name(&mut self.pages, name_key, uri_key)?;
            if existing_value == value {
                return Err(Error::DuplicateAttribute);
            }
            let old_intrinsic = crate::hash::intrinsic_hash(&existing);
            let (stored, compressed) =
                crate::compression::maybe_compress(value, self.config.compression)?;
            let mut node = self.pages.prepare(existing_key)?;
            {
                let v = node.valued_mut().unwrap();
                v.value = stored;
                v.compressed = compressed;
            }
            crate::hash::hash_update(&mut self.pages, &self.config, element, &mut node, old_intrinsic)?;
            self.pages.finish(node)?;
            if move_after == MoveAfterHint::ToParent {
                self.cursor = crate::cursor::Cursor::new(element);
            } else {
                self.cursor = crate::cursor::Cursor::new(existing_key);
            }
            return Ok(existing_key);
        }

        let (stored, compressed) = crate::compression::maybe_compress(value, self.config.compression)?;
        let created = self
            .pages
            .create(Node::new_attribute(0, element, name_key, uri_key, stored, compressed))?;
        let key = created.key();

        let mut parent = self.pages.prepare(element)?;
        parent.attributes_mut().unwrap().insert(name_key, key);
        self.pages.finish(parent)?;

        // Attributes are not structural descendants; only the hash
        // fan-in sees them.
        let mut node = self.pages.prepare(key)?;
        hash_add(&mut self.pages, &self.config, element, &mut node, None)?;
        self.pages.finish(node)?;

        self.cursor = crate::cursor::Cursor::new(match move_after {
            MoveAfterHint::ToParent => element,
            MoveAfterHint::StayOnNew => key,
        });
        Ok(key)
    }

    /// Insert namespace on an element; duplicate prefix fails
    /// `DuplicateNamespace`.
    pub(crate) fn insert_namespace(
        &mut self,
        element: NodeKey,
        prefix: &str,
        uri: &str,
        move_after: MoveAfterHint,
    ) -> Result<NodeKey> {
        let elem = self
            .pages
            .get(element)?
            .ok_or(Error::BadArgument("insert namespace: no such element"))?;
        if elem.kind() != NodeKind::Element {
            return Err(Error::BadArgument("insert namespace: target is not an element"));
        }

        let (name_key, uri_key) = register_name(&mut self.pages, prefix, Some(uri))?;
        let duplicate = elem
            .namespaces()
            .unwrap()
            .iter()
            .any(|&k| {
                self.pages
                    .get(k)
                    .ok()
                    .flatten()
                    .and_then(|n| n.named().map(|n| n.name_key))
                    == Some(name_key)
            });
        if duplicate {
            super::release_name(&mut self.pages, name_key, uri_key)?;
            return Err(Error::DuplicateNamespace);
        }

        let created = self
            .pages
            .create(Node::new_namespace(0, element, name_key, uri_key))?;
        let key = created.key();

        let mut parent = self.pages.prepare(element)?;
        parent.namespaces_mut().unwrap().push(key);
        self.pages.finish(parent)?;

        let mut node = self.pages.prepare(key)?;
        hash_add(&mut self.pages, &self.config, element, &mut node, None)?;
        self.pages.finish(node)?;

        self.cursor = crate::cursor::Cursor::new(match move_after {
            MoveAfterHint::ToParent => element,
            MoveAfterHint::StayOnNew => key,
        });
        Ok(key)
    }
}
