use crate::error::{Error, Result};
use crate::hash::hash_remove;
use crate::node::{is_null, NodeKey, NodeKind};
use crate::page::PageTransaction;
use crate::txn::Inner;

use super::{detach_structural, merge_adjacent_text, own_subtree_count, release_name, skip_descendant_accounting};

impl<P: PageTransaction> Inner<P> {
    /// Remove `target` and its entire subtree (attributes, namespaces,
    /// descendants), rewiring neighbors and folding the removal into the
    /// hash/descendant-count chain. Fails `CannotRemoveRoot` on the root.
    pub(crate) fn remove(&mut self, target: NodeKey) -> Result<()> {
        let node = self
            .pages
            .get(target)?
            .ok_or(Error::BadArgument("remove: no such node"))?;

        if node.kind() == NodeKind::Attribute || node.kind() == NodeKind::Namespace {
            return self.remove_attribute_or_namespace(target, node);
        }

        let (parent_key, left, right) = self.remove_structural_no_merge(target, &node)?;
        let merged = merge_adjacent_text(&mut self.pages, &self.config, self.bootstrap, left, right)?;

        self.cursor = crate::cursor::Cursor::new(if let Some(survivor) = merged {
            survivor
        } else if !is_null(right) {
            right
        } else if !is_null(left) {
            left
        } else {
            parent_key
        });
        Ok(())
    }

    /// Core of [`Self::remove`] without the post-removal text-merge or
    /// cursor repositioning, shared with `replace`'s "vacate, then refill the
    /// same slot" dance. Fails `CannotRemoveRoot` on the root; rejects
    /// Attribute/Namespace (those go through `remove_attribute_or_namespace`).
    /// Returns `(parent_key, former_left, former_right)`.
    pub(crate) fn remove_structural_no_merge(
        &mut self,
        target: NodeKey,
        node: &crate::node::Node,
    ) -> Result<(NodeKey, NodeKey, NodeKey)> {
        if node.kind() == NodeKind::Root {
            return Err(Error::CannotRemoveRoot);
        }

        let parent_key = node.parent_key();
        let (left, right) = {
            let s = node.structural().unwrap();
            (s.left_sibling_key, s.right_sibling_key)
        };
        let own_count = own_subtree_count(node);
        let own_hash = node.hash();

        self.remove_subtree_contents(target)?;

        detach_structural(&mut self.pages, target)?;
        self.release_node_name(node)?;
        self.pages.remove(node)?;

        let removed = if skip_descendant_accounting(&self.config, self.bootstrap) {
            None
        } else {
            Some(own_count)
        };
        hash_remove(&mut self.pages, &self.config, parent_key, own_hash, removed)?;

        Ok((parent_key, left, right))
    }

    fn remove_attribute_or_namespace(&mut self, target: NodeKey, node: crate::node::Node) -> Result<()> {
        let parent_key = node.parent_key();
        let own_hash = node.hash();
        let mut parent = self.pages.prepare(parent_key)?;
        match node.kind() {
            NodeKind::Attribute => {
                if let Some(attrs) = parent.attributes_mut() {
                    attrs.retain(|_, &mut v| v != target);
                }
            }
            NodeKind::Namespace => {
                if let Some(nss) = parent.namespaces_mut() {
                    nss.retain(|&k| k != target);
                }
            }
            _ => unreachable!(),
        }
        self.pages.finish(parent)?;
        self.release_node_name(&node)?;
        self.pages.remove(&node)?;
        hash_remove(&mut self.pages, &self.config, parent_key, own_hash, None)?;
        self.cursor = crate::cursor::Cursor::new(parent_key);
        Ok(())
    }

    fn release_node_name(&mut self, node: &crate::node::Node) -> Result<()> {
        if let Some(named) = node.named() {
            release_name(&mut self.pages, named.name_key, named.uri_key)?;
        }
        Ok(())
    }

    /// Depth-first removal of `target`'s attributes, namespaces, and
    /// children (but not `target` itself), decrementing name refcounts as
    /// each is removed.
    fn remove_subtree_contents(&mut self, target: NodeKey) -> Result<()> {
        let node = self.pages.get(target)?.ok_or(Error::InvariantViolation("remove: vanished node"))?;

        if let Some(attrs) = node.attributes() {
            for &attr_key in attrs.values() {
                let attr = self.pages.get(attr_key)?.unwrap();
                self.release_node_name(&attr)?;
                self.pages.remove(&attr)?;
            }
        }
        if let Some(nss) = node.namespaces() {
            for &ns_key in nss {
                let ns = self.pages.get(ns_key)?.unwrap();
                self.release_node_name(&ns)?;
                self.pages.remove(&ns)?;
            }
        }

        if let Some(structural) = node.structural() {
            let mut child = structural.first_child_key;
            while !is_null(child) {
                let child_node = self.pages.get(child)?.unwrap();
                let next = child_node
                    .structural()
                    .map(|s| s.right_sibling_key)
                    .unwrap_or(crate::node::NULL_KEY);
                self.remove_subtree_contents(child)?;
                self.release_node_name(&child_node)?;
                self.pages.remove(&child_node)?;
                child = next;
            }
        }
        Ok(())
    }
}
