//! Shared "build a subtree under a destination parent" driver behind both
//! [`crate::external::TreeVisitor`] (copy subtree, replace-by-subtree) and
//! the raw [`crate::external::IngestEvent`] stream (replace-by-fragment,
//! and bulk ingest).

use crate::config::ResourceConfig;
use crate::error::Result;
use crate::external::{IngestEvent, TreeVisitor};
use crate::hash::hash_add;
use crate::node::{Node, NodeKey};
use crate::page::PageTransaction;

use super::{attach_first_child, attach_right_sibling, register_name, skip_descendant_accounting};

/// Builds one subtree under `initial_parent`, as the first child slot
/// there, walking document order. When `suppress_hash` is set (bulk
/// ingest), no per-node hashing happens; the caller runs a post-order pass
/// plus a single ancestor fold once the subtree is complete.
pub struct SubtreeBuilder<'a, P: PageTransaction> {
    pages: &'a mut P,
    config: &'a ResourceConfig,
    bootstrap: bool,
    suppress_hash: bool,
    stack: Vec<(NodeKey, Option<NodeKey>)>,
    root_key: Option<NodeKey>,
}

impl<'a, P: PageTransaction> SubtreeBuilder<'a, P> {
    /// `initial_last_child` seeds the top-level attach point: `None` attaches
    /// the first incoming node as the first child of `initial_parent`,
    /// `Some(left)` attaches it as `left`'s right sibling instead (used by
    /// replace to land the new content exactly where the replaced node sat).
    pub fn new(
        pages: &'a mut P,
        config: &'a ResourceConfig,
        bootstrap: bool,
        initial_parent: NodeKey,
        initial_last_child: Option<NodeKey>,
        suppress_hash: bool,
    ) -> Self {
        SubtreeBuilder {
            pages,
            config,
            bootstrap,
            suppress_hash,
            stack: vec![(initial_parent, initial_last_child)],
            root_key: None,
        }
    }

    /// The last top-level sibling attached so far (the whole top-level run
    /// if the fed content had multiple roots).
    pub fn top_level_last_child(&self) -> Option<NodeKey> {
        self.stack[0].1
    }

    /// The key of the first node inserted — the root of the built subtree.
    pub fn root_key(&self) -> Option<NodeKey> {
        self.root_key
    }

    fn attach_child(&mut self, key: NodeKey) -> Result<NodeKey> {
        let (parent_key, last_child) = *self.stack.last().unwrap();
        match last_child {
            None => attach_first_child(self.pages, parent_key, key)?,
            Some(prev) => attach_right_sibling(self.pages, parent_key, prev, key)?,
        }
        self.stack.last_mut().unwrap().1 = Some(key);
        if self.root_key.is_none() {
            self.root_key = Some(key);
        }
        if !self.suppress_hash {
            let added = if skip_descendant_accounting(self.config, self.bootstrap) {
                None
            } else {
                Some(1)
            };
            let mut node = self.pages.prepare(key)?;
            hash_add(self.pages, self.config, parent_key, &mut node, added)?;
            self.pages.finish(node)?;
        }
        Ok(parent_key)
    }

    fn attach_attribute(&mut self, owner: NodeKey, name_key: crate::node::NameKey, key: NodeKey) -> Result<()> {
        let mut parent = self.pages.prepare(owner)?;
        parent.attributes_mut().unwrap().insert(name_key, key);
        self.pages.finish(parent)?;
        if !self.suppress_hash {
            let mut node = self.pages.prepare(key)?;
            hash_add(self.pages, self.config, owner, &mut node, None)?;
            self.pages.finish(node)?;
        }
        Ok(())
    }

    fn attach_namespace(&mut self, owner: NodeKey, key: NodeKey) -> Result<()> {
        let mut parent = self.pages.prepare(owner)?;
        parent.namespaces_mut().unwrap().push(key);
        self.pages.finish(parent)?;
        if !self.suppress_hash {
            let mut node = self.pages.prepare(key)?;
            hash_add(self.pages, self.config, owner, &mut node, None)?;
            self.pages.finish(node)?;
        }
        Ok(())
    }

    /// Feed one raw ingest event (values taken as-is and freshly
    /// compressed/registered, unlike [`TreeVisitor`] which carries
    /// already-resolved source bytes).
    pub fn feed_event(&mut self, event: &IngestEvent) -> Result<()> {
        match event {
            IngestEvent::StartDocument | IngestEvent::EndDocument => Ok(()),
            IngestEvent::StartElement {
                local_name,
                uri,
                attributes,
                namespaces,
            } => {
                let (name_key, uri_key) = register_name(self.pages, local_name, uri.as_deref())?;
                let created = self.pages.create(Node::new_element(0, 0, name_key, uri_key))?;
                let key = created.key();
                self.attach_child(key)?;
                for (aname, auri, avalue) in attributes {
                    let (an, au) = register_name(self.pages, aname, auri.as_deref())?;
                    let (stored, compressed) =
                        crate::compression::maybe_compress(avalue, self.config.compression)?;
                    let attr = self
                        .pages
                        .create(Node::new_attribute(0, key, an, au, stored, compressed))?;
                    self.attach_attribute(key, an, attr.key())?;
                }
                for (prefix, uri) in namespaces {
                    let (nk, uk) = register_name(self.pages, prefix, Some(uri))?;
                    let ns = self.pages.create(Node::new_namespace(0, key, nk, uk))?;
                    self.attach_namespace(key, ns.key())?;
                }
                self.stack.push((key, None));
                Ok(())
            }
            IngestEvent::Text(value) => {
                let (stored, compressed) = crate::compression::maybe_compress(value, self.config.compression)?;
                let created = self.pages.create(Node::new_text(0, 0, stored, compressed))?;
                self.attach_child(created.key())?;
                Ok(())
            }
            IngestEvent::EndElement => {
                self.stack.pop();
                Ok(())
            }
        }
    }
}

impl<'a, P: PageTransaction> TreeVisitor for SubtreeBuilder<'a, P> {
    fn start_element(
        &mut self,
        local_name: &str,
        uri: Option<&str>,
        attributes: &[(String, Option<String>, Vec<u8>, bool)],
        namespaces: &[(String, String)],
    ) -> Result<()> {
        let (name_key, uri_key) = register_name(self.pages, local_name, uri)?;
        let created = self.pages.create(Node::new_element(0, 0, name_key, uri_key))?;
        let key = created.key();
        self.attach_child(key)?;
        for (aname, auri, avalue, compressed) in attributes {
            let (an, au) = register_name(self.pages, aname, auri.as_deref())?;
            let attr = self
                .pages
                .create(Node::new_attribute(0, key, an, au, avalue.clone(), *compressed))?;
            self.attach_attribute(key, an, attr.key())?;
        }
        for (prefix, uri) in namespaces {
            let (nk, uk) = register_name(self.pages, prefix, Some(uri))?;
            let ns = self.pages.create(Node::new_namespace(0, key, nk, uk))?;
            self.attach_namespace(key, ns.key())?;
        }
        self.stack.push((key, None));
        Ok(())
    }

    fn text(&mut self, value: &[u8], compressed: bool) -> Result<()> {
        let created = self.pages.create(Node::new_text(0, 0, value.to_vec(), compressed))?;
        self.attach_child(created.key())?;
        Ok(())
    }

    fn end_element(&mut self) -> Result<()> {
        self.stack.pop();
        Ok(())
    }
}
