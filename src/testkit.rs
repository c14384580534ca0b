//! An in-memory double for the page layer / session / read-transaction
//! collaborators. This crate's own tests and doctests run against it; it is
//! not meant to be a real storage engine.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::external::{ReadTransaction, TreeVisitor};
use crate::node::{NameDictKind, NameKey, Node, NodeKey, ROOT_KEY};
use crate::page::{PageTransaction, UberPage};

struct NameEntry {
    text: String,
    refcount: u32,
}

struct Store {
    revisions: Vec<HashMap<NodeKey, Node>>,
    names: HashMap<NameKey, NameEntry>,
    next_key: NodeKey,
}

impl Store {
    fn new() -> Self {
        let mut root_rev = HashMap::new();
        root_rev.insert(ROOT_KEY, Node::new_root(ROOT_KEY));
        Store {
            revisions: vec![root_rev],
            names: HashMap::new(),
            next_key: ROOT_KEY + 1,
        }
    }
}

/// A single `prepare`/`finish`/`create` working set overlaid on top of a
/// committed base revision. Mirrors [`crate::page::PageTransaction`]
/// directly.
pub struct InMemoryPages {
    store: Arc<Mutex<Store>>,
    overlay: HashMap<NodeKey, Node>,
    dead: HashSet<NodeKey>,
    base_revision: u64,
    write_revision: u64,
}

impl InMemoryPages {
    pub fn new() -> Self {
        InMemoryPages {
            store: Arc::new(Mutex::new(Store::new())),
            overlay: HashMap::new(),
            dead: HashSet::new(),
            base_revision: 0,
            write_revision: 1,
        }
    }

    fn open(store: Arc<Mutex<Store>>, base_revision: u64, write_revision: u64) -> Self {
        InMemoryPages {
            store,
            overlay: HashMap::new(),
            dead: HashSet::new(),
            base_revision,
            write_revision,
        }
    }

    fn base_snapshot(&self) -> Result<HashMap<NodeKey, Node>> {
        let store = self.store.lock().unwrap();
        store
            .revisions
            .get(self.base_revision as usize)
            .cloned()
            .ok_or(Error::BadArgument("revert_to: target revision is not accessible"))
    }
}

impl Default for InMemoryPages {
    fn default() -> Self {
        InMemoryPages::new()
    }
}

impl PageTransaction for InMemoryPages {
    fn get(&self, key: NodeKey) -> Result<Option<Node>> {
        if self.dead.contains(&key) {
            return Ok(None);
        }
        if let Some(node) = self.overlay.get(&key) {
            return Ok(Some(node.clone()));
        }
        let store = self.store.lock().unwrap();
        Ok(store
            .revisions
            .get(self.base_revision as usize)
            .and_then(|snap| snap.get(&key))
            .cloned())
    }

    fn prepare(&mut self, key: NodeKey) -> Result<Node> {
        self.get(key)?
            .ok_or(Error::InvariantViolation("prepare: no such node"))
    }

    fn finish(&mut self, node: Node) -> Result<()> {
        self.dead.remove(&node.key());
        self.overlay.insert(node.key(), node);
        Ok(())
    }

    fn create(&mut self, mut template: Node) -> Result<Node> {
        let key = {
            let mut store = self.store.lock().unwrap();
            let key = store.next_key;
            store.next_key += 1;
            key
        };
        template.delegate.node_key = key;
        self.overlay.insert(key, template.clone());
        Ok(template)
    }

    fn remove(&mut self, node: &Node) -> Result<()> {
        self.overlay.remove(&node.key());
        self.dead.insert(node.key());
        Ok(())
    }

    fn create_name_key(&mut self, text: &str, _kind: NameDictKind) -> Result<NameKey> {
        let hash = crate::hash::intrinsic_hash(&Node::new_text(0, 0, text.as_bytes().to_vec(), false)) as u32;
        let mut store = self.store.lock().unwrap();
        store
            .names
            .entry(hash)
            .and_modify(|e| e.refcount += 1)
            .or_insert(NameEntry {
                text: text.to_string(),
                refcount: 1,
            });
        Ok(hash)
    }

    fn remove_name(&mut self, name_key: NameKey, _kind: NameDictKind) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        if let Some(entry) = store.names.get_mut(&name_key) {
            entry.refcount = entry.refcount.saturating_sub(1);
            if entry.refcount == 0 {
                store.names.remove(&name_key);
            }
        }
        Ok(())
    }

    fn max_node_key(&self) -> NodeKey {
        self.store.lock().unwrap().next_key - 1
    }

    fn actual_revision_root_page(&self) -> NodeKey {
        ROOT_KEY
    }

    fn uber_page(&self) -> UberPage {
        UberPage {
            revision: self.base_revision,
            root_page_key: ROOT_KEY,
        }
    }

    fn commit(&mut self) -> Result<UberPage> {
        let mut snapshot = {
            let store = self.store.lock().unwrap();
            store
                .revisions
                .get(self.base_revision as usize)
                .cloned()
                .unwrap_or_default()
        };
        for key in &self.dead {
            snapshot.remove(key);
        }
        for (key, node) in self.overlay.drain() {
            snapshot.insert(key, node);
        }
        self.dead.clear();

        let mut store = self.store.lock().unwrap();
        let revision = self.write_revision;
        if revision as usize == store.revisions.len() {
            store.revisions.push(snapshot);
        } else {
            store.revisions[revision as usize] = snapshot;
        }
        drop(store);

        self.base_revision = revision;
        self.write_revision = revision + 1;
        Ok(UberPage {
            revision,
            root_page_key: ROOT_KEY,
        })
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A host session double: hands out fresh [`InMemoryPages`] sharing one
/// [`Store`], and records the last committed uber-page.
pub struct InMemorySession {
    store: Arc<Mutex<Store>>,
    last_committed: Arc<Mutex<UberPage>>,
    config: crate::config::ResourceConfig,
}

impl InMemorySession {
    pub fn new(config: crate::config::ResourceConfig) -> Self {
        InMemorySession {
            store: Arc::new(Mutex::new(Store::new())),
            last_committed: Arc::new(Mutex::new(UberPage {
                revision: 0,
                root_page_key: ROOT_KEY,
            })),
            config,
        }
    }

    pub fn last_committed(&self) -> UberPage {
        *self.last_committed.lock().unwrap()
    }

    /// Open a read-only view on a committed revision, for tests that play
    /// the role of "a reader holding an older revision".
    pub fn open_read(&self, revision: u64) -> Result<InMemoryReadTxn> {
        let store = self.store.lock().unwrap();
        if revision as usize >= store.revisions.len() {
            return Err(Error::BadArgument("revision is not accessible"));
        }
        Ok(InMemoryReadTxn {
            store: self.store.clone(),
            revision,
            current: ROOT_KEY,
        })
    }
}

impl crate::page::Session for InMemorySession {
    type PageTxn = InMemoryPages;

    fn create_page_write_transaction(
        &self,
        _txn_id: u64,
        read_rev: u64,
        write_rev: u64,
    ) -> Result<InMemoryPages> {
        Ok(InMemoryPages::open(self.store.clone(), read_rev, write_rev))
    }

    fn close_write_transaction(&self, _txn_id: u64) -> Result<()> {
        Ok(())
    }

    fn assert_access(&self, rev: u64) -> Result<()> {
        let store = self.store.lock().unwrap();
        if rev as usize >= store.revisions.len() {
            Err(Error::BadArgument("revision is not accessible"))
        } else {
            Ok(())
        }
    }

    fn set_last_committed_uber_page(&self, page: UberPage) -> Result<()> {
        *self.last_committed.lock().unwrap() = page;
        Ok(())
    }

    fn resource_config(&self) -> crate::config::ResourceConfig {
        self.config.clone()
    }
}

/// A read-only cursor over one committed revision, implementing
/// [`ReadTransaction`] for `replace`/`copy subtree` tests.
pub struct InMemoryReadTxn {
    store: Arc<Mutex<Store>>,
    revision: u64,
    current: NodeKey,
}

impl InMemoryReadTxn {
    pub fn move_to(&mut self, key: NodeKey) {
        self.current = key;
    }

    fn node(&self) -> Node {
        let store = self.store.lock().unwrap();
        store.revisions[self.revision as usize]
            .get(&self.current)
            .cloned()
            .expect("read transaction positioned on a dead node")
    }

    fn resolve_name(store: &Store, name_key: NameKey) -> String {
        store
            .names
            .get(&name_key)
            .map(|e| e.text.clone())
            .unwrap_or_default()
    }

    fn resolve_uri(store: &Store, uri_key: NameKey) -> Option<String> {
        if uri_key == crate::node::NULL_NAME_KEY {
            None
        } else {
            Some(Self::resolve_name(store, uri_key))
        }
    }

    fn visit_rec(&self, key: NodeKey, visitor: &mut dyn TreeVisitor) -> Result<()> {
        let store = self.store.lock().unwrap();
        let snapshot = &store.revisions[self.revision as usize];
        let node = snapshot.get(&key).expect("visit: dangling key").clone();
        match &node.data {
            crate::node::NodeData::Element {
                structural,
                named,
                attributes,
                namespaces,
            } => {
                let local_name = Self::resolve_name(&store, named.name_key);
                let uri = Self::resolve_uri(&store, named.uri_key);
                let attrs: Vec<_> = attributes
                    .values()
                    .map(|&k| {
                        let a = snapshot.get(&k).unwrap();
                        let v = a.valued().unwrap();
                        let n = a.named().unwrap();
                        (
                            Self::resolve_name(&store, n.name_key),
                            Self::resolve_uri(&store, n.uri_key),
                            v.value.clone(),
                            v.compressed,
                        )
                    })
                    .collect();
                let nss: Vec<_> = namespaces
                    .iter()
                    .map(|&k| {
                        let n = snapshot.get(&k).unwrap().named().unwrap();
                        (
                            Self::resolve_name(&store, n.name_key),
                            Self::resolve_name(&store, n.uri_key),
                        )
                    })
                    .collect();
                drop(store);
                visitor.start_element(&local_name, uri.as_deref(), &attrs, &nss)?;
                let mut child = structural.first_child_key;
                while !crate::node::is_null(child) {
                    self.visit_rec(child, visitor)?;
                    let store = self.store.lock().unwrap();
                    child = store.revisions[self.revision as usize]
                        .get(&child)
                        .and_then(|n| n.structural())
                        .map(|s| s.right_sibling_key)
                        .unwrap_or(crate::node::NULL_KEY);
                }
                visitor.end_element()?;
            }
            crate::node::NodeData::Text { valued, .. } => {
                drop(store);
                visitor.text(&valued.value, valued.compressed)?;
            }
            _ => {}
        }
        Ok(())
    }
}

impl ReadTransaction for InMemoryReadTxn {
    fn kind(&self) -> crate::node::NodeKind {
        self.node().kind()
    }

    fn qname(&self) -> Option<(String, Option<String>)> {
        let node = self.node();
        let named = node.named()?;
        let store = self.store.lock().unwrap();
        let local_name = Self::resolve_name(&store, named.name_key);
        let uri = Self::resolve_uri(&store, named.uri_key);
        Some((local_name, uri))
    }

    fn value(&self) -> Option<(Vec<u8>, bool)> {
        self.node().valued().map(|v| (v.value.clone(), v.compressed))
    }

    fn revision_number(&self) -> u64 {
        self.revision
    }

    fn begin_node_read_trx(&self, revision: u64) -> Result<Box<dyn ReadTransaction>> {
        let store = self.store.lock().unwrap();
        if revision as usize >= store.revisions.len() {
            return Err(Error::BadArgument("revision is not accessible"));
        }
        drop(store);
        Ok(Box::new(InMemoryReadTxn {
            store: self.store.clone(),
            revision,
            current: ROOT_KEY,
        }))
    }

    fn visit(&self, visitor: &mut dyn TreeVisitor) -> Result<()> {
        self.visit_rec(self.current, visitor)
    }
}
