//! Thin façade over the external page transaction: fetch, the
//! prepare/finish copy-on-write protocol, node allocation/removal, and
//! name-dictionary registration. This module never validates tree
//! invariants — that is the structural editor's job.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::ResourceConfig;
use crate::error::{Error, Result};
use crate::node::{NameDictKind, NameKey, Node, NodeKey};

/// The root page of one revision, published atomically on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UberPage {
    pub revision: u64,
    pub root_page_key: NodeKey,
}

/// The page transaction contract this crate consumes. Implemented by the
/// (out of scope) page layer; an in-memory double lives at
/// [`crate::testkit::InMemoryPages`] for this crate's own tests.
pub trait PageTransaction: Send {
    /// Read-only, cheap fetch. Returns `None` for a dead or unknown key.
    fn get(&self, key: NodeKey) -> Result<Option<Node>>;

    /// Acquire a node for mutation. The page layer guarantees this produces
    /// a copy-on-write copy in the current revision if the node was read
    /// from a prior one.
    fn prepare(&mut self, key: NodeKey) -> Result<Node>;

    /// Release a node acquired via [`PageTransaction::prepare`], persisting
    /// whatever field writes happened in between.
    fn finish(&mut self, node: Node) -> Result<()>;

    /// Allocate the next key from the revision root page and persist
    /// `template` under it, returning the stored node (with its key
    /// filled in).
    fn create(&mut self, template: Node) -> Result<Node>;

    /// Mark `node`'s key dead in the current revision.
    fn remove(&mut self, node: &Node) -> Result<()>;

    /// Register (or refcount-increment) a name in the revision's name page.
    fn create_name_key(&mut self, text: &str, kind: NameDictKind) -> Result<NameKey>;

    /// Refcount-decrement a name; the entry is freed once it reaches zero.
    fn remove_name(&mut self, name_key: NameKey, kind: NameDictKind) -> Result<()>;

    /// The highest key ever allocated in this revision.
    fn max_node_key(&self) -> NodeKey;

    /// The key of this revision's root page.
    fn actual_revision_root_page(&self) -> NodeKey;

    /// The uber-page this transaction is currently building on top of.
    fn uber_page(&self) -> UberPage;

    /// Publish a new uber-page, delegated entirely to the page layer.
    fn commit(&mut self) -> Result<UberPage>;

    /// Release page-layer resources held by this transaction.
    fn close(&mut self) -> Result<()>;
}

/// Wraps a [`PageTransaction`] and enforces the one rule the contract
/// requires of callers: no two `prepare` calls for the same key may nest.
/// Everything else is a direct pass-through.
pub struct PageAdapter<P: PageTransaction> {
    inner: P,
    prepared: HashSet<NodeKey>,
}

impl<P: PageTransaction> PageAdapter<P> {
    pub fn new(inner: P) -> Self {
        PageAdapter {
            inner,
            prepared: HashSet::new(),
        }
    }

    pub fn into_inner(self) -> P {
        self.inner
    }

    pub fn config_compressed_value(
        &self,
        config: &ResourceConfig,
        value: &[u8],
    ) -> Result<(Vec<u8>, bool)> {
        crate::compression::maybe_compress(value, config.compression)
    }
}

impl<P: PageTransaction> PageTransaction for PageAdapter<P> {
    fn get(&self, key: NodeKey) -> Result<Option<Node>> {
        self.inner.get(key)
    }

    fn prepare(&mut self, key: NodeKey) -> Result<Node> {
        if !self.prepared.insert(key) {
            return Err(Error::Usage("nested prepare() for the same node key"));
        }
        match self.inner.prepare(key) {
            Ok(node) => Ok(node),
            Err(e) => {
                self.prepared.remove(&key);
                Err(e)
            }
        }
    }

    fn finish(&mut self, node: Node) -> Result<()> {
        self.prepared.remove(&node.key());
        self.inner.finish(node)
    }

    fn create(&mut self, template: Node) -> Result<Node> {
        self.inner.create(template)
    }

    fn remove(&mut self, node: &Node) -> Result<()> {
        self.inner.remove(node)
    }

    fn create_name_key(&mut self, text: &str, kind: NameDictKind) -> Result<NameKey> {
        self.inner.create_name_key(text, kind)
    }

    fn remove_name(&mut self, name_key: NameKey, kind: NameDictKind) -> Result<()> {
        self.inner.remove_name(name_key, kind)
    }

    fn max_node_key(&self) -> NodeKey {
        self.inner.max_node_key()
    }

    fn actual_revision_root_page(&self) -> NodeKey {
        self.inner.actual_revision_root_page()
    }

    fn uber_page(&self) -> UberPage {
        self.inner.uber_page()
    }

    fn commit(&mut self) -> Result<UberPage> {
        if !self.prepared.is_empty() {
            return Err(Error::InvariantViolation(
                "commit with nodes still prepared (unbalanced prepare/finish)",
            ));
        }
        self.inner.commit()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

/// The host-provided façade this crate's write transaction talks to for
/// everything outside the page layer: opening/closing page transactions,
/// access assertions, publishing the committed uber-page, and resource
/// configuration.
pub trait Session: Send {
    type PageTxn: PageTransaction;

    fn create_page_write_transaction(
        &self,
        txn_id: u64,
        read_rev: u64,
        write_rev: u64,
    ) -> Result<Self::PageTxn>;

    fn close_write_transaction(&self, txn_id: u64) -> Result<()>;

    fn assert_access(&self, rev: u64) -> Result<()>;

    fn set_last_committed_uber_page(&self, page: UberPage) -> Result<()>;

    fn resource_config(&self) -> ResourceConfig;
}
