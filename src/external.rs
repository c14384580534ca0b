//! Collaborator interfaces this crate consumes beyond the page layer itself:
//! the subtree-ingest event source, and the read-transaction / visitor pair
//! used by `replace` and `copy subtree`.
//!
//! XML parsing and shredding are out of scope here; both `IngestEvent` and
//! [`TreeVisitor`] carry literal qualified-name text rather than resolved
//! [`crate::node::NameKey`] hashes, since re-registering a name in the
//! destination's name dictionary ([`crate::page::PageTransaction::create_name_key`])
//! needs the text, not a hash computed against a dictionary the destination
//! may not share.

use crate::error::Result;

/// One SAX-like event from an external XML shredder, fed into
/// [`crate::txn::WriteTransaction::ingest_subtree`] or a `replace_with_fragment`
/// call. The core never parses XML itself.
#[derive(Debug, Clone)]
pub enum IngestEvent {
    StartDocument,
    StartElement {
        local_name: String,
        uri: Option<String>,
        attributes: Vec<(String, Option<String>, Vec<u8>)>,
        namespaces: Vec<(String, String)>,
    },
    Text(Vec<u8>),
    EndElement,
    EndDocument,
}

/// Driven by [`ReadTransaction::visit`] while copying or replacing a
/// subtree; implemented by the destination write transaction's copy driver.
pub trait TreeVisitor {
    fn start_element(
        &mut self,
        local_name: &str,
        uri: Option<&str>,
        attributes: &[(String, Option<String>, Vec<u8>, bool)],
        namespaces: &[(String, String)],
    ) -> Result<()>;

    fn text(&mut self, value: &[u8], compressed: bool) -> Result<()>;

    fn end_element(&mut self) -> Result<()>;
}

/// A positional read cursor on any revision of any resource, used as the
/// source for `replace` (by subtree) and `copy subtree`.
pub trait ReadTransaction: Send {
    fn kind(&self) -> crate::node::NodeKind;

    /// The resolved qualified name at the current position — `None` for
    /// nodes that carry no name (Root, Text).
    fn qname(&self) -> Option<(String, Option<String>)>;

    /// The opaque byte value at the current position, for Text/Attribute
    /// nodes; `None` for everything else.
    fn value(&self) -> Option<(Vec<u8>, bool)>;

    fn revision_number(&self) -> u64;

    /// Open a read transaction on a different revision of the same resource.
    fn begin_node_read_trx(&self, revision: u64) -> Result<Box<dyn ReadTransaction>>;

    /// Drive `visitor` in document order over the subtree rooted at the
    /// cursor's current position.
    fn visit(&self, visitor: &mut dyn TreeVisitor) -> Result<()>;
}
