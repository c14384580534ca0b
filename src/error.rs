//! Error taxonomy shared by every public operation in this crate.

use thiserror::Error;

/// The taxonomy of failures a write transaction can surface.
///
/// Variant boundaries follow the propagation policy: `Usage` and
/// `BadArgument` are raised before any page-layer mutation happens, `Io` may
/// leave a node prepared (the caller must `abort`), `InvariantViolation` is
/// fatal at commit time, and `ThreadInterrupted` only ever comes out of the
/// auto-commit shutdown path.
#[derive(Debug, Error)]
pub enum Error {
    /// A page-layer failure surfaced through the page adapter.
    #[error("page layer io error: {0}")]
    Io(#[from] std::io::Error),

    /// Semantic misuse of the API: duplicate attribute/namespace, removing
    /// the root, closing with dirty modifications, invalid configuration.
    #[error("usage error: {0}")]
    Usage(&'static str),

    /// An invalid key or argument was supplied.
    #[error("bad argument: {0}")]
    BadArgument(&'static str),

    /// A duplicate attribute name was supplied with an unequal value.
    #[error("duplicate attribute")]
    DuplicateAttribute,

    /// A duplicate namespace prefix was supplied.
    #[error("duplicate namespace")]
    DuplicateNamespace,

    /// Attempted to remove the document root.
    #[error("cannot remove the document root")]
    CannotRemoveRoot,

    /// `close` was called with unflushed modifications outstanding.
    #[error("transaction has {0} unflushed modification(s) on close")]
    DirtyOnClose(u64),

    /// An internal consistency check failed, or commit observed the root
    /// holding more than one child.
    #[error("invariant violation: {0}")]
    InvariantViolation(&'static str),

    /// The auto-commit shutdown wait was interrupted.
    #[error("auto-commit shutdown interrupted: {0}")]
    ThreadInterrupted(&'static str),
}

/// Result alias used by every public method in this crate.
pub type Result<T> = std::result::Result<T, Error>;
