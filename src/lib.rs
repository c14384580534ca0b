//! `treetxn` is a versioned, page-backed tree store for XML-shaped
//! documents: an in-memory node model sitting on a copy-on-write page
//! layer, a single-position cursor, a structural editor that keeps link and
//! hash invariants in lockstep with every edit, an incremental/post-order
//! hash engine, transaction lifecycle with intermediate and timed
//! auto-commit, and a bulk subtree ingest driver that defers hash
//! maintenance until a whole subtree has landed.
//!
//! The page layer itself — how a [`page::PageTransaction`] turns `prepare`/
//! `finish`/`commit` into bytes on disk — is out of scope; this crate only
//! defines the contract and drives it. Embedders supply a [`page::Session`]
//! and [`page::PageTransaction`] implementation; [`testkit`] ships an
//! in-memory double used by this crate's own tests.

pub mod compression;
pub mod config;
pub mod cursor;
pub mod editor;
pub mod error;
pub mod external;
pub mod hash;
pub mod ingest;
pub mod node;
pub mod page;
pub mod testkit;
pub mod txn;

pub use config::{Consistency, HashKind, ResourceConfig};
pub use editor::{InsertPosition, MoveAfterHint, SubtreeBuilder};
pub use error::{Error, Result};
pub use external::{IngestEvent, ReadTransaction, TreeVisitor};
pub use node::{NameKey, Node, NodeKey, NodeKind, NULL_KEY, NULL_NAME_KEY, ROOT_KEY};
pub use page::{PageTransaction, Session, UberPage};
pub use txn::WriteTransaction;
