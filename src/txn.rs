//! Transaction lifecycle: modification counting, intermediate commit,
//! commit, abort, revert-to-revision, close, and scheduled auto-commit.
//!
//! "Edit + hash update + access-counter bump" is kept atomic by a single
//! [`parking_lot::Mutex`] guarding [`Inner`]; the auto-commit timer is a
//! background thread holding the same `Arc<Mutex<Inner>>`, cancelled via a
//! `crossbeam_channel` signal on close.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::config::ResourceConfig;
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::hash::recompute_postorder;
use crate::node::{NodeKey, ROOT_KEY};
use crate::page::{PageAdapter, PageTransaction, Session, UberPage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxnState {
    Open,
    Closed,
}

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct Inner<P: PageTransaction> {
    pub(crate) pages: PageAdapter<P>,
    pub(crate) cursor: Cursor,
    pub(crate) config: ResourceConfig,
    pub(crate) state: TxnState,
    pub(crate) modifications: u64,
    pub(crate) bulk_insert: bool,
    pub(crate) write_revision: u64,
    /// True until the first successful commit of this resource ever
    /// happens; gates the eventual-consistency bootstrap carve-out of §4.6.
    pub(crate) bootstrap: bool,
}

/// The write-side transaction: cursor, structural editor, hash engine
/// driver, and lifecycle, mounted on top of a [`Session`]'s page layer.
pub struct WriteTransaction<S: Session> {
    pub(crate) transaction_id: u64,
    pub(crate) session: Arc<S>,
    pub(crate) shared: Arc<Mutex<Inner<S::PageTxn>>>,
    auto_commit: Mutex<Option<AutoCommitHandle>>,
}

struct AutoCommitHandle {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl<S> WriteTransaction<S>
where
    S: Session + Send + Sync + 'static,
    S::PageTxn: 'static,
{
    /// Opens a write transaction reading from `read_rev` and writing
    /// `write_rev`, starting the auto-commit timer if configured.
    pub fn open(session: S, read_rev: u64, write_rev: u64) -> Result<Self> {
        let config = session.resource_config();
        config.validate()?;
        let transaction_id = NEXT_TXN_ID.fetch_add(1, Ordering::Relaxed);
        let pages = session.create_page_write_transaction(transaction_id, read_rev, write_rev)?;
        let inner = Inner {
            pages: PageAdapter::new(pages),
            cursor: Cursor::new(ROOT_KEY),
            config: config.clone(),
            state: TxnState::Open,
            modifications: 0,
            bulk_insert: false,
            write_revision: write_rev,
            bootstrap: read_rev == 0,
        };
        let shared = Arc::new(Mutex::new(inner));
        let session = Arc::new(session);

        let auto_commit = config.auto_commit_interval.map(|interval| {
            spawn_auto_commit(transaction_id, session.clone(), shared.clone(), interval)
        });

        Ok(WriteTransaction {
            transaction_id,
            session,
            shared,
            auto_commit: Mutex::new(auto_commit),
        })
    }

    pub fn transaction_id(&self) -> u64 {
        self.transaction_id
    }

    pub fn revision_number(&self) -> u64 {
        self.shared.lock().write_revision
    }

    pub fn max_node_key(&self) -> NodeKey {
        self.shared.lock().pages.max_node_key()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().state == TxnState::Closed
    }

    /// Locks the shared state, runs the `check_access_and_commit()`
    /// preamble every edit op requires, then runs `f`.
    pub(crate) fn with_edit<R>(
        &self,
        f: impl FnOnce(&mut Inner<S::PageTxn>) -> Result<R>,
    ) -> Result<R> {
        log::trace!("with_edit: enter, txn={}", self.transaction_id);
        let mut inner = self.shared.lock();
        check_access_and_commit(&self.session, &mut inner)?;
        let result = f(&mut inner);
        log::trace!("with_edit: finished, txn={}", self.transaction_id);
        result
    }

    /// Verify root's child_count is at most one, optionally run the
    /// bootstrap post-order repair pass, delegate to the page layer, publish
    /// the new uber-page, rotate to a fresh page transaction for the next
    /// revision.
    pub fn commit(&self) -> Result<UberPage> {
        let mut inner = self.shared.lock();
        commit_locked(&self.session, &mut inner)
    }

    /// Reset modifications, discard uncommitted edits, and reopen at the
    /// last committed revision (or revision 0 if none has happened yet).
    pub fn abort(&self) -> Result<()> {
        log::trace!("abort: enter, txn={}", self.transaction_id);
        let mut inner = self.shared.lock();
        if inner.state != TxnState::Open {
            return Err(Error::Usage("abort on a non-open transaction"));
        }
        inner.pages.close()?;
        let base = if inner.bootstrap { 0 } else { inner.write_revision.saturating_sub(1) };
        let fresh = self
            .session
            .create_page_write_transaction(self.transaction_id, base, base + 1)?;
        inner.pages = PageAdapter::new(fresh);
        inner.write_revision = base + 1;
        inner.modifications = 0;
        inner.bulk_insert = false;
        inner.cursor = Cursor::new(ROOT_KEY);
        log::trace!("abort: finished, txn={}", self.transaction_id);
        Ok(())
    }

    /// Reopen with read base `rev` and write revision `current - 1`;
    /// cursor moves to root.
    pub fn revert_to(&self, rev: u64) -> Result<()> {
        let mut inner = self.shared.lock();
        if inner.state != TxnState::Open {
            return Err(Error::Usage("revert_to on a non-open transaction"));
        }
        self.session.assert_access(rev)?;
        inner.pages.close()?;
        let write_rev = inner.write_revision.saturating_sub(1).max(rev + 1);
        let fresh = self
            .session
            .create_page_write_transaction(self.transaction_id, rev, write_rev)?;
        inner.pages = PageAdapter::new(fresh);
        inner.write_revision = write_rev;
        inner.modifications = 0;
        inner.cursor = Cursor::new(ROOT_KEY);
        Ok(())
    }

    /// Fails with [`Error::DirtyOnClose`] if modifications are outstanding;
    /// otherwise releases resources and cancels the auto-commit timer,
    /// waiting a bounded grace period for it to terminate.
    pub fn close(&self) -> Result<()> {
        {
            let mut inner = self.shared.lock();
            if inner.modifications > 0 {
                return Err(Error::DirtyOnClose(inner.modifications));
            }
            inner.pages.close()?;
            inner.state = TxnState::Closed;
        }
        self.session.close_write_transaction(self.transaction_id)?;
        if let Some(handle) = self.auto_commit.lock().take() {
            let _ = handle.stop_tx.send(());
            let grace = Duration::from_millis(500);
            let (done_tx, done_rx) = bounded::<()>(1);
            // Join with a bounded wait: spawn a watcher thread so we never
            // block `close()` itself indefinitely.
            let joiner = std::thread::spawn(move || {
                let _ = handle.handle.join();
                let _ = done_tx.send(());
            });
            match done_rx.recv_timeout(grace) {
                Ok(()) => {
                    let _ = joiner.join();
                    Ok(())
                }
                Err(_) => Err(Error::ThreadInterrupted(
                    "auto-commit thread did not stop within the grace period",
                )),
            }
        } else {
            Ok(())
        }
    }
}

pub(crate) fn check_access_and_commit<S: Session>(
    session: &S,
    inner: &mut Inner<S::PageTxn>,
) -> Result<()> {
    if inner.state != TxnState::Open {
        return Err(Error::Usage("transaction is not open"));
    }
    inner.modifications += 1;
    if inner.config.max_node_count > 0 && inner.modifications > inner.config.max_node_count {
        commit_locked(session, inner)?;
    }
    Ok(())
}

pub(crate) fn commit_locked<S: Session>(
    session: &S,
    inner: &mut Inner<S::PageTxn>,
) -> Result<UberPage> {
    log::trace!("commit: enter, modifications={}", inner.modifications);
    if inner.state != TxnState::Open {
        return Err(Error::Usage("commit on a non-open transaction"));
    }
    let root = inner
        .pages
        .get(ROOT_KEY)?
        .ok_or(Error::InvariantViolation("commit: document root missing"))?;
    if root.child_count() > 1 {
        return Err(Error::InvariantViolation("root holds more than one child"));
    }

    if inner.config.consistency == crate::config::Consistency::Eventual
        && inner.bootstrap
        && inner.modifications > 0
    {
        log::debug!("commit: running bootstrap post-order repair pass");
        crate::ingest::recompute_descendant_counts(&mut inner.pages, ROOT_KEY)?;
        recompute_postorder(&mut inner.pages, &inner.config, ROOT_KEY)?;
    }

    let page = inner.pages.commit()?;
    session.set_last_committed_uber_page(page)?;

    let next_write_rev = page.revision + 1;
    let fresh = session.create_page_write_transaction(0, page.revision, next_write_rev)?;
    inner.pages = PageAdapter::new(fresh);
    inner.write_revision = next_write_rev;
    inner.modifications = 0;
    inner.bulk_insert = false;
    inner.bootstrap = false;

    log::trace!("commit: finished, revision={}", page.revision);
    Ok(page)
}

fn spawn_auto_commit<S>(
    _txn_id: u64,
    session: Arc<S>,
    shared: Arc<Mutex<Inner<S::PageTxn>>>,
    interval: Duration,
) -> AutoCommitHandle
where
    S: Session + Send + Sync + 'static,
    S::PageTxn: 'static,
{
    let (stop_tx, stop_rx): (Sender<()>, Receiver<()>) = bounded(1);
    let handle = std::thread::spawn(move || loop {
        match stop_rx.recv_timeout(interval) {
            Ok(()) => break,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                let mut inner = shared.lock();
                if inner.state != TxnState::Open {
                    break;
                }
                if let Err(e) = commit_locked(session.as_ref(), &mut inner) {
                    log::warn!("auto-commit failed: {e}");
                }
            }
        }
    });
    AutoCommitHandle { stop_tx, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::InMemorySession;

    #[test]
    fn open_commit_rotates_revision() {
        let session = InMemorySession::new(ResourceConfig::default());
        let txn = WriteTransaction::open(session, 0, 1).unwrap();
        assert_eq!(txn.revision_number(), 1);
        let page = txn.commit().unwrap();
        assert_eq!(page.revision, 1);
        assert_eq!(txn.revision_number(), 2);
    }

    #[test]
    fn close_with_dirty_modifications_fails() {
        let session = InMemorySession::new(ResourceConfig::default());
        let txn = WriteTransaction::open(session, 0, 1).unwrap();
        {
            let mut inner = txn.shared.lock();
            check_access_and_commit(&txn.session, &mut inner).unwrap();
        }
        assert!(matches!(txn.close(), Err(Error::DirtyOnClose(1))));
    }

    #[test]
    fn close_without_modifications_succeeds() {
        let session = InMemorySession::new(ResourceConfig::default());
        let txn = WriteTransaction::open(session, 0, 1).unwrap();
        assert!(txn.close().is_ok());
        assert!(txn.is_closed());
    }
}
