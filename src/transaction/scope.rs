// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{CloseCallback, OuterCloseCallback, Outcome, TransactionId, TransactionManager};
use std::{fmt, rc::Rc};

/// An open transaction.
///
/// Obtained from [`TransactionManager::open_root`] or [`Transaction::open_nested`], and closed by
/// [`commit`](Self::commit) or [`abort`](Self::abort). Dropping an open transaction aborts it,
/// so an early return (or `?`) rolls back everything done under it.
///
/// # Nesting
///
/// [`open_nested`](Self::open_nested) mutably borrows the parent, so the parent cannot be used,
/// committed or aborted while the child is open. A child can only ever be closed before its
/// parent, and nested commits stay provisional until the root commits.
///
/// ```
/// use transfer_tx::TransactionManager;
///
/// let manager = TransactionManager::new();
/// let mut root = manager.open_root().unwrap();
/// let child = root.open_nested();
/// // root.commit(); // does not compile: `root` is still borrowed by `child`
/// let _ = child.commit();
/// let _ = root.commit();
/// ```
#[must_use = "a transaction aborts when dropped; call `commit` to keep its changes"]
pub struct Transaction<'m> {
    manager: &'m TransactionManager,
    id: TransactionId,
    depth: usize,
    closed: bool,
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("depth", &self.depth)
            .finish()
    }
}

impl<'m> Transaction<'m> {
    pub(super) fn new(manager: &'m TransactionManager, id: TransactionId, depth: usize) -> Self {
        Self {
            manager,
            id,
            depth,
            closed: false,
        }
    }

    /// A handle to a frame that was already taken off the stack. Dropping it does nothing.
    pub(super) fn detached(
        manager: &'m TransactionManager,
        id: TransactionId,
        depth: usize,
    ) -> Self {
        Self {
            manager,
            id,
            depth,
            closed: true,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Nesting depth: 0 for the root, parent depth + 1 otherwise.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    /// Id of the enclosing transaction, `None` for a root.
    pub fn parent_id(&self) -> Option<TransactionId> {
        self.manager.parent_id(self.depth)
    }

    /// Opens a transaction nested in this one, at `self.depth() + 1`.
    ///
    /// # Panics
    ///
    /// If `self` is not the innermost open transaction (for example because a previously opened
    /// child was leaked with [`std::mem::forget`]), or if `self` is closing.
    pub fn open_nested(&mut self) -> Transaction<'_> {
        let id = self.manager.open_nested(self.id, self.depth);
        Transaction::new(self.manager, id, self.depth + 1)
    }

    /// Registers `callback` to run once when this transaction closes.
    ///
    /// # Panics
    ///
    /// If this transaction is already closing.
    pub fn add_close_callback(&self, callback: Rc<dyn CloseCallback>) {
        self.manager.add_close_callback(self.id, self.depth, callback);
    }

    /// Registers `callback` to run once when the transaction enclosing this one closes.
    ///
    /// Used from [`CloseCallback::on_close`] to hand pending state up to the parent on a nested
    /// commit.
    ///
    /// # Panics
    ///
    /// If this is a root transaction.
    pub fn add_parent_close_callback(&self, callback: Rc<dyn CloseCallback>) {
        self.manager
            .add_parent_close_callback(self.id, self.depth, callback);
    }

    /// Registers `callback` to run once after the root of this transaction commits.
    ///
    /// The callback is dropped without running if this transaction or any enclosing one aborts.
    pub fn add_outer_close_callback(&self, callback: Rc<dyn OuterCloseCallback>) {
        self.manager
            .add_outer_close_callback(self.id, self.depth, callback);
    }

    /// Closes this transaction, keeping its changes.
    ///
    /// A nested commit hands every pending snapshot to the parent; only a root commit makes
    /// changes permanent and fires outer-close callbacks.
    ///
    /// # Panics
    ///
    /// If this is not the innermost open transaction.
    pub fn commit(mut self) -> Outcome {
        self.close(Outcome::Committed)
    }

    /// Closes this transaction, rolling back every change made under it.
    ///
    /// # Panics
    ///
    /// If this is not the innermost open transaction.
    pub fn abort(mut self) -> Outcome {
        self.close(Outcome::Aborted)
    }

    fn close(&mut self, outcome: Outcome) -> Outcome {
        self.manager.close(self, outcome);
        self.closed = true;
        outcome
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if std::thread::panicking() {
            // a callback panicked mid-close, or an outer transaction unwinds past a leaked child
            if self.manager.is_closing(self.id) || !self.manager.is_innermost(self.id) {
                self.manager.discard_interrupted(self.id);
                return;
            }
        }
        self.closed = true;
        self.manager.close(self, Outcome::Aborted);
    }
}
