// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{CloseCallback, OuterCloseCallback, Outcome, Transaction, TransactionId};
use crate::error::TransactionError;
use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};
use tracing::{debug, trace, warn};

// Shared by all managers, so that participants can tell transactions of different managers apart.
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Bookkeeping for one open transaction. The frame at index `n` of the stack belongs to the open
/// transaction at depth `n`.
struct Frame {
    id: TransactionId,
    closing: bool,
    close_callbacks: VecDeque<Rc<dyn CloseCallback>>,
    outer_close_callbacks: Vec<Rc<dyn OuterCloseCallback>>,
}

impl Frame {
    fn new(id: TransactionId) -> Self {
        Self {
            id,
            closing: false,
            close_callbacks: VecDeque::new(),
            outer_close_callbacks: Vec::new(),
        }
    }
}

/// Owner of the stack of open transactions for one logical execution context.
///
/// A manager hands out at most one root [`Transaction`] at a time; everything else is nested
/// inside it. It is neither `Send` nor `Sync`: keep one manager per thread (for example, one per
/// simulation thread) and pass transactions explicitly to the code that mutates state.
///
/// # Example
///
/// ```
/// use transfer_tx::TransactionManager;
///
/// let manager = TransactionManager::new();
/// let mut root = manager.open_root().unwrap();
/// {
///     let nested = root.open_nested();
///     assert_eq!(nested.depth(), 1);
///     assert!(nested.commit().was_committed());
/// }
/// assert!(root.abort().was_aborted());
/// assert!(!manager.is_open());
/// ```
#[derive(Default)]
pub struct TransactionManager {
    stack: RefCell<Vec<Frame>>,
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stack = self.stack.borrow();
        f.debug_struct("TransactionManager")
            .field("open", &stack.iter().map(|frame| frame.id).collect::<Vec<_>>())
            .finish()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a transaction at depth 0.
    ///
    /// Fails if any transaction is still open in this manager; use
    /// [`Transaction::open_nested`] to nest instead.
    pub fn open_root(&self) -> Result<Transaction<'_>, TransactionError> {
        let mut stack = self.stack.borrow_mut();
        if let Some(depth) = stack.len().checked_sub(1) {
            return Err(TransactionError::AlreadyOpen { depth });
        }
        let id = allocate_id();
        stack.push(Frame::new(id));
        trace!(%id, depth = 0, "opened root transaction");
        Ok(Transaction::new(self, id, 0))
    }

    /// Returns true while any transaction is open.
    pub fn is_open(&self) -> bool {
        !self.stack.borrow().is_empty()
    }

    /// Depth of the innermost open transaction, if any.
    pub fn current_depth(&self) -> Option<usize> {
        self.stack.borrow().len().checked_sub(1)
    }

    pub(super) fn open_nested(&self, parent: TransactionId, parent_depth: usize) -> TransactionId {
        let mut stack = self.stack.borrow_mut();
        match stack.last() {
            Some(frame) if frame.id == parent && stack.len() == parent_depth + 1 => {
                if frame.closing {
                    panic!("cannot open a nested transaction inside closing transaction {parent}");
                }
            }
            _ => panic!(
                "cannot open a nested transaction inside {parent}: it is not the innermost open transaction"
            ),
        }
        let id = allocate_id();
        stack.push(Frame::new(id));
        trace!(%id, depth = parent_depth + 1, %parent, "opened nested transaction");
        id
    }

    pub(super) fn is_innermost(&self, id: TransactionId) -> bool {
        self.stack.borrow().last().is_some_and(|frame| frame.id == id)
    }

    pub(super) fn is_closing(&self, id: TransactionId) -> bool {
        self.stack
            .borrow()
            .iter()
            .any(|frame| frame.id == id && frame.closing)
    }

    pub(super) fn add_close_callback(
        &self,
        id: TransactionId,
        depth: usize,
        callback: Rc<dyn CloseCallback>,
    ) {
        let mut stack = self.stack.borrow_mut();
        match stack.get_mut(depth) {
            Some(frame) if frame.id == id && !frame.closing => {
                frame.close_callbacks.push_back(callback)
            }
            Some(frame) if frame.id == id => {
                panic!("cannot register a close callback with {id} while it is closing")
            }
            _ => panic!("cannot register a close callback with {id}: it is not open"),
        }
    }

    pub(super) fn add_parent_close_callback(
        &self,
        id: TransactionId,
        depth: usize,
        callback: Rc<dyn CloseCallback>,
    ) {
        let Some(parent_depth) = depth.checked_sub(1) else {
            panic!("root transaction {id} has no parent to register a close callback with");
        };
        let mut stack = self.stack.borrow_mut();
        if stack.get(depth).is_none_or(|frame| frame.id != id) {
            panic!("cannot register a close callback with the parent of {id}: it is not open");
        }
        stack[parent_depth].close_callbacks.push_back(callback);
    }

    /// Id of the transaction enclosing the one at `depth`, if any.
    pub(super) fn parent_id(&self, depth: usize) -> Option<TransactionId> {
        let parent_depth = depth.checked_sub(1)?;
        self.stack.borrow().get(parent_depth).map(|frame| frame.id)
    }

    pub(super) fn add_outer_close_callback(
        &self,
        id: TransactionId,
        depth: usize,
        callback: Rc<dyn OuterCloseCallback>,
    ) {
        let mut stack = self.stack.borrow_mut();
        match stack.get_mut(depth) {
            Some(frame) if frame.id == id => frame.outer_close_callbacks.push(callback),
            _ => panic!("cannot register an outer close callback with {id}: it is not open"),
        }
    }

    /// Closes the innermost open transaction, which must be `transaction`.
    ///
    /// Close callbacks run while the frame is still on the stack (marked as closing). Each one is
    /// taken off the frame right before it runs, so the frame holds exactly the callbacks that
    /// have not run yet. The frame is popped afterwards; on a root commit the accumulated
    /// outer-close callbacks fire only after that, on a nested commit they move to the parent
    /// frame, on abort they are dropped.
    pub(super) fn close(&self, transaction: &Transaction<'_>, outcome: Outcome) {
        let id = transaction.id();
        let depth = transaction.depth();
        {
            let mut stack = self.stack.borrow_mut();
            let innermost = stack.len().checked_sub(1);
            match stack.last_mut() {
                Some(frame) if frame.id == id && !frame.closing && innermost == Some(depth) => {
                    frame.closing = true;
                    trace!(
                        %id,
                        depth,
                        ?outcome,
                        callbacks = frame.close_callbacks.len(),
                        "closing transaction"
                    );
                }
                Some(frame) if frame.id == id => panic!("transaction {id} is already closing"),
                _ => panic!(
                    "cannot close transaction {id} at depth {depth}: it is not the innermost open transaction"
                ),
            }
        }

        while let Some(callback) = self.next_close_callback() {
            callback.on_close(transaction, outcome);
        }

        let frame = {
            let mut stack = self.stack.borrow_mut();
            let Some(frame) = stack.pop() else {
                unreachable!("frame of {id} vanished while closing");
            };
            debug_assert_eq!(frame.id, id);
            debug_assert!(frame.close_callbacks.is_empty());
            if outcome.was_committed() {
                if let Some(parent) = stack.last_mut() {
                    parent.outer_close_callbacks.extend(frame.outer_close_callbacks);
                    return;
                }
            }
            frame
        };

        match outcome {
            Outcome::Committed => {
                debug!(
                    %id,
                    outer_close_callbacks = frame.outer_close_callbacks.len(),
                    "root transaction committed"
                );
                for callback in frame.outer_close_callbacks {
                    callback.after_outer_commit();
                }
            }
            Outcome::Aborted => {
                debug!(
                    %id,
                    depth,
                    discarded_outer_close_callbacks = frame.outer_close_callbacks.len(),
                    "transaction aborted"
                );
            }
        }
    }

    fn next_close_callback(&self) -> Option<Rc<dyn CloseCallback>> {
        self.stack.borrow_mut().last_mut()?.close_callbacks.pop_front()
    }

    /// Aborts the frame of `id`, and every frame above it, after a panic interrupted the regular
    /// close (a callback panicked mid-close, or a leaked child was left open).
    ///
    /// Frames are popped innermost first and their remaining close callbacks run with
    /// [`Outcome::Aborted`], so participants restore their state and clear their snapshot slots.
    /// Outer-close callbacks are dropped. A callback panicking here aborts the process.
    pub(super) fn discard_interrupted(&self, id: TransactionId) {
        let Some(position) = self.stack.borrow().iter().position(|frame| frame.id == id) else {
            return;
        };
        loop {
            let (depth, frame) = {
                let mut stack = self.stack.borrow_mut();
                if stack.len() <= position {
                    return;
                }
                let depth = stack.len() - 1;
                let Some(frame) = stack.pop() else {
                    return;
                };
                (depth, frame)
            };
            warn!(
                id = %frame.id,
                depth,
                callbacks = frame.close_callbacks.len(),
                "aborting transaction interrupted by a panic"
            );
            let interrupted = Transaction::detached(self, frame.id, depth);
            for callback in frame.close_callbacks {
                callback.on_close(&interrupted, Outcome::Aborted);
            }
        }
    }
}

fn allocate_id() -> TransactionId {
    TransactionId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}
