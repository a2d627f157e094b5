// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Snapshot-based transactional rollback for arbitrary state.
//!
//! Any mutable type can take part in transactions by implementing [`SnapshotParticipant`]:
//! it only has to capture and restore its own state. Wrapping it in a [`Participant`] supplies
//! the rest of the protocol: before each mutation the participant calls
//! [`Participant::notify_pending_change`], which captures a snapshot the first time the state
//! changes at a given nesting depth and registers the close callback that later restores,
//! migrates or releases it.
//!
//! Snapshots live in a slot array indexed by nesting depth. Depth is supplied by the transaction,
//! so the participant never tracks nested scopes itself: at most one snapshot per depth exists,
//! and the snapshot at depth `d` is always the state from before the first change made under the
//! open transaction at depth `d`.

use crate::transaction::{CloseCallback, OuterCloseCallback, Outcome, Transaction, TransactionId};
use smallvec::SmallVec;
use std::{
    cell::{Ref, RefCell},
    fmt,
    rc::Rc,
};

/// State that can be captured into, and restored from, a [`Self::Snapshot`].
#[expect(unused_variables)]
pub trait SnapshotParticipant {
    /// A full capture of the participant's state.
    type Snapshot;

    /// Returns a snapshot of the current state.
    ///
    /// Called at most once per nesting depth between two closes of the transaction at that depth.
    fn create_snapshot(&self) -> Self::Snapshot;

    /// Restores exactly the state captured by `snapshot`. Only called when a transaction aborts.
    fn restore_snapshot(&mut self, snapshot: &Self::Snapshot);

    /// Signals that `snapshot` will not be used anymore; implementations may recycle it.
    fn release_snapshot(&mut self, snapshot: Self::Snapshot) {}

    /// Runs once after the outermost transaction that changed this participant committed.
    ///
    /// This is the place for side effects that cannot be undone, like marking state as needing to
    /// be persisted or notifying neighbours.
    fn on_final_commit(&mut self) {}
}

/// Shared handle that drives the snapshot protocol for a [`SnapshotParticipant`].
///
/// Cloning the handle is cheap and every clone refers to the same state. The state is kept in a
/// `RefCell`, so guards returned by [`borrow`](Self::borrow) must be dropped before a transaction
/// that this participant joined is closed.
pub struct Participant<T: SnapshotParticipant> {
    shared: Rc<Shared<T>>,
}

struct Shared<T: SnapshotParticipant> {
    state: RefCell<T>,
    /// Slot `d` holds the snapshot taken for the open transaction at depth `d`, tagged with
    /// that transaction's id.
    snapshots: RefCell<SmallVec<[Option<(TransactionId, T::Snapshot)>; 4]>>,
}

impl<T: SnapshotParticipant> Clone for Participant<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Participant<T>
where
    T: SnapshotParticipant + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("state", &self.shared.state)
            .field("pending_snapshots", &self.pending_snapshots())
            .finish()
    }
}

impl<T: SnapshotParticipant> Participant<T> {
    pub fn new(state: T) -> Self {
        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(state),
                snapshots: RefCell::new(SmallVec::new()),
            }),
        }
    }

    /// Reads the current state, including changes of still-open transactions.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.shared.state.borrow()
    }

    pub fn read<O>(&self, f: impl FnOnce(&T) -> O) -> O {
        f(&self.shared.state.borrow())
    }

    /// Number of depths that currently hold a snapshot.
    ///
    /// Zero once every transaction this participant joined has closed.
    pub fn pending_snapshots(&self) -> usize {
        self.shared.snapshots.borrow().iter().flatten().count()
    }

    pub fn has_snapshot_at(&self, depth: usize) -> bool {
        self.shared
            .snapshots
            .borrow()
            .get(depth)
            .is_some_and(Option::is_some)
    }

    /// Mutates the state outside of any transaction, for example when loading saved contents.
    ///
    /// # Panics
    ///
    /// If a transaction this participant joined is still open, since the change would escape
    /// its rollback.
    pub fn modify_untracked<O>(&self, f: impl FnOnce(&mut T) -> O) -> O {
        assert_eq!(
            self.pending_snapshots(),
            0,
            "untracked modification of a participant with pending snapshots"
        );
        f(&mut self.shared.state.borrow_mut())
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T> Participant<T>
where
    T: SnapshotParticipant + 'static,
{
    /// Makes sure the state from before this change can be restored if `transaction` aborts.
    ///
    /// Must be called before every mutation. The first call at a given depth captures a snapshot
    /// and registers a close callback with `transaction`; further calls at that depth are no-ops.
    ///
    /// # Panics
    ///
    /// If the snapshot slot at this depth belongs to another transaction that is still open, as
    /// happens when the participant is used with two managers at once. The state is left
    /// untouched in that case.
    pub fn notify_pending_change(&self, transaction: &Transaction<'_>) {
        let id = transaction.id();
        let depth = transaction.depth();
        {
            let mut snapshots = self.shared.snapshots.borrow_mut();
            if snapshots.len() <= depth {
                snapshots.resize_with(depth + 1, || None);
            }
            match &snapshots[depth] {
                Some((owner, _)) if *owner == id => return,
                Some((owner, _)) => panic!(
                    "participant holds a snapshot at depth {depth} for {owner}; {id} cannot join it while {owner} is open"
                ),
                None => {}
            }
            let snapshot = self.shared.state.borrow().create_snapshot();
            snapshots[depth] = Some((id, snapshot));
        }
        transaction.add_close_callback(self.shared.clone());
    }

    /// Notifies a pending change under `transaction`, then applies `f` to the state.
    pub fn update<O>(&self, transaction: &Transaction<'_>, f: impl FnOnce(&mut T) -> O) -> O {
        self.notify_pending_change(transaction);
        f(&mut self.shared.state.borrow_mut())
    }
}

impl<T: SnapshotParticipant> Shared<T> {
    /// Takes the snapshot held for `id` at `depth`.
    fn take_snapshot(&self, id: TransactionId, depth: usize) -> Option<T::Snapshot> {
        let mut snapshots = self.snapshots.borrow_mut();
        let slot = snapshots.get_mut(depth)?;
        let (_, snapshot) = slot.take_if(|(owner, _)| *owner == id)?;
        while snapshots.last().is_some_and(Option::is_none) {
            snapshots.pop();
        }
        Some(snapshot)
    }

    fn release(&self, snapshot: T::Snapshot) {
        self.state.borrow_mut().release_snapshot(snapshot);
    }
}

impl<T> CloseCallback for Shared<T>
where
    T: SnapshotParticipant + 'static,
{
    fn on_close(self: Rc<Self>, transaction: &Transaction<'_>, outcome: Outcome) {
        let id = transaction.id();
        let depth = transaction.depth();
        let Some(snapshot) = self.take_snapshot(id, depth) else {
            panic!("participant has no snapshot at depth {depth} for {id} although it joined it");
        };

        match outcome {
            Outcome::Aborted => {
                let mut state = self.state.borrow_mut();
                state.restore_snapshot(&snapshot);
                state.release_snapshot(snapshot);
            }
            Outcome::Committed if depth > 0 => {
                let parent_depth = depth - 1;
                let Some(parent) = transaction.parent_id() else {
                    unreachable!("nested transaction {id} has no parent");
                };
                let adopted = {
                    let mut snapshots = self.snapshots.borrow_mut();
                    if snapshots.len() <= parent_depth {
                        snapshots.resize_with(parent_depth + 1, || None);
                    }
                    let slot = &mut snapshots[parent_depth];
                    match slot.as_ref().map(|(owner, _)| *owner) {
                        // the parent already captured an older state
                        Some(owner) if owner == parent => Some(snapshot),
                        Some(owner) => panic!(
                            "participant holds a snapshot at depth {parent_depth} for {owner}, not for {parent}"
                        ),
                        None => {
                            *slot = Some((parent, snapshot));
                            None
                        }
                    }
                };
                match adopted {
                    Some(superseded) => self.release(superseded),
                    None => transaction.add_parent_close_callback(self),
                }
            }
            Outcome::Committed => {
                self.release(snapshot);
                transaction.add_outer_close_callback(self);
            }
        }
    }
}

impl<T> OuterCloseCallback for Shared<T>
where
    T: SnapshotParticipant + 'static,
{
    fn after_outer_commit(self: Rc<Self>) {
        self.state.borrow_mut().on_final_commit();
    }
}
