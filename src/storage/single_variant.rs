// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{Resource, ResourceAmount, Storage, StorageIter, ensure_not_blank};
use crate::{
    error::StorageError,
    participant::{Participant, SnapshotParticipant},
    transaction::Transaction,
};
use std::fmt;

type CommitListener<R> = Box<dyn FnMut(&ResourceAmount<R>)>;

/// A storage holding any amount, up to a fixed capacity, of a single resource at a time.
///
/// Insertion is accepted while the storage is empty or already holds the inserted resource. The
/// storage becomes blank again once its amount drops to zero.
///
/// Every committed root transaction that changed the contents bumps [`version`](Self::version)
/// and calls the listener set with [`on_commit`](Self::on_commit), which is where the owner marks
/// its state for saving or notifies neighbours.
pub struct SingleVariantStorage<R: Resource> {
    capacity: u64,
    slot: Participant<Slot<R>>,
}

struct Slot<R> {
    contents: ResourceAmount<R>,
    version: u64,
    listener: Option<CommitListener<R>>,
}

impl<R: Resource> SnapshotParticipant for Slot<R> {
    type Snapshot = ResourceAmount<R>;

    fn create_snapshot(&self) -> Self::Snapshot {
        self.contents.clone()
    }

    fn restore_snapshot(&mut self, snapshot: &Self::Snapshot) {
        self.contents.clone_from(snapshot);
    }

    fn on_final_commit(&mut self) {
        self.version += 1;
        if let Some(listener) = &mut self.listener {
            listener(&self.contents);
        }
    }
}

impl<R: Resource> fmt::Debug for SingleVariantStorage<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.borrow();
        f.debug_struct("SingleVariantStorage")
            .field("resource", &slot.contents.resource)
            .field("amount", &slot.contents.amount)
            .field("capacity", &self.capacity)
            .field("version", &slot.version)
            .finish()
    }
}

impl<R: Resource> SingleVariantStorage<R> {
    /// An empty storage.
    pub fn new(capacity: u64) -> Self {
        Self::with_contents(R::blank(), 0, capacity)
    }

    /// A storage initially holding `amount` of `resource`.
    ///
    /// # Panics
    ///
    /// If `amount` exceeds `capacity`.
    pub fn with_contents(resource: R, amount: u64, capacity: u64) -> Self {
        assert!(
            amount <= capacity,
            "initial amount {amount} exceeds capacity {capacity}"
        );
        Self {
            capacity,
            slot: Participant::new(Slot {
                contents: normalize(ResourceAmount::new(resource, amount)),
                version: 0,
                listener: None,
            }),
        }
    }

    /// Sets the listener called with the committed contents after every root commit that
    /// changed this storage.
    ///
    /// No transaction is open while the listener runs, so it may open a new root and change
    /// other storages. It runs while this storage is borrowed, though: everything it needs from
    /// this storage is in the contents it receives, and calling back into this storage (even
    /// [`version`](Self::version)) panics.
    pub fn on_commit(self, listener: impl FnMut(&ResourceAmount<R>) + 'static) -> Self {
        self.slot
            .modify_untracked(|slot| slot.listener = Some(Box::new(listener)));
        self
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn contents(&self) -> ResourceAmount<R> {
        self.slot.read(|slot| slot.contents.clone())
    }

    pub fn resource(&self) -> R {
        self.slot.read(|slot| slot.contents.resource.clone())
    }

    pub fn amount(&self) -> u64 {
        self.slot.read(|slot| slot.contents.amount)
    }

    pub fn is_empty(&self) -> bool {
        self.slot.read(|slot| slot.contents.is_empty())
    }

    /// Number of root commits that changed this storage.
    pub fn version(&self) -> u64 {
        self.slot.read(|slot| slot.version)
    }

    /// Number of open transactions holding a snapshot of this storage.
    pub fn pending_snapshots(&self) -> usize {
        self.slot.pending_snapshots()
    }

    /// Replaces the contents outside of any transaction, as when loading saved state.
    ///
    /// # Panics
    ///
    /// If the amount exceeds the capacity, or a transaction that changed this storage is still
    /// open.
    pub fn load(&self, contents: ResourceAmount<R>) {
        assert!(
            contents.amount <= self.capacity,
            "loaded amount {} exceeds capacity {}",
            contents.amount,
            self.capacity
        );
        self.slot
            .modify_untracked(|slot| slot.contents = normalize(contents));
    }
}

fn normalize<R: Resource>(contents: ResourceAmount<R>) -> ResourceAmount<R> {
    if contents.is_empty() {
        ResourceAmount::blank()
    } else {
        contents
    }
}

impl<R: Resource> Storage<R> for SingleVariantStorage<R> {
    fn insert(
        &self,
        resource: &R,
        max_amount: u64,
        transaction: &Transaction<'_>,
    ) -> Result<u64, StorageError> {
        ensure_not_blank(resource, "insert")?;

        let accepted = self.slot.read(|slot| {
            let contents = &slot.contents;
            if contents.resource.is_blank() || contents.resource == *resource {
                max_amount.min(self.capacity.saturating_sub(contents.amount))
            } else {
                0
            }
        });
        if accepted > 0 {
            self.slot.update(transaction, |slot| {
                if slot.contents.resource.is_blank() {
                    slot.contents.resource = resource.clone();
                }
                slot.contents.amount += accepted;
            });
        }
        Ok(accepted)
    }

    fn extract(
        &self,
        resource: &R,
        max_amount: u64,
        transaction: &Transaction<'_>,
    ) -> Result<u64, StorageError> {
        ensure_not_blank(resource, "extract")?;

        let extracted = self.slot.read(|slot| {
            if slot.contents.resource == *resource {
                max_amount.min(slot.contents.amount)
            } else {
                0
            }
        });
        if extracted > 0 {
            self.slot.update(transaction, |slot| {
                slot.contents.amount -= extracted;
                if slot.contents.amount == 0 {
                    slot.contents.resource = R::blank();
                }
            });
        }
        Ok(extracted)
    }

    fn iter<'a>(&'a self, _transaction: &'a Transaction<'_>) -> StorageIter<'a, R> {
        Box::new(std::iter::once_with(move || self.contents()))
    }
}
