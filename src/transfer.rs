// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Moving resources between storages.
//!
//! [`move_resources`] is the building block for any container-to-container exchange: pipes,
//! hoppers, a player shift-clicking a stack. It only moves what the destination actually accepts,
//! so the sum of both storages never changes, and it runs everything in nested transactions so
//! that the caller can still abort the whole move.

use crate::{
    error::{StorageError, TransferError},
    storage::{Resource, Storage},
    transaction::{Transaction, TransactionManager},
};
use smallvec::SmallVec;
use tracing::trace;

/// Moves up to `max_amount` of resources matching `filter` from `from` to `to`, and returns the
/// amount moved.
///
/// Resources are visited in the order `from` iterates them. For each one, the amount `from`
/// could give is offered to `to`, and exactly the amount `to` accepted is then extracted from
/// `from`. If the two disagree the step is rolled back, so a resource only ever leaves `from` when
/// it has arrived in `to`.
///
/// The move is committed into `transaction`; it becomes permanent only when the root does.
/// On error, nothing of the move remains in `transaction`.
///
/// # Example
///
/// ```
/// use transfer_tx::{SingleVariantStorage, TransactionManager, transfer};
///
/// let barrel = SingleVariantStorage::with_contents(Some("water"), 100, 100);
/// let bucket = SingleVariantStorage::new(60);
/// let manager = TransactionManager::new();
///
/// let mut root = manager.open_root().unwrap();
/// let moved = transfer::move_resources(&barrel, &bucket, |_| true, 100, &mut root).unwrap();
/// assert_eq!(moved, 60);
/// let _ = root.commit();
///
/// assert_eq!((barrel.amount(), bucket.amount()), (40, 60));
/// ```
pub fn move_resources<R, From, To>(
    from: &From,
    to: &To,
    filter: impl Fn(&R) -> bool,
    max_amount: u64,
    transaction: &mut Transaction<'_>,
) -> Result<u64, StorageError>
where
    R: Resource,
    From: Storage<R> + ?Sized,
    To: Storage<R> + ?Sized,
{
    if max_amount == 0 || !from.supports_extraction() || !to.supports_insertion() {
        return Ok(0);
    }

    let mut iteration = transaction.open_nested();
    let candidates = distinct_resources(from, &filter, &iteration);

    let mut moved = 0;
    for resource in candidates {
        let remaining = max_amount - moved;
        if remaining == 0 {
            break;
        }
        let available = from.simulate_extract(&resource, remaining, &mut iteration)?;
        if available == 0 {
            continue;
        }

        let step = iteration.open_nested();
        let accepted = to.insert(&resource, available, &step)?;
        if accepted > 0 && from.extract(&resource, accepted, &step)? == accepted {
            moved += accepted;
            let _ = step.commit();
        } else {
            let _ = step.abort();
        }
        trace!(?resource, available, accepted, "transfer step");
    }

    let _ = iteration.commit();
    Ok(moved)
}

/// Like [`move_resources`], in a root transaction of its own.
///
/// The root is committed if the move succeeds and aborted otherwise, so on error nothing moved.
/// Fails with [`TransactionError::AlreadyOpen`](crate::TransactionError::AlreadyOpen) if
/// `manager` already has an open transaction.
pub fn move_atomically<R, From, To>(
    manager: &TransactionManager,
    from: &From,
    to: &To,
    filter: impl Fn(&R) -> bool,
    max_amount: u64,
) -> Result<u64, TransferError>
where
    R: Resource,
    From: Storage<R> + ?Sized,
    To: Storage<R> + ?Sized,
{
    let mut root = manager.open_root()?;
    let moved = move_resources(from, to, filter, max_amount, &mut root)?;
    let _ = root.commit();
    Ok(moved)
}

/// Returns the first stored resource matching `filter`, ignoring empty views.
pub fn find_stored_resource<R, S>(
    storage: &S,
    filter: impl Fn(&R) -> bool,
    transaction: &Transaction<'_>,
) -> Option<R>
where
    R: Resource,
    S: Storage<R> + ?Sized,
{
    storage
        .iter(transaction)
        .find(|view| !view.is_empty() && filter(&view.resource))
        .map(|view| view.resource)
}

/// Returns the first stored resource matching `filter` of which a non-zero amount can currently
/// be extracted.
pub fn find_extractable_resource<R, S>(
    storage: &S,
    filter: impl Fn(&R) -> bool,
    transaction: &mut Transaction<'_>,
) -> Result<Option<R>, StorageError>
where
    R: Resource,
    S: Storage<R> + ?Sized,
{
    if !storage.supports_extraction() {
        return Ok(None);
    }
    for resource in distinct_resources(storage, &filter, transaction) {
        if storage.simulate_extract(&resource, u64::MAX, transaction)? > 0 {
            return Ok(Some(resource));
        }
    }
    Ok(None)
}

/// Total amount of `resource` over all views of `storage`.
pub fn amount_of<R, S>(storage: &S, resource: &R, transaction: &Transaction<'_>) -> u64
where
    R: Resource,
    S: Storage<R> + ?Sized,
{
    storage
        .iter(transaction)
        .filter(|view| view.resource == *resource)
        .map(|view| view.amount)
        .sum()
}

/// Non-empty resources of `storage` matching `filter`, each listed once, in iteration order.
fn distinct_resources<R, S>(
    storage: &S,
    filter: impl Fn(&R) -> bool,
    transaction: &Transaction<'_>,
) -> SmallVec<[R; 4]>
where
    R: Resource,
    S: Storage<R> + ?Sized,
{
    let mut resources = SmallVec::new();
    for view in storage.iter(transaction) {
        if !view.is_empty() && filter(&view.resource) && !resources.contains(&view.resource) {
            resources.push(view.resource);
        }
    }
    resources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CombinedStorage, ResourceAmount, SingleVariantStorage, StorageIter, TransactionError,
        test_util::Fluid,
    };
    use std::cell::Cell;

    #[test]
    fn partial_acceptance_keeps_the_rest_in_the_source() {
        crate::test_util::init_tracing();
        let source = SingleVariantStorage::with_contents(Fluid::Water, 100, 100);
        let target = SingleVariantStorage::new(60);
        let manager = TransactionManager::new();

        let mut root = manager.open_root().unwrap();
        let moved =
            move_resources(&source, &target, |fluid| *fluid == Fluid::Water, 100, &mut root);
        assert_eq!(moved, Ok(60));
        assert_eq!(source.amount(), 40);
        assert_eq!(target.amount(), 60);
        let _ = root.abort();

        assert_eq!(source.contents(), ResourceAmount::new(Fluid::Water, 100));
        assert_eq!(target.contents(), ResourceAmount::blank());
        assert_eq!(source.pending_snapshots(), 0);
        assert_eq!(target.pending_snapshots(), 0);
    }

    #[test]
    fn max_amount_limits_the_move() {
        let source = SingleVariantStorage::with_contents(Fluid::Lava, 50, 100);
        let target = SingleVariantStorage::new(100);
        let manager = TransactionManager::new();

        assert_eq!(move_atomically(&manager, &source, &target, |_| true, 20), Ok(20));
        assert_eq!(source.amount(), 30);
        assert_eq!(target.contents(), ResourceAmount::new(Fluid::Lava, 20));
        assert_eq!(source.version(), 1);
        assert_eq!(target.version(), 1);
    }

    #[test]
    fn filter_selects_resources() {
        let source: CombinedStorage<Fluid, SingleVariantStorage<Fluid>> = [
            SingleVariantStorage::with_contents(Fluid::Lava, 10, 10),
            SingleVariantStorage::with_contents(Fluid::Milk, 10, 10),
            SingleVariantStorage::with_contents(Fluid::Water, 10, 10),
        ]
        .into_iter()
        .collect();
        let target: CombinedStorage<Fluid, SingleVariantStorage<Fluid>> =
            (0..2).map(|_| SingleVariantStorage::new(8)).collect();
        let manager = TransactionManager::new();

        let moved = move_atomically(
            &manager,
            &source,
            &target,
            |fluid| *fluid != Fluid::Lava,
            u64::MAX,
        );
        // milk fills both target tanks before water gets a turn
        assert_eq!(moved, Ok(10));

        let left: Vec<_> = source.parts().iter().map(|tank| tank.amount()).collect();
        assert_eq!(left, [10, 0, 10]);
        let arrived: Vec<_> = target.parts().iter().map(|tank| tank.contents()).collect();
        assert_eq!(
            arrived,
            [
                ResourceAmount::new(Fluid::Milk, 8),
                ResourceAmount::new(Fluid::Milk, 2)
            ]
        );
    }

    #[test]
    fn nothing_moves_into_an_incompatible_target() {
        let source = SingleVariantStorage::with_contents(Fluid::Water, 10, 10);
        let target = SingleVariantStorage::with_contents(Fluid::Lava, 1, 10);
        let manager = TransactionManager::new();

        assert_eq!(move_atomically(&manager, &source, &target, |_| true, 10), Ok(0));
        assert_eq!(source.amount(), 10);
        assert_eq!(target.amount(), 1);
        assert_eq!(source.version(), 0);
        assert_eq!(target.version(), 0);
    }

    #[test]
    fn move_atomically_refuses_to_nest() {
        let source = SingleVariantStorage::with_contents(Fluid::Water, 10, 10);
        let target = SingleVariantStorage::new(10);
        let manager = TransactionManager::new();

        let _root = manager.open_root().unwrap();
        assert_eq!(
            move_atomically(&manager, &source, &target, |_| true, 10),
            Err(TransferError::Transaction(TransactionError::AlreadyOpen {
                depth: 0
            }))
        );
    }

    /// Accepts insertions, but fails the extraction after `healthy_extractions` successes.
    struct Flaky {
        inner: SingleVariantStorage<Fluid>,
        healthy_extractions: Cell<usize>,
    }

    impl Storage<Fluid> for Flaky {
        fn insert(
            &self,
            resource: &Fluid,
            max_amount: u64,
            transaction: &Transaction<'_>,
        ) -> Result<u64, StorageError> {
            self.inner.insert(resource, max_amount, transaction)
        }

        fn extract(
            &self,
            resource: &Fluid,
            max_amount: u64,
            transaction: &Transaction<'_>,
        ) -> Result<u64, StorageError> {
            match self.healthy_extractions.get() {
                0 => Err(StorageError::BlankResource {
                    operation: "extract",
                }),
                n => {
                    self.healthy_extractions.set(n - 1);
                    self.inner.extract(resource, max_amount, transaction)
                }
            }
        }

        fn iter<'a>(&'a self, transaction: &'a Transaction<'_>) -> StorageIter<'a, Fluid> {
            self.inner.iter(transaction)
        }
    }

    #[test]
    fn failure_rolls_back_the_whole_move() {
        let source = Flaky {
            inner: SingleVariantStorage::with_contents(Fluid::Milk, 10, 10),
            // the first resource gets through (simulation + extraction), the second one fails
            healthy_extractions: Cell::new(2),
        };
        let second = SingleVariantStorage::with_contents(Fluid::Water, 10, 10);
        let sources: CombinedStorage<Fluid, &dyn Storage<Fluid>> =
            [&source as &dyn Storage<Fluid>, &second].into_iter().collect();
        let target: CombinedStorage<Fluid, SingleVariantStorage<Fluid>> =
            (0..2).map(|_| SingleVariantStorage::new(10)).collect();
        let manager = TransactionManager::new();

        let moved = move_atomically(&manager, &sources, &target, |_| true, 100);
        assert!(matches!(moved, Err(TransferError::Storage(_))));

        assert_eq!(source.inner.amount(), 10);
        assert_eq!(second.amount(), 10);
        assert!(target.parts().iter().all(SingleVariantStorage::is_empty));
        assert!(!manager.is_open());
    }

    #[test]
    fn find_helpers() {
        let storage: CombinedStorage<Fluid, SingleVariantStorage<Fluid>> = [
            SingleVariantStorage::new(10),
            SingleVariantStorage::with_contents(Fluid::Lava, 3, 10),
            SingleVariantStorage::with_contents(Fluid::Milk, 4, 10),
            SingleVariantStorage::with_contents(Fluid::Lava, 5, 10),
        ]
        .into_iter()
        .collect();
        let manager = TransactionManager::new();
        let mut root = manager.open_root().unwrap();

        assert_eq!(find_stored_resource(&storage, |_| true, &root), Some(Fluid::Lava));
        assert_eq!(
            find_stored_resource(&storage, |fluid| *fluid != Fluid::Lava, &root),
            Some(Fluid::Milk)
        );
        assert_eq!(
            find_stored_resource(&storage, |fluid| *fluid == Fluid::Water, &root),
            None
        );
        assert_eq!(
            find_extractable_resource(&storage, |fluid| *fluid == Fluid::Milk, &mut root),
            Ok(Some(Fluid::Milk))
        );
        assert_eq!(amount_of(&storage, &Fluid::Lava, &root), 8);
        assert_eq!(amount_of(&storage, &Fluid::Water, &root), 0);
        assert!(storage.parts().iter().all(|part| part.pending_snapshots() == 0));
    }

    #[quickcheck]
    fn move_conserves_every_resource(
        source_amounts: (u8, u8),
        target_capacity: u8,
        target_prefill: Option<(Fluid, u8)>,
        max_amount: u16,
    ) -> bool {
        let source: CombinedStorage<Fluid, SingleVariantStorage<Fluid>> = [
            SingleVariantStorage::with_contents(Fluid::Water, source_amounts.0.into(), 255),
            SingleVariantStorage::with_contents(Fluid::Lava, source_amounts.1.into(), 255),
        ]
        .into_iter()
        .collect();
        let target = match target_prefill {
            Some((fluid, amount)) => {
                let capacity = u64::from(target_capacity.max(amount));
                SingleVariantStorage::with_contents(fluid, amount.into(), capacity)
            }
            None => SingleVariantStorage::new(target_capacity.into()),
        };
        let manager = TransactionManager::new();

        let totals = |transaction: &Transaction<'_>| {
            [Fluid::Water, Fluid::Lava, Fluid::Milk].map(|fluid| {
                amount_of(&source, &fluid, transaction) + amount_of(&target, &fluid, transaction)
            })
        };

        let mut root = manager.open_root().unwrap();
        let before = totals(&root);
        let Ok(moved) = move_resources(&source, &target, |_| true, max_amount.into(), &mut root)
        else {
            return false;
        };
        let after = totals(&root);
        let _ = root.commit();

        before == after && moved <= u64::from(max_amount)
    }
}
