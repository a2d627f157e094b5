// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Transactional containers of quantified resources.
//!
//! A [`Storage`] holds amounts of some [`Resource`] and exposes insertion, extraction and
//! iteration, all scoped to a [`Transaction`]. Implementations are expected to be
//! [`Participant`](crate::Participant)s so that an abort restores them exactly; nothing they do
//! becomes permanent before the root transaction commits.
//!
//! Resource identity is supplied by the caller: this crate only needs equality and a notion of
//! the blank (absent) resource.
//!
//! # Example
//!
//! ```
//! use transfer_tx::{SingleVariantStorage, Storage, TransactionManager};
//!
//! let tank = SingleVariantStorage::<Option<&str>>::new(1000);
//! let manager = TransactionManager::new();
//!
//! let root = manager.open_root().unwrap();
//! assert_eq!(tank.insert(&Some("water"), 1500, &root), Ok(1000));
//! assert_eq!(tank.insert(&Some("lava"), 10, &root), Ok(0));
//! let _ = root.abort();
//!
//! assert_eq!(tank.amount(), 0);
//! ```

use crate::{error::StorageError, transaction::Transaction};
use std::{fmt, rc::Rc};

mod combined;
mod single_variant;

pub use combined::CombinedStorage;
pub use single_variant::SingleVariantStorage;

/// Identity of a stored resource (a fluid, an item kind, ...), including any side data that
/// distinguishes otherwise equal resources.
pub trait Resource: Clone + Eq + fmt::Debug + 'static {
    /// The resource standing for "nothing".
    fn blank() -> Self;

    fn is_blank(&self) -> bool {
        *self == Self::blank()
    }
}

impl<T> Resource for Option<T>
where
    T: Clone + Eq + fmt::Debug + 'static,
{
    fn blank() -> Self {
        None
    }

    fn is_blank(&self) -> bool {
        self.is_none()
    }
}

/// A view of stored contents: some amount of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct ResourceAmount<R> {
    pub resource: R,
    pub amount: u64,
}

impl<R: Resource> ResourceAmount<R> {
    pub fn new(resource: R, amount: u64) -> Self {
        Self { resource, amount }
    }

    /// No amount of the blank resource.
    pub fn blank() -> Self {
        Self::new(R::blank(), 0)
    }

    /// True if this view holds nothing, either because of a blank resource or a zero amount.
    pub fn is_empty(&self) -> bool {
        self.amount == 0 || self.resource.is_blank()
    }
}

/// Lazy sequence of content views returned by [`Storage::iter`].
pub type StorageIter<'a, R> = Box<dyn Iterator<Item = ResourceAmount<R>> + 'a>;

/// A container of quantified resources whose operations are scoped to a transaction.
///
/// Amounts are `u64`, so negative amounts cannot be requested. Every mutating implementation
/// must notify its pending change before mutating, so that the change is rolled back if the
/// transaction, or any transaction enclosing it, aborts.
pub trait Storage<R: Resource> {
    /// Whether [`insert`](Self::insert) may ever accept anything.
    fn supports_insertion(&self) -> bool {
        true
    }

    /// Inserts up to `max_amount` of `resource` and returns the amount accepted.
    ///
    /// The accepted amount never exceeds `max_amount`; anything less is not an error (the
    /// storage may be full, or only hold another resource).
    ///
    /// Returns [`StorageError::BlankResource`] without changing anything if `resource` is blank.
    fn insert(
        &self,
        resource: &R,
        max_amount: u64,
        transaction: &Transaction<'_>,
    ) -> Result<u64, StorageError>;

    /// Whether [`extract`](Self::extract) may ever yield anything.
    fn supports_extraction(&self) -> bool {
        true
    }

    /// Extracts up to `max_amount` of `resource` and returns the amount removed.
    ///
    /// Returns [`StorageError::BlankResource`] without changing anything if `resource` is blank.
    fn extract(
        &self,
        resource: &R,
        max_amount: u64,
        transaction: &Transaction<'_>,
    ) -> Result<u64, StorageError>;

    /// Iterates over the current contents as seen by `transaction`.
    ///
    /// Views are produced lazily, one per slot of the storage; empty slots show up as empty
    /// views. Stopping early is always fine.
    fn iter<'a>(&'a self, transaction: &'a Transaction<'_>) -> StorageIter<'a, R>;

    /// Returns how much [`insert`](Self::insert) would accept, without changing anything.
    fn simulate_insert(
        &self,
        resource: &R,
        max_amount: u64,
        transaction: &mut Transaction<'_>,
    ) -> Result<u64, StorageError> {
        let probe = transaction.open_nested();
        let inserted = self.insert(resource, max_amount, &probe);
        let _ = probe.abort();
        inserted
    }

    /// Returns how much [`extract`](Self::extract) would yield, without changing anything.
    fn simulate_extract(
        &self,
        resource: &R,
        max_amount: u64,
        transaction: &mut Transaction<'_>,
    ) -> Result<u64, StorageError> {
        let probe = transaction.open_nested();
        let extracted = self.extract(resource, max_amount, &probe);
        let _ = probe.abort();
        extracted
    }
}

pub(crate) fn ensure_not_blank<R: Resource>(
    resource: &R,
    operation: &'static str,
) -> Result<(), StorageError> {
    if resource.is_blank() {
        return Err(StorageError::blank_resource(operation));
    }
    Ok(())
}

macro_rules! forward_storage {
    ($($ty:ty),*) => {$(
        impl<R: Resource, S: Storage<R> + ?Sized> Storage<R> for $ty {
            fn supports_insertion(&self) -> bool {
                (**self).supports_insertion()
            }

            fn insert(
                &self,
                resource: &R,
                max_amount: u64,
                transaction: &Transaction<'_>,
            ) -> Result<u64, StorageError> {
                (**self).insert(resource, max_amount, transaction)
            }

            fn supports_extraction(&self) -> bool {
                (**self).supports_extraction()
            }

            fn extract(
                &self,
                resource: &R,
                max_amount: u64,
                transaction: &Transaction<'_>,
            ) -> Result<u64, StorageError> {
                (**self).extract(resource, max_amount, transaction)
            }

            fn iter<'a>(&'a self, transaction: &'a Transaction<'_>) -> StorageIter<'a, R> {
                (**self).iter(transaction)
            }
        }
    )*};
}

forward_storage!(&S, Box<S>, Rc<S>);
