// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{Resource, Storage, StorageIter, ensure_not_blank};
use crate::{error::StorageError, transaction::Transaction};
use std::{fmt, marker::PhantomData};

/// Several storages presented as one, such as the slots of an inventory.
///
/// Insertion and extraction visit the parts in order until the requested amount is reached, and
/// iteration chains the views of all parts. The combined storage holds no state of its own: each
/// part joins the transaction itself when it changes.
pub struct CombinedStorage<R, S> {
    parts: Vec<S>,
    _resource: PhantomData<fn() -> R>,
}

impl<R, S: fmt::Debug> fmt::Debug for CombinedStorage<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinedStorage")
            .field("parts", &self.parts)
            .finish()
    }
}

impl<R, S> CombinedStorage<R, S>
where
    R: Resource,
    S: Storage<R>,
{
    pub fn new(parts: Vec<S>) -> Self {
        Self {
            parts,
            _resource: PhantomData,
        }
    }

    pub fn parts(&self) -> &[S] {
        &self.parts
    }

    pub fn into_parts(self) -> Vec<S> {
        self.parts
    }
}

impl<R, S> FromIterator<S> for CombinedStorage<R, S>
where
    R: Resource,
    S: Storage<R>,
{
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<R, S> Storage<R> for CombinedStorage<R, S>
where
    R: Resource,
    S: Storage<R>,
{
    fn supports_insertion(&self) -> bool {
        self.parts.iter().any(S::supports_insertion)
    }

    fn insert(
        &self,
        resource: &R,
        max_amount: u64,
        transaction: &Transaction<'_>,
    ) -> Result<u64, StorageError> {
        ensure_not_blank(resource, "insert")?;

        let mut inserted = 0;
        for part in &self.parts {
            if inserted == max_amount {
                break;
            }
            inserted += part.insert(resource, max_amount - inserted, transaction)?;
        }
        Ok(inserted)
    }

    fn supports_extraction(&self) -> bool {
        self.parts.iter().any(S::supports_extraction)
    }

    fn extract(
        &self,
        resource: &R,
        max_amount: u64,
        transaction: &Transaction<'_>,
    ) -> Result<u64, StorageError> {
        ensure_not_blank(resource, "extract")?;

        let mut extracted = 0;
        for part in &self.parts {
            if extracted == max_amount {
                break;
            }
            extracted += part.extract(resource, max_amount - extracted, transaction)?;
        }
        Ok(extracted)
    }

    fn iter<'a>(&'a self, transaction: &'a Transaction<'_>) -> StorageIter<'a, R> {
        Box::new(self.parts.iter().flat_map(move |part| part.iter(transaction)))
    }
}
