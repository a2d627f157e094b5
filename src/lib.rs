// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Nested snapshot transactions for resource transfer
//!
//! This crate lets game-like simulations move quantified resources (fluids, items, energy)
//! between containers atomically. Every mutation happens under a [`Transaction`]; if anything
//! goes wrong, or the caller changes their mind, aborting the transaction restores every
//! container exactly as it was.
//!
//! The crate is split into three layers that build on each other:
//!
//! - [`transaction`]: nestable transactions that know nothing about state. They only run
//!   [`CloseCallback`]s when they close and defer [`OuterCloseCallback`]s to the final commit.
//! - [`participant`]: the snapshot protocol. A [`SnapshotParticipant`] describes how to capture
//!   and restore some state; wrapping it in a [`Participant`] makes it join transactions
//!   automatically, with at most one snapshot per nesting depth.
//! - [`storage`] and [`transfer`]: quantified resource containers built on participants, and the
//!   [`move_resources`](transfer::move_resources) algorithm that moves resources between them
//!   while conserving totals.
//!
//! ## Nesting
//!
//! Transactions nest without limit. A nested transaction can be aborted on its own, which rolls
//! back only what happened inside it. A nested commit is provisional: the changes are handed to
//! the enclosing transaction and become permanent only once the root commits. This is what makes
//! "try it and see" code cheap: open a nested transaction, do the work, look at the result, then
//! keep or discard it.
//!
//! ## Getting Started
//!
//! ```
//! use transfer_tx::{SingleVariantStorage, TransactionManager, transfer};
//!
//! let tank = SingleVariantStorage::with_contents(Some("water"), 100, 100);
//! let bucket = SingleVariantStorage::new(60);
//! let manager = TransactionManager::new();
//!
//! let mut root = manager.open_root().unwrap();
//! let moved = transfer::move_resources(&tank, &bucket, |_| true, 100, &mut root).unwrap();
//! assert_eq!(moved, 60);
//! assert_eq!(tank.amount(), 40);
//!
//! // Changed our mind: nothing happened.
//! let _ = root.abort();
//! assert_eq!((tank.amount(), bucket.amount()), (100, 0));
//! ```
//!
//! ## Threading
//!
//! A [`TransactionManager`] tracks the open transactions of one logical execution context and is
//! neither `Send` nor `Sync`, and neither are participants. Keep one manager per thread, and hand
//! transactions explicitly to the code that mutates state.
//!
//! ## Logging
//!
//! The crate emits [`tracing`](https://docs.rs/tracing) events: `trace` for every open, close and
//! transfer step, `debug` for root outcomes. Install any subscriber to see them.
//!
//! ## License
//!
//! This project is licensed under either of
//!
//! - Apache License, Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
//! - MIT license (http://opensource.org/licenses/MIT)
//!
//! at your option.
//!
//! ## Features
//!
//! - `serde`: Provides `serde` support for [`Outcome`], [`TransactionId`] and
//!   [`ResourceAmount`].
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

pub mod error;
pub use error::{StorageError, TransactionError, TransferError};
pub mod participant;
pub use participant::{Participant, SnapshotParticipant};
pub mod storage;
pub use storage::{
    CombinedStorage, Resource, ResourceAmount, SingleVariantStorage, Storage, StorageIter,
};
pub mod transaction;
pub use transaction::{
    CloseCallback, OuterCloseCallback, Outcome, Transaction, TransactionId, TransactionManager,
};
pub mod transfer;

#[cfg(test)]
mod test_util;
