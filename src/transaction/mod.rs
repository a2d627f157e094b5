// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Nestable transactions.
//!
//! A [`Transaction`] bounds a set of tentative mutations that are kept or rolled back as a unit.
//! Transactions nest without limit: a nested transaction can be aborted on its own, but its
//! commit is provisional and only becomes permanent once every enclosing level has committed.
//!
//! The transaction itself knows nothing about the state it protects. Stateful objects join a
//! transaction by registering a [`CloseCallback`] the first time they change under it; the
//! callback decides how to restore or keep that state once the transaction closes. In practice
//! this is almost always done through [`Participant`](crate::Participant), which implements the
//! callbacks on top of per-depth snapshots.
//!
//! # Example
//!
//! ```
//! use std::{cell::Cell, rc::Rc};
//! use transfer_tx::{CloseCallback, Outcome, Transaction, TransactionManager};
//!
//! struct Seen(Cell<Option<Outcome>>);
//!
//! impl CloseCallback for Seen {
//!     fn on_close(self: Rc<Self>, _transaction: &Transaction<'_>, outcome: Outcome) {
//!         self.0.set(Some(outcome));
//!     }
//! }
//!
//! let manager = TransactionManager::new();
//! let seen = Rc::new(Seen(Cell::new(None)));
//!
//! let root = manager.open_root().unwrap();
//! root.add_close_callback(seen.clone());
//! let _ = root.abort();
//!
//! assert_eq!(seen.0.get(), Some(Outcome::Aborted));
//! ```
//!
//! # Lifecycle
//!
//! - **On open**: the transaction becomes the innermost open one of its manager.
//! - **On commit of a nested transaction**: close callbacks run in registration order with
//!   [`Outcome::Committed`]; outer-close callbacks move to the parent.
//! - **On commit of the root**: close callbacks run, then every accumulated
//!   [`OuterCloseCallback`] fires once, in registration order.
//! - **On abort (or drop)**: close callbacks run with [`Outcome::Aborted`]; outer-close
//!   callbacks registered at this level or below are discarded.
//!
//! Closing anything but the innermost open transaction is a broken nesting discipline and
//! panics.

mod callback;
mod manager;
mod scope;

pub use callback::{CloseCallback, OuterCloseCallback, Outcome, TransactionId};
pub use manager::TransactionManager;
pub use scope::Transaction;
