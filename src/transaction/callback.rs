// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::Transaction;
use std::{fmt, rc::Rc};

/// Opaque identifier of a transaction, unique within the process across every
/// [`TransactionManager`](super::TransactionManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct TransactionId(pub(super) u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// How a transaction was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[must_use]
pub enum Outcome {
    Aborted,
    Committed,
}

impl Outcome {
    pub fn was_aborted(self) -> bool {
        self == Self::Aborted
    }

    pub fn was_committed(self) -> bool {
        self == Self::Committed
    }
}

/// Invoked exactly once when the transaction it was registered with closes.
///
/// Callbacks run in registration order while the closing transaction is still the innermost open
/// one, so they may register further callbacks with the enclosing transaction through
/// [`Transaction::add_parent_close_callback`] or defer work to the root commit through
/// [`Transaction::add_outer_close_callback`].
///
/// The receiver is an `Rc` so that a callback can hand itself on to the parent transaction.
pub trait CloseCallback {
    fn on_close(self: Rc<Self>, transaction: &Transaction<'_>, outcome: Outcome);
}

/// Invoked exactly once after the root transaction of the stack it was registered in commits.
///
/// Never invoked if the root or any enclosing nested transaction aborts. By the time it runs, no
/// transaction is open anymore, so it may open a fresh root transaction.
pub trait OuterCloseCallback {
    fn after_outer_commit(self: Rc<Self>);
}
