// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Recoverable errors.
//!
//! Breaking the nesting discipline (closing a transaction that is not the innermost open one,
//! opening a child from a stale parent) is not represented here: those are programmer errors and
//! panic at the point of misuse, before any bookkeeping changes.

use thiserror::Error;

/// Errors raised by a [`TransactionManager`](crate::TransactionManager).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// A root transaction was requested while another transaction is still open.
    #[error("a transaction is already open at depth {depth}; open a nested transaction instead")]
    AlreadyOpen { depth: usize },
}

/// Caller errors raised by [`Storage`](crate::Storage) operations.
///
/// The transaction passed to the failing operation stays valid and can still be committed or
/// aborted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The blank resource cannot be inserted or extracted.
    #[error("cannot {operation} the blank resource")]
    BlankResource { operation: &'static str },
}

impl StorageError {
    pub(crate) fn blank_resource(operation: &'static str) -> Self {
        Self::BlankResource { operation }
    }
}

/// Errors raised by transfers that open their own root transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
