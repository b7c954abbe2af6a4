//! Domain error types.

use common::OrderId;
use order_store::{StoreError, Version};
use serde::Serialize;
use thiserror::Error;

use crate::order::OrderError;

/// Stable, caller-visible error kinds.
///
/// Every failure surfaced by the workflow maps onto exactly one kind; the
/// string form is part of the external contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    InvalidTransition,
    ConcurrentModification,
    InsufficientPayment,
    AlreadySettled,
    InvalidCoverageTerms,
    StorageUnavailable,
    AlreadyTerminal,
    NotFound,
    Internal,
}

impl ErrorKind {
    /// Returns the kind as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::ConcurrentModification => "concurrent_modification",
            ErrorKind::InsufficientPayment => "insufficient_payment",
            ErrorKind::AlreadySettled => "already_settled",
            ErrorKind::InvalidCoverageTerms => "invalid_coverage_terms",
            ErrorKind::StorageUnavailable => "storage_unavailable",
            ErrorKind::AlreadyTerminal => "already_terminal",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        }
    }

    /// Returns true if the caller may retry after re-reading the order.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::ConcurrentModification | ErrorKind::StorageUnavailable
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during workflow operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A business rule rejected the command.
    #[error("{0}")]
    Order(#[from] OrderError),

    /// No order exists with this id.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The caller's version is stale, or another writer won the race.
    #[error(
        "Concurrent modification of order {order_id}: expected version {expected}, found {actual}"
    )]
    ConcurrentModification {
        order_id: OrderId,
        expected: Version,
        actual: Version,
    },

    /// An error occurred in the order store.
    #[error("Order store error: {0}")]
    Store(StoreError),

    /// A stored document could not be decoded or encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns the stable error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Order(err) => err.kind(),
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            DomainError::Store(err) if err.is_transient() => ErrorKind::StorageUnavailable,
            DomainError::Store(_) | DomainError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if the error is a transient storage failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::Store(err) if err.is_transient())
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(order_id) => DomainError::NotFound(order_id),
            StoreError::ConcurrencyConflict {
                order_id,
                expected,
                actual,
            } => DomainError::ConcurrentModification {
                order_id,
                expected,
                actual,
            },
            other => DomainError::Store(other),
        }
    }
}
