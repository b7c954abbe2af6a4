//! Settlement error types.

use domain::{DomainError, ErrorKind, Money, OrderError, Receipt};
use order_store::StoreError;
use thiserror::Error;

/// Errors that can occur while settling an order.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// The tendered amount does not cover the amount due.
    #[error("Insufficient payment: {amount_due} due, {amount_tendered} tendered")]
    InsufficientPayment {
        amount_due: Money,
        amount_tendered: Money,
    },

    /// The order already has a receipt. Carries it so callers can read through.
    #[error("Order {} is already settled with receipt {}", .0.order_id, .0.receipt_number)]
    AlreadySettled(Box<Receipt>),

    /// The allocated receipt number belongs to another order.
    #[error("Receipt number {0} is already taken")]
    ReceiptNumberTaken(String),

    /// Transient storage failures persisted through every attempt.
    #[error("Storage unavailable after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: DomainError,
    },

    /// Workflow or storage error.
    #[error(transparent)]
    Domain(DomainError),
}

impl SettlementError {
    /// Returns the stable error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::InsufficientPayment { .. } => ErrorKind::InsufficientPayment,
            SettlementError::AlreadySettled(_) => ErrorKind::AlreadySettled,
            SettlementError::ReceiptNumberTaken(_) => ErrorKind::Internal,
            SettlementError::RetriesExhausted { .. } => ErrorKind::StorageUnavailable,
            SettlementError::Domain(err) => err.kind(),
        }
    }

    /// Returns true if the failure is worth retrying as a whole unit.
    ///
    /// A taken receipt number is retried with a freshly allocated one.
    pub fn is_transient(&self) -> bool {
        match self {
            SettlementError::Domain(err) => err.is_transient(),
            SettlementError::ReceiptNumberTaken(_) => true,
            _ => false,
        }
    }

    /// Short label used for the rejection metric.
    pub fn reason(&self) -> &'static str {
        self.kind().as_str()
    }
}

impl From<DomainError> for SettlementError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Order(OrderError::InsufficientPayment {
                amount_due,
                amount_tendered,
            }) => SettlementError::InsufficientPayment {
                amount_due,
                amount_tendered,
            },
            other => SettlementError::Domain(other),
        }
    }
}

impl From<OrderError> for SettlementError {
    fn from(err: OrderError) -> Self {
        DomainError::from(err).into()
    }
}

impl From<StoreError> for SettlementError {
    fn from(err: StoreError) -> Self {
        DomainError::from(err).into()
    }
}

/// Convenience type alias for settlement results.
pub type Result<T> = std::result::Result<T, SettlementError>;
