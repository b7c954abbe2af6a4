//! Fulfillment order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod status;
mod value_objects;

pub use aggregate::{FulfillmentOrder, HistoryEntry};
pub use commands::*;
pub use events::{
    CoverageVerifiedData, OrderAmendedData, OrderCancelledData, OrderCreatedData, OrderEvent,
    OrderSettledData, TransitionData,
};
pub use status::{OrderStatus, UnknownStatus};
pub use value_objects::{Money, OrderItem, OrderKind};

use thiserror::Error;

use crate::coverage::CoverageError;
use crate::error::ErrorKind;

/// Business-rule violations raised by order command methods.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    /// The request is malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The transition is not in the workflow table.
    #[error("Invalid transition from {current} to {requested}")]
    InvalidTransition {
        current: OrderStatus,
        requested: OrderStatus,
    },

    /// A non-transition action is not allowed in the current status.
    #[error("Cannot {action} an order in status {current}")]
    InvalidStateForAction {
        current: OrderStatus,
        action: &'static str,
    },

    /// The target status is valid but is entered through a dedicated operation.
    #[error("Transition to {target} requires the {operation} operation")]
    PayloadRequired {
        target: OrderStatus,
        operation: &'static str,
    },

    /// Coverage terms or the total they apply to are invalid.
    #[error("Invalid coverage terms: {0}")]
    InvalidCoverageTerms(#[from] CoverageError),

    /// The order is settled or cancelled.
    #[error("Order is already {status}")]
    AlreadyTerminal { status: OrderStatus },

    /// A receipt already exists for this order.
    #[error("Order is already settled with receipt {receipt_number}")]
    AlreadySettled { receipt_number: String },

    /// The tendered amount does not cover the amount due.
    #[error("Insufficient payment: {amount_due} due, {amount_tendered} tendered")]
    InsufficientPayment {
        amount_due: Money,
        amount_tendered: Money,
    },
}

impl OrderError {
    /// Returns the stable error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::InvalidInput(_) | OrderError::PayloadRequired { .. } => {
                ErrorKind::InvalidInput
            }
            OrderError::InvalidTransition { .. } | OrderError::InvalidStateForAction { .. } => {
                ErrorKind::InvalidTransition
            }
            OrderError::InvalidCoverageTerms(_) => ErrorKind::InvalidCoverageTerms,
            OrderError::AlreadyTerminal { .. } => ErrorKind::AlreadyTerminal,
            OrderError::AlreadySettled { .. } => ErrorKind::AlreadySettled,
            OrderError::InsufficientPayment { .. } => ErrorKind::InsufficientPayment,
        }
    }
}
