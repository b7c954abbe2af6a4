//! Domain layer for clinical order fulfillment.
//!
//! This crate provides:
//! - The `FulfillmentOrder` aggregate and its status state machine
//! - The pure coverage calculator (insurer/patient split)
//! - Receipts and payment methods
//! - `WorkflowEngine`, which applies commands with optimistic concurrency

pub mod coverage;
pub mod engine;
pub mod error;
pub mod order;
pub mod receipt;
pub mod repository;

pub use coverage::{
    CoverageError, CoverageTerms, InsuranceCoverage, Percentage, calculate_coverage,
};
pub use engine::{
    CommandResult, DEFAULT_COVERAGE_PERCENT, WorkflowConfig, WorkflowEngine, ensure_version,
};
pub use error::{DomainError, ErrorKind};
pub use order::{
    AdvanceOrder, AmendOrder, CancelOrder, CreateOrder, FulfillmentOrder, HistoryEntry,
    ItemChanges, Money, OrderError, OrderEvent, OrderItem, OrderKind, OrderStatus, UnknownStatus,
    VerifyCoverage,
};
pub use receipt::{PaymentMethod, Receipt, UnknownPaymentMethod};
pub use repository::OrderRepository;
