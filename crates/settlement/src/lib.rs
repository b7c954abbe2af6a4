//! Settlement of fulfillment orders.
//!
//! Settling an order takes the payment, issues exactly one receipt and
//! moves the order to `settled`. The receipt insert and the order update
//! are committed as one unit; transient storage failures re-run the whole
//! unit under a bounded backoff.

pub mod allocator;
pub mod error;
pub mod retry;
pub mod service;

pub use allocator::{ReceiptNumberAllocator, SequentialReceiptNumbers};
pub use error::{Result, SettlementError};
pub use retry::RetryPolicy;
pub use service::{SettleOrder, SettlementResult, SettlementService};
