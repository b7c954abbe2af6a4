//! Durable, versioned storage for fulfillment orders.
//!
//! The store persists opaque JSON documents next to the handful of columns
//! needed for optimistic concurrency and worklist queries. Every write is a
//! compare-and-swap on the record version; settlement writes the order and
//! its receipt in a single atomic unit.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;

pub use common::{DepartmentId, OrderId, SubjectId};
pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use query::OrderQuery;
pub use record::{OrderRecord, ReceiptRecord, Version};
pub use store::{OrderStore, OrderStoreExt};
