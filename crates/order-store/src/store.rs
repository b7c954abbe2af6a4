use async_trait::async_trait;

use crate::{OrderId, OrderQuery, OrderRecord, ReceiptRecord, Result, StoreError, Version};

/// Core trait for order store implementations.
///
/// The store exclusively owns persisted order state. Callers work on
/// checked-out copies and write them back through `compare_and_swap`, which
/// only succeeds if nobody else wrote in between. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Stores a new order. The record must be at the initial version.
    async fn insert(&self, record: OrderRecord) -> Result<()>;

    /// Retrieves an order, or None if it doesn't exist.
    async fn get(&self, order_id: OrderId) -> Result<Option<OrderRecord>>;

    /// Replaces the stored order if its version equals `expected`.
    ///
    /// `record.version` must be `expected.next()`. Returns `false` without
    /// writing anything when the stored version has moved on.
    async fn compare_and_swap(&self, expected: Version, record: OrderRecord) -> Result<bool>;

    /// Replaces the stored order and inserts its receipt as one atomic unit.
    ///
    /// Either both writes become visible or neither does. Returns `false` on a
    /// version mismatch and fails with `DuplicateReceipt` if the order already
    /// has a receipt or the receipt number is taken.
    async fn commit_settlement(
        &self,
        expected: Version,
        record: OrderRecord,
        receipt: ReceiptRecord,
    ) -> Result<bool>;

    /// Retrieves the receipt issued for an order.
    async fn get_receipt(&self, order_id: OrderId) -> Result<Option<ReceiptRecord>>;

    /// Retrieves a receipt by its number.
    async fn get_receipt_by_number(&self, receipt_number: &str) -> Result<Option<ReceiptRecord>>;

    /// Retrieves orders matching a query.
    async fn query(&self, query: OrderQuery) -> Result<Vec<OrderRecord>>;

    /// Returns the next value of the global receipt sequence.
    ///
    /// Values are unique and increasing; gaps are allowed.
    async fn next_receipt_sequence(&self) -> Result<i64>;
}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Retrieves an order, failing with `NotFound` if it doesn't exist.
    async fn require(&self, order_id: OrderId) -> Result<OrderRecord> {
        self.get(order_id)
            .await?
            .ok_or(StoreError::NotFound(order_id))
    }

    /// Returns the current version of an order, or None if it doesn't exist.
    async fn current_version(&self, order_id: OrderId) -> Result<Option<Version>> {
        Ok(self.get(order_id).await?.map(|r| r.version))
    }

    /// Like `compare_and_swap`, but reports a lost race as `ConcurrencyConflict`.
    async fn swap_or_conflict(&self, expected: Version, record: OrderRecord) -> Result<()> {
        let order_id = record.order_id;
        if self.compare_and_swap(expected, record).await? {
            return Ok(());
        }
        let actual = self
            .current_version(order_id)
            .await?
            .ok_or(StoreError::NotFound(order_id))?;
        Err(StoreError::ConcurrencyConflict {
            order_id,
            expected,
            actual,
        })
    }
}

// Blanket implementation for all OrderStore implementations
impl<T: OrderStore + ?Sized> OrderStoreExt for T {}

/// Validates a record before it is inserted.
pub fn validate_insert(record: &OrderRecord) -> Result<()> {
    if record.version != Version::initial() {
        return Err(StoreError::InvalidRecord {
            order_id: record.order_id,
            reason: format!(
                "new orders must be at version {}, got {}",
                Version::initial(),
                record.version
            ),
        });
    }
    Ok(())
}

/// Validates a record before it replaces the version `expected`.
pub fn validate_swap(expected: Version, record: &OrderRecord) -> Result<()> {
    if record.version != expected.next() {
        return Err(StoreError::InvalidRecord {
            order_id: record.order_id,
            reason: format!(
                "record version must be {}, got {}",
                expected.next(),
                record.version
            ),
        });
    }
    Ok(())
}

/// Validates an order/receipt pair before a settlement commit.
pub fn validate_settlement(
    expected: Version,
    record: &OrderRecord,
    receipt: &ReceiptRecord,
) -> Result<()> {
    validate_swap(expected, record)?;
    if receipt.order_id != record.order_id {
        return Err(StoreError::InvalidRecord {
            order_id: record.order_id,
            reason: format!("receipt belongs to order {}", receipt.order_id),
        });
    }
    if receipt.receipt_number.trim().is_empty() {
        return Err(StoreError::InvalidRecord {
            order_id: record.order_id,
            reason: "receipt number is empty".to_string(),
        });
    }
    Ok(())
}
