use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    OrderId, OrderQuery, OrderRecord, ReceiptRecord, Result, StoreError, Version,
    store::{OrderStore, validate_insert, validate_settlement, validate_swap},
};

#[derive(Debug, Default)]
struct Tables {
    orders: HashMap<OrderId, OrderRecord>,
    receipts: HashMap<OrderId, ReceiptRecord>,
    receipt_numbers: HashMap<String, OrderId>,
}

/// In-memory order store.
///
/// Used by tests and by the server when no database is configured. Cloning
/// the store yields another handle to the same tables.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<Tables>>,
    receipt_sequence: Arc<AtomicI64>,
    injected_failures: Arc<AtomicUsize>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` writes fail with `StoreError::Unavailable`.
    pub fn fail_next_writes(&self, count: usize) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns the number of stored receipts.
    pub async fn receipt_count(&self) -> usize {
        self.tables.read().await.receipts.len()
    }

    fn take_injected_failure(&self) -> Result<()> {
        let injected = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, record: OrderRecord) -> Result<()> {
        validate_insert(&record)?;
        self.take_injected_failure()?;

        let mut tables = self.tables.write().await;
        if tables.orders.contains_key(&record.order_id) {
            return Err(StoreError::AlreadyExists(record.order_id));
        }
        tables.orders.insert(record.order_id, record);
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn compare_and_swap(&self, expected: Version, record: OrderRecord) -> Result<bool> {
        validate_swap(expected, &record)?;
        self.take_injected_failure()?;

        let mut tables = self.tables.write().await;
        let stored = tables
            .orders
            .get_mut(&record.order_id)
            .ok_or(StoreError::NotFound(record.order_id))?;

        if stored.version != expected {
            return Ok(false);
        }
        *stored = record;
        Ok(true)
    }

    async fn commit_settlement(
        &self,
        expected: Version,
        record: OrderRecord,
        receipt: ReceiptRecord,
    ) -> Result<bool> {
        validate_settlement(expected, &record, &receipt)?;
        self.take_injected_failure()?;

        // Both checks happen under one write lock, so nothing is visible
        // until both the order and the receipt are in place.
        let mut tables = self.tables.write().await;
        let stored_version = tables
            .orders
            .get(&record.order_id)
            .map(|r| r.version)
            .ok_or(StoreError::NotFound(record.order_id))?;

        if stored_version != expected {
            return Ok(false);
        }
        if tables.receipts.contains_key(&record.order_id)
            || tables.receipt_numbers.contains_key(&receipt.receipt_number)
        {
            return Err(StoreError::DuplicateReceipt {
                order_id: record.order_id,
                receipt_number: receipt.receipt_number,
            });
        }

        tables
            .receipt_numbers
            .insert(receipt.receipt_number.clone(), record.order_id);
        tables.receipts.insert(record.order_id, receipt);
        tables.orders.insert(record.order_id, record);
        Ok(true)
    }

    async fn get_receipt(&self, order_id: OrderId) -> Result<Option<ReceiptRecord>> {
        Ok(self.tables.read().await.receipts.get(&order_id).cloned())
    }

    async fn get_receipt_by_number(&self, receipt_number: &str) -> Result<Option<ReceiptRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .receipt_numbers
            .get(receipt_number)
            .and_then(|order_id| tables.receipts.get(order_id))
            .cloned())
    }

    async fn query(&self, query: OrderQuery) -> Result<Vec<OrderRecord>> {
        let tables = self.tables.read().await;
        let mut records: Vec<_> = tables
            .orders
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();

        records.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then(a.order_id.cmp(&b.order_id))
        });

        let records = records.into_iter().skip(query.offset.unwrap_or(0));
        let records = match query.limit {
            Some(limit) => records.take(limit).collect(),
            None => records.collect(),
        };
        Ok(records)
    }

    async fn next_receipt_sequence(&self) -> Result<i64> {
        Ok(self.receipt_sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{DepartmentId, SubjectId};

    fn create_record(order_id: OrderId, version: Version, status: &str) -> OrderRecord {
        let now = Utc::now();
        OrderRecord {
            order_id,
            version,
            status: status.to_string(),
            subject_id: SubjectId::new(),
            origin_department_id: DepartmentId::new("cardiology"),
            fulfilling_department_id: DepartmentId::new("pharmacy"),
            created_at: now,
            updated_at: now,
            document: serde_json::json!({"status": status}),
        }
    }

    fn create_receipt(order_id: OrderId, number: &str) -> ReceiptRecord {
        ReceiptRecord {
            receipt_number: number.to_string(),
            order_id,
            issued_at: Utc::now(),
            document: serde_json::json!({"receipt_number": number}),
        }
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = InMemoryOrderStore::new();
        let order_id = OrderId::new();

        store
            .insert(create_record(order_id, Version::initial(), "created"))
            .await
            .unwrap();

        let stored = store.get(order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, "created");
        assert_eq!(stored.version, Version::initial());
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn insert_twice_fails() {
        let store = InMemoryOrderStore::new();
        let order_id = OrderId::new();
        let record = create_record(order_id, Version::initial(), "created");

        store.insert(record.clone()).await.unwrap();
        let result = store.insert(record).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn insert_rejects_non_initial_version() {
        let store = InMemoryOrderStore::new();
        let result = store
            .insert(create_record(OrderId::new(), Version::new(3), "created"))
            .await;
        assert!(matches!(result, Err(StoreError::InvalidRecord { .. })));
    }

    #[tokio::test]
    async fn compare_and_swap_success() {
        let store = InMemoryOrderStore::new();
        let order_id = OrderId::new();
        store
            .insert(create_record(order_id, Version::initial(), "created"))
            .await
            .unwrap();

        let swapped = store
            .compare_and_swap(
                Version::initial(),
                create_record(order_id, Version::new(1), "sent_to_fulfiller"),
            )
            .await
            .unwrap();

        assert!(swapped);
        let stored = store.get(order_id).await.unwrap().unwrap();
        assert_eq!(stored.version, Version::new(1));
        assert_eq!(stored.status, "sent_to_fulfiller");
    }

    #[tokio::test]
    async fn compare_and_swap_on_stale_version_writes_nothing() {
        let store = InMemoryOrderStore::new();
        let order_id = OrderId::new();
        store
            .insert(create_record(order_id, Version::initial(), "created"))
            .await
            .unwrap();
        store
            .compare_and_swap(
                Version::initial(),
                create_record(order_id, Version::new(1), "sent_to_fulfiller"),
            )
            .await
            .unwrap();

        // A second writer still holding version 0
        let swapped = store
            .compare_and_swap(
                Version::initial(),
                create_record(order_id, Version::new(1), "cancelled"),
            )
            .await
            .unwrap();

        assert!(!swapped);
        let stored = store.get(order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, "sent_to_fulfiller");
    }

    #[tokio::test]
    async fn compare_and_swap_missing_order() {
        let store = InMemoryOrderStore::new();
        let order_id = OrderId::new();
        let result = store
            .compare_and_swap(
                Version::initial(),
                create_record(order_id, Version::new(1), "received"),
            )
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn swap_or_conflict_reports_versions() {
        use crate::OrderStoreExt;

        let store = InMemoryOrderStore::new();
        let order_id = OrderId::new();
        store
            .insert(create_record(order_id, Version::initial(), "created"))
            .await
            .unwrap();
        store
            .swap_or_conflict(
                Version::initial(),
                create_record(order_id, Version::new(1), "sent_to_fulfiller"),
            )
            .await
            .unwrap();

        let result = store
            .swap_or_conflict(
                Version::initial(),
                create_record(order_id, Version::new(1), "cancelled"),
            )
            .await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { expected, actual, .. })
                if expected == Version::initial() && actual == Version::new(1)
        ));
    }

    #[tokio::test]
    async fn commit_settlement_writes_order_and_receipt() {
        let store = InMemoryOrderStore::new();
        let order_id = OrderId::new();
        store
            .insert(create_record(order_id, Version::initial(), "ready_for_pickup"))
            .await
            .unwrap();

        let committed = store
            .commit_settlement(
                Version::initial(),
                create_record(order_id, Version::new(1), "settled"),
                create_receipt(order_id, "RCPT-0001"),
            )
            .await
            .unwrap();

        assert!(committed);
        assert_eq!(store.get(order_id).await.unwrap().unwrap().status, "settled");
        assert!(store.get_receipt(order_id).await.unwrap().is_some());
        let by_number = store.get_receipt_by_number("RCPT-0001").await.unwrap();
        assert_eq!(by_number.unwrap().order_id, order_id);
    }

    #[tokio::test]
    async fn commit_settlement_on_stale_version_writes_nothing() {
        let store = InMemoryOrderStore::new();
        let order_id = OrderId::new();
        store
            .insert(create_record(order_id, Version::initial(), "ready_for_pickup"))
            .await
            .unwrap();

        let committed = store
            .commit_settlement(
                Version::new(4),
                create_record(order_id, Version::new(5), "settled"),
                create_receipt(order_id, "RCPT-0001"),
            )
            .await
            .unwrap();

        assert!(!committed);
        assert_eq!(store.receipt_count().await, 0);
        assert_eq!(
            store.get(order_id).await.unwrap().unwrap().status,
            "ready_for_pickup"
        );
    }

    #[tokio::test]
    async fn commit_settlement_rejects_second_receipt() {
        let store = InMemoryOrderStore::new();
        let order_id = OrderId::new();
        store
            .insert(create_record(order_id, Version::initial(), "ready_for_pickup"))
            .await
            .unwrap();
        store
            .commit_settlement(
                Version::initial(),
                create_record(order_id, Version::new(1), "settled"),
                create_receipt(order_id, "RCPT-0001"),
            )
            .await
            .unwrap();

        let result = store
            .commit_settlement(
                Version::new(1),
                create_record(order_id, Version::new(2), "settled"),
                create_receipt(order_id, "RCPT-0002"),
            )
            .await;

        assert!(matches!(result, Err(StoreError::DuplicateReceipt { .. })));
        assert_eq!(store.receipt_count().await, 1);
        assert_eq!(
            store.get(order_id).await.unwrap().unwrap().version,
            Version::new(1)
        );
    }

    #[tokio::test]
    async fn commit_settlement_rejects_taken_receipt_number() {
        let store = InMemoryOrderStore::new();
        let first = OrderId::new();
        let second = OrderId::new();
        for id in [first, second] {
            store
                .insert(create_record(id, Version::initial(), "ready_for_pickup"))
                .await
                .unwrap();
        }
        store
            .commit_settlement(
                Version::initial(),
                create_record(first, Version::new(1), "settled"),
                create_receipt(first, "RCPT-0001"),
            )
            .await
            .unwrap();

        let result = store
            .commit_settlement(
                Version::initial(),
                create_record(second, Version::new(1), "settled"),
                create_receipt(second, "RCPT-0001"),
            )
            .await;

        assert!(matches!(result, Err(StoreError::DuplicateReceipt { .. })));
        assert_eq!(
            store.get(second).await.unwrap().unwrap().status,
            "ready_for_pickup"
        );
    }

    #[tokio::test]
    async fn injected_failures_are_transient_and_counted() {
        let store = InMemoryOrderStore::new();
        store.fail_next_writes(2);

        for _ in 0..2 {
            let err = store
                .insert(create_record(OrderId::new(), Version::initial(), "created"))
                .await
                .unwrap_err();
            assert!(err.is_transient());
        }

        store
            .insert(create_record(OrderId::new(), Version::initial(), "created"))
            .await
            .unwrap();
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn query_applies_filters_and_paging() {
        let store = InMemoryOrderStore::new();
        for status in ["created", "received", "received", "received"] {
            store
                .insert(create_record(OrderId::new(), Version::initial(), status))
                .await
                .unwrap();
        }

        let received = store
            .query(OrderQuery::for_fulfiller("pharmacy").status("received"))
            .await
            .unwrap();
        assert_eq!(received.len(), 3);

        let page = store
            .query(OrderQuery::new().status("received").offset(1).limit(1))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].order_id, received[1].order_id);
    }

    #[tokio::test]
    async fn receipt_sequence_is_monotonic() {
        let store = InMemoryOrderStore::new();
        let a = store.next_receipt_sequence().await.unwrap();
        let b = store.next_receipt_sequence().await.unwrap();
        assert_eq!(a, 1);
        assert!(b > a);
    }
}
