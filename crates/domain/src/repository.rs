//! Typed access to the order store.
//!
//! Converts [`FulfillmentOrder`] and [`Receipt`] to and from the store's
//! opaque records. All version bookkeeping for writes happens here: a saved
//! order is stamped `expected.next()` before it is swapped in.

use common::OrderId;
use order_store::{
    OrderQuery, OrderRecord, OrderStore, OrderStoreExt, ReceiptRecord, StoreError, Version,
};

use crate::error::DomainError;
use crate::order::FulfillmentOrder;
use crate::receipt::Receipt;

/// Loads and saves fulfillment orders through an [`OrderStore`].
#[derive(Clone)]
pub struct OrderRepository<S: OrderStore> {
    store: S,
}

impl<S: OrderStore> OrderRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an order, returning None if it doesn't exist.
    pub async fn find(&self, order_id: OrderId) -> Result<Option<FulfillmentOrder>, DomainError> {
        match self.store.get(order_id).await? {
            Some(record) => Ok(Some(order_from_record(record)?)),
            None => Ok(None),
        }
    }

    /// Loads an order, failing with `NotFound` if it doesn't exist.
    pub async fn load(&self, order_id: OrderId) -> Result<FulfillmentOrder, DomainError> {
        let record = self.store.require(order_id).await?;
        order_from_record(record)
    }

    /// Persists a newly created order at the initial version.
    pub async fn insert(&self, order: &FulfillmentOrder) -> Result<(), DomainError> {
        self.store.insert(order_to_record(order)?).await?;
        Ok(())
    }

    /// Swaps in `order` if the stored version is still `expected`.
    ///
    /// On success the order carries its new version.
    pub async fn save(
        &self,
        expected: Version,
        order: &mut FulfillmentOrder,
    ) -> Result<(), DomainError> {
        order.set_version(expected.next());
        let record = order_to_record(order)?;
        self.store.swap_or_conflict(expected, record).await?;
        Ok(())
    }

    /// Writes the settled order and its receipt as one unit.
    ///
    /// A lost race is reported as `ConcurrentModification`; an existing
    /// receipt surfaces as a `DuplicateReceipt` store error.
    pub async fn commit_settlement(
        &self,
        expected: Version,
        order: &mut FulfillmentOrder,
        receipt: &Receipt,
    ) -> Result<(), DomainError> {
        order.set_version(expected.next());
        let record = order_to_record(order)?;
        let receipt_record = receipt_to_record(receipt)?;

        if self
            .store
            .commit_settlement(expected, record, receipt_record)
            .await?
        {
            return Ok(());
        }

        let actual = self
            .store
            .current_version(order.id())
            .await?
            .ok_or(StoreError::NotFound(order.id()))?;
        Err(DomainError::ConcurrentModification {
            order_id: order.id(),
            expected,
            actual,
        })
    }

    /// Returns the receipt issued for an order, if any.
    pub async fn find_receipt(&self, order_id: OrderId) -> Result<Option<Receipt>, DomainError> {
        match self.store.get_receipt(order_id).await? {
            Some(record) => Ok(Some(receipt_from_record(record)?)),
            None => Ok(None),
        }
    }

    /// Returns the orders matching a worklist query.
    pub async fn list(&self, query: OrderQuery) -> Result<Vec<FulfillmentOrder>, DomainError> {
        self.store
            .query(query)
            .await?
            .into_iter()
            .map(order_from_record)
            .collect()
    }
}

/// Converts an order into a store record at the order's current version.
pub fn order_to_record(order: &FulfillmentOrder) -> Result<OrderRecord, DomainError> {
    Ok(OrderRecord {
        order_id: order.id(),
        version: order.version(),
        status: order.status().as_str().to_string(),
        subject_id: order.subject_id(),
        origin_department_id: order.origin_department_id().clone(),
        fulfilling_department_id: order.fulfilling_department_id().clone(),
        created_at: order.created_at(),
        updated_at: order.updated_at(),
        document: serde_json::to_value(order)?,
    })
}

/// Decodes a store record. The record's version wins over the document's.
pub fn order_from_record(record: OrderRecord) -> Result<FulfillmentOrder, DomainError> {
    let mut order: FulfillmentOrder = serde_json::from_value(record.document)?;
    order.set_version(record.version);
    Ok(order)
}

pub fn receipt_to_record(receipt: &Receipt) -> Result<ReceiptRecord, DomainError> {
    Ok(ReceiptRecord {
        receipt_number: receipt.receipt_number.clone(),
        order_id: receipt.order_id,
        issued_at: receipt.issued_at,
        document: serde_json::to_value(receipt)?,
    })
}

pub fn receipt_from_record(record: ReceiptRecord) -> Result<Receipt, DomainError> {
    Ok(serde_json::from_value(record.document)?)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::{ProviderId, SubjectId};
    use order_store::InMemoryOrderStore;

    use super::*;
    use crate::ErrorKind;
    use crate::order::{CreateOrder, Money, OrderItem, OrderStatus};

    fn new_order() -> FulfillmentOrder {
        let cmd = CreateOrder::new(
            SubjectId::new(),
            ProviderId::new(),
            "oncology",
            "lab",
            OrderItem::new("CBC panel", 1, Money::from_cents(4500)),
            "dr.jones",
        );
        FulfillmentOrder::create(cmd, Utc::now()).unwrap().0
    }

    #[tokio::test]
    async fn insert_then_load() {
        let repo = OrderRepository::new(InMemoryOrderStore::new());
        let order = new_order();
        repo.insert(&order).await.unwrap();

        let loaded = repo.load(order.id()).await.unwrap();
        assert_eq!(loaded, order);

        let record = repo.store().get(order.id()).await.unwrap().unwrap();
        assert_eq!(record.status, "created");
        assert_eq!(record.fulfilling_department_id.as_str(), "lab");
    }

    #[tokio::test]
    async fn load_missing_is_not_found() {
        let repo = OrderRepository::new(InMemoryOrderStore::new());
        let err = repo.load(OrderId::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(repo.find(OrderId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_bumps_version() {
        let repo = OrderRepository::new(InMemoryOrderStore::new());
        let mut order = new_order();
        repo.insert(&order).await.unwrap();

        let event = order
            .advance_to(OrderStatus::SentToFulfiller, "dr.jones", Utc::now())
            .unwrap();
        order.apply(event);
        repo.save(Version::initial(), &mut order).await.unwrap();

        assert_eq!(order.version(), Version::new(1));
        let loaded = repo.load(order.id()).await.unwrap();
        assert_eq!(loaded.version(), Version::new(1));
        assert_eq!(loaded.status(), OrderStatus::SentToFulfiller);
    }

    #[tokio::test]
    async fn save_with_stale_version_conflicts() {
        let repo = OrderRepository::new(InMemoryOrderStore::new());
        let mut order = new_order();
        repo.insert(&order).await.unwrap();
        let mut stale = order.clone();

        repo.save(Version::initial(), &mut order).await.unwrap();
        let err = repo.save(Version::initial(), &mut stale).await.unwrap_err();

        assert!(matches!(
            err,
            DomainError::ConcurrentModification { expected, actual, .. }
                if expected == Version::initial() && actual == Version::new(1)
        ));
    }
}
