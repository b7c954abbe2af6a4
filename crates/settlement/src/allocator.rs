//! Receipt number allocation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use order_store::OrderStore;

use crate::error::Result;

/// Hands out globally unique, human-referenceable receipt numbers.
///
/// Numbers allocated for a settlement that then fails are simply skipped;
/// gaps are allowed, duplicates are not.
#[async_trait]
pub trait ReceiptNumberAllocator: Send + Sync {
    async fn allocate(&self, issued_at: DateTime<Utc>) -> Result<String>;
}

/// Formats `{prefix}-{YYYYMMDD}-{seq:06}` from the store's global sequence.
#[derive(Clone)]
pub struct SequentialReceiptNumbers<S: OrderStore> {
    store: S,
    prefix: String,
}

impl<S: OrderStore> SequentialReceiptNumbers<S> {
    pub const DEFAULT_PREFIX: &'static str = "RCPT";

    pub fn new(store: S) -> Self {
        Self::with_prefix(store, Self::DEFAULT_PREFIX)
    }

    pub fn with_prefix(store: S, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl<S: OrderStore> ReceiptNumberAllocator for SequentialReceiptNumbers<S> {
    async fn allocate(&self, issued_at: DateTime<Utc>) -> Result<String> {
        let sequence = self.store.next_receipt_sequence().await?;
        Ok(format!(
            "{}-{}-{:06}",
            self.prefix,
            issued_at.format("%Y%m%d"),
            sequence
        ))
    }
}
