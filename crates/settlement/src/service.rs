//! Settlement service.

use std::time::Instant;

use chrono::Utc;
use common::OrderId;
use domain::{
    DomainError, FulfillmentOrder, Money, OrderRepository, PaymentMethod, Receipt, ensure_version,
};
use order_store::{OrderStore, StoreError, Version};

use crate::allocator::ReceiptNumberAllocator;
use crate::error::{Result, SettlementError};
use crate::retry::RetryPolicy;

/// Command to settle an order at pickup.
#[derive(Debug, Clone)]
pub struct SettleOrder {
    pub order_id: OrderId,
    pub expected_version: Version,
    pub amount_tendered: Money,
    pub payment_method: PaymentMethod,

    /// Staff member taking the payment.
    pub actor: String,
}

impl SettleOrder {
    pub fn new(
        order_id: OrderId,
        expected_version: Version,
        amount_tendered: Money,
        payment_method: PaymentMethod,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            expected_version,
            amount_tendered,
            payment_method,
            actor: actor.into(),
        }
    }
}

/// A completed settlement.
#[derive(Debug, Clone)]
pub struct SettlementResult {
    /// The order, now `settled`.
    pub order: FulfillmentOrder,
    pub receipt: Receipt,
    pub new_version: Version,

    /// Number of attempts it took, including the successful one.
    pub attempts: u32,
}

/// Settles orders: checks payment, issues exactly one receipt and commits
/// it together with the `settled` order.
#[derive(Clone)]
pub struct SettlementService<S, N>
where
    S: OrderStore,
    N: ReceiptNumberAllocator,
{
    repository: OrderRepository<S>,
    allocator: N,
    retry: RetryPolicy,
}

impl<S, N> SettlementService<S, N>
where
    S: OrderStore,
    N: ReceiptNumberAllocator,
{
    /// Creates a new settlement service.
    pub fn new(store: S, allocator: N, retry: RetryPolicy) -> Self {
        Self {
            repository: OrderRepository::new(store),
            allocator,
            retry,
        }
    }

    /// Settles an order.
    ///
    /// Fails with `AlreadySettled` (carrying the existing receipt) if the
    /// order was settled before, whatever version the caller supplies.
    /// Transient storage failures re-run the whole unit, from a fresh read,
    /// up to the policy's attempt limit.
    #[tracing::instrument(
        skip(self, cmd),
        fields(order_id = %cmd.order_id, payment_method = %cmd.payment_method)
    )]
    pub async fn settle(&self, cmd: SettleOrder) -> Result<SettlementResult> {
        let started = Instant::now();
        let mut attempt = 1;

        loop {
            match self.try_settle(&cmd, attempt).await {
                Ok(mut result) => {
                    result.attempts = attempt;
                    metrics::counter!("settlements_total").increment(1);
                    metrics::histogram!("settlement_duration_seconds")
                        .record(started.elapsed().as_secs_f64());
                    tracing::info!(
                        receipt_number = %result.receipt.receipt_number,
                        amount_due = %result.receipt.amount_due,
                        change_given = %result.receipt.change_given,
                        attempts = attempt,
                        "order settled"
                    );
                    return Ok(result);
                }
                Err(err) if err.is_transient() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.backoff(attempt);
                    metrics::counter!("settlement_retries_total").increment(1);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying settlement"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    let err = match err {
                        SettlementError::Domain(source) if source.is_transient() => {
                            SettlementError::RetriesExhausted {
                                attempts: attempt,
                                source,
                            }
                        }
                        other => other,
                    };
                    metrics::counter!("settlement_rejections_total", "reason" => err.reason())
                        .increment(1);
                    metrics::histogram!("settlement_duration_seconds")
                        .record(started.elapsed().as_secs_f64());
                    tracing::info!(kind = %err.kind(), error = %err, "settlement rejected");
                    return Err(err);
                }
            }
        }
    }

    /// Returns the receipt issued for an order, if any.
    #[tracing::instrument(skip(self))]
    pub async fn get_receipt(&self, order_id: OrderId) -> Result<Option<Receipt>> {
        Ok(self.repository.find_receipt(order_id).await?)
    }

    /// One settlement unit: read, check, allocate, commit.
    #[tracing::instrument(skip(self, cmd))]
    async fn try_settle(&self, cmd: &SettleOrder, attempt: u32) -> Result<SettlementResult> {
        let mut order = self.repository.load(cmd.order_id).await?;

        if order.settlement().is_some() {
            return Err(self.already_settled(&order).await?);
        }

        ensure_version(&order, cmd.expected_version)?;
        let amount_due = order.check_settleable(cmd.amount_tendered, cmd.payment_method)?;

        let issued_at = Utc::now();
        let receipt_number = self.allocator.allocate(issued_at).await?;
        let receipt = Receipt::issue(
            receipt_number,
            order.id(),
            amount_due,
            cmd.amount_tendered,
            cmd.payment_method,
            cmd.actor.clone(),
            issued_at,
        );

        let event = order.settle(receipt.clone())?;
        order.apply(event);

        match self
            .repository
            .commit_settlement(cmd.expected_version, &mut order, &receipt)
            .await
        {
            Ok(()) => Ok(SettlementResult {
                new_version: order.version(),
                order,
                receipt,
                attempts: attempt,
            }),
            // Lost a race; if the winner settled the order, read through.
            Err(err @ DomainError::ConcurrentModification { .. }) => {
                match self.repository.find_receipt(cmd.order_id).await? {
                    Some(existing) => Err(SettlementError::AlreadySettled(Box::new(existing))),
                    None => Err(err.into()),
                }
            }
            // No receipt for this order means the number itself collided.
            Err(DomainError::Store(StoreError::DuplicateReceipt { receipt_number, .. })) => {
                match self.repository.find_receipt(cmd.order_id).await? {
                    Some(existing) => Err(SettlementError::AlreadySettled(Box::new(existing))),
                    None => {
                        metrics::counter!("receipt_number_collisions_total").increment(1);
                        Err(SettlementError::ReceiptNumberTaken(receipt_number))
                    }
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn already_settled(&self, order: &FulfillmentOrder) -> Result<SettlementError> {
        let receipt = match self.repository.find_receipt(order.id()).await? {
            Some(receipt) => receipt,
            // The order document carries a copy of its receipt.
            None => order
                .settlement()
                .cloned()
                .ok_or(DomainError::NotFound(order.id()))?,
        };
        Ok(SettlementError::AlreadySettled(Box::new(receipt)))
    }
}
