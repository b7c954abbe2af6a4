//! Typed façade over the workflow engine and settlement service.
//!
//! No business rules live here. The façade translates boundary values
//! (legacy status names, optional coverage fields) into engine commands and
//! folds `AlreadySettled` into a normal outcome.

use common::OrderId;
use domain::{
    AdvanceOrder, AmendOrder, CancelOrder, CommandResult, CoverageTerms, CreateOrder,
    FulfillmentOrder, Money, OrderStatus, Receipt, VerifyCoverage, WorkflowConfig,
    WorkflowEngine,
};
use order_store::{OrderQuery, OrderStore, Version};
use settlement::{
    ReceiptNumberAllocator, RetryPolicy, SettleOrder, SettlementError, SettlementResult,
    SettlementService,
};

use crate::error::ApiError;

/// Result of a settle request.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    /// This call settled the order.
    Settled(SettlementResult),

    /// The order was settled earlier; this is its receipt.
    AlreadySettled(Receipt),
}

/// Request/response operations exposed to external callers.
#[derive(Clone)]
pub struct OrchestrationApi<S, N>
where
    S: OrderStore,
    N: ReceiptNumberAllocator,
{
    engine: WorkflowEngine<S>,
    settlement: SettlementService<S, N>,
}

impl<S, N> OrchestrationApi<S, N>
where
    S: OrderStore + Clone,
    N: ReceiptNumberAllocator,
{
    pub fn new(store: S, allocator: N, workflow: WorkflowConfig, retry: RetryPolicy) -> Self {
        Self {
            engine: WorkflowEngine::new(store.clone(), workflow),
            settlement: SettlementService::new(store, allocator, retry),
        }
    }

    pub async fn create_order(&self, cmd: CreateOrder) -> Result<CommandResult, ApiError> {
        Ok(self.engine.create_order(cmd).await?)
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<FulfillmentOrder, ApiError> {
        Ok(self.engine.get_order(order_id).await?)
    }

    pub async fn list_orders(&self, query: OrderQuery) -> Result<Vec<FulfillmentOrder>, ApiError> {
        Ok(self.engine.list_orders(query).await?)
    }

    /// Advances an order to `status`, which may be a legacy synonym.
    pub async fn advance(
        &self,
        order_id: OrderId,
        status: &str,
        expected_version: Version,
        actor: &str,
    ) -> Result<CommandResult, ApiError> {
        let target = parse_status(status)?;
        Ok(self
            .engine
            .advance(AdvanceOrder::new(order_id, target, expected_version, actor))
            .await?)
    }

    pub async fn verify_coverage(&self, cmd: VerifyCoverage) -> Result<CommandResult, ApiError> {
        Ok(self.engine.verify_coverage(cmd).await?)
    }

    pub async fn amend(&self, cmd: AmendOrder) -> Result<CommandResult, ApiError> {
        Ok(self.engine.amend(cmd).await?)
    }

    pub async fn cancel(&self, cmd: CancelOrder) -> Result<CommandResult, ApiError> {
        Ok(self.engine.cancel(cmd).await?)
    }

    pub async fn settle(&self, cmd: SettleOrder) -> Result<SettlementOutcome, ApiError> {
        match self.settlement.settle(cmd).await {
            Ok(result) => Ok(SettlementOutcome::Settled(result)),
            Err(SettlementError::AlreadySettled(receipt)) => {
                Ok(SettlementOutcome::AlreadySettled(*receipt))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_receipt(&self, order_id: OrderId) -> Result<Receipt, ApiError> {
        self.settlement
            .get_receipt(order_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("No receipt for order {order_id}")))
    }
}

/// Builds coverage terms from the optional request fields.
///
/// Both fields set is invalid; neither set means "use the default terms".
pub fn coverage_terms(
    coverage_percentage: Option<f64>,
    fixed_copay: Option<Money>,
) -> Result<Option<CoverageTerms>, ApiError> {
    Ok(CoverageTerms::from_fields(coverage_percentage, fixed_copay)?)
}

/// Maps a status name, including legacy synonyms, onto the canonical status.
///
/// Matching ignores case and treats `-` and spaces as `_`.
pub fn parse_status(raw: &str) -> Result<OrderStatus, ApiError> {
    let normalized: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect();

    if let Ok(status) = normalized.parse::<OrderStatus>() {
        return Ok(status);
    }

    let status = match normalized.as_str() {
        "new" | "pending" | "draft" => OrderStatus::Created,
        "sent" | "ordered" => OrderStatus::SentToFulfiller,
        "acknowledged" | "accepted" => OrderStatus::Received,
        "verified" | "insurance_verified" => OrderStatus::CoverageVerified,
        "processing" | "in_progress" | "dispensing" | "collecting" => OrderStatus::InProcessing,
        "ready" => OrderStatus::ReadyForPickup,
        "paid" | "completed" | "dispensed" => OrderStatus::Settled,
        "canceled" | "void" => OrderStatus::Cancelled,
        _ => {
            return Err(ApiError::BadRequest(format!("Unknown order status: {raw}")));
        }
    };
    tracing::debug!(synonym = %raw, %status, "mapped legacy status name");
    metrics::counter!("legacy_status_synonyms_total", "status" => status.as_str()).increment(1);
    Ok(status)
}

#[cfg(test)]
mod tests {
    use common::{ProviderId, SubjectId};
    use domain::{ErrorKind, OrderItem, PaymentMethod};
    use order_store::InMemoryOrderStore;
    use settlement::SequentialReceiptNumbers;

    use super::*;

    #[test]
    fn canonical_names_parse() {
        for status in OrderStatus::ALL {
            assert_eq!(parse_status(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn legacy_synonyms_map_to_canonical() {
        let cases = [
            ("New", OrderStatus::Created),
            ("pending", OrderStatus::Created),
            ("DRAFT", OrderStatus::Created),
            ("sent", OrderStatus::SentToFulfiller),
            ("Ordered", OrderStatus::SentToFulfiller),
            ("acknowledged", OrderStatus::Received),
            ("accepted", OrderStatus::Received),
            ("insurance-verified", OrderStatus::CoverageVerified),
            ("verified", OrderStatus::CoverageVerified),
            ("In Progress", OrderStatus::InProcessing),
            ("dispensing", OrderStatus::InProcessing),
            ("collecting", OrderStatus::InProcessing),
            ("ready", OrderStatus::ReadyForPickup),
            ("ready-for-pickup", OrderStatus::ReadyForPickup),
            ("paid", OrderStatus::Settled),
            ("dispensed", OrderStatus::Settled),
            ("canceled", OrderStatus::Cancelled),
            ("VOID", OrderStatus::Cancelled),
        ];
        for (raw, expected) in cases {
            assert_eq!(parse_status(raw).unwrap(), expected, "{raw}");
        }
    }

    #[test]
    fn unknown_status_is_invalid_input() {
        let err = parse_status("shipped").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn both_coverage_fields_are_rejected() {
        let err = coverage_terms(Some(80.0), Some(Money::from_cents(500))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCoverageTerms);
        assert_eq!(coverage_terms(None, None).unwrap(), None);
    }

    #[tokio::test]
    async fn settle_twice_is_an_outcome_not_an_error() {
        let store = InMemoryOrderStore::new();
        let api = OrchestrationApi::new(
            store.clone(),
            SequentialReceiptNumbers::new(store),
            WorkflowConfig::default(),
            RetryPolicy::no_retry(),
        );

        let mut order = api
            .create_order(CreateOrder::new(
                SubjectId::new(),
                ProviderId::new(),
                "cardiology",
                "pharmacy",
                OrderItem::new("Warfarin 5mg", 1, Money::from_cents(12550)),
                "dr.smith",
            ))
            .await
            .unwrap()
            .order;
        for status in ["sent", "received"] {
            order = api
                .advance(order.id(), status, order.version(), "staff")
                .await
                .unwrap()
                .order;
        }
        order = api
            .verify_coverage(VerifyCoverage::new(order.id(), order.version(), "billing"))
            .await
            .unwrap()
            .order;
        for status in ["processing", "ready"] {
            order = api
                .advance(order.id(), status, order.version(), "staff")
                .await
                .unwrap()
                .order;
        }

        let cmd = SettleOrder::new(
            order.id(),
            order.version(),
            Money::from_cents(3000),
            PaymentMethod::Cash,
            "cashier",
        );
        let first = match api.settle(cmd.clone()).await.unwrap() {
            SettlementOutcome::Settled(result) => result.receipt,
            other => panic!("expected a new settlement, got {other:?}"),
        };
        match api.settle(cmd).await.unwrap() {
            SettlementOutcome::AlreadySettled(receipt) => assert_eq!(receipt, first),
            other => panic!("expected AlreadySettled, got {other:?}"),
        }
        assert_eq!(api.get_receipt(order.id()).await.unwrap(), first);
    }
}
