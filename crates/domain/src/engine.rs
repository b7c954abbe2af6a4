//! Workflow engine: validates commands against the stored order and writes
//! the result back with a compare-and-swap.

use chrono::Utc;
use common::OrderId;
use order_store::{OrderQuery, OrderStore, Version};

use crate::coverage::{CoverageTerms, Percentage};
use crate::error::DomainError;
use crate::order::{
    AdvanceOrder, AmendOrder, CancelOrder, CreateOrder, FulfillmentOrder, OrderError, OrderEvent,
    VerifyCoverage,
};
use crate::repository::OrderRepository;

/// Default insurer share when a coverage request carries no terms.
pub const DEFAULT_COVERAGE_PERCENT: f64 = 80.0;

/// Engine policy settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Terms applied by `verify_coverage` when the caller supplies none.
    pub default_coverage: CoverageTerms,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            default_coverage: CoverageTerms::Percentage(Percentage::clamped(8_000)),
        }
    }
}

impl WorkflowConfig {
    pub fn with_default_coverage(mut self, terms: CoverageTerms) -> Self {
        self.default_coverage = terms;
        self
    }
}

/// Result of command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// The order after the command was applied and stored.
    pub order: FulfillmentOrder,

    /// The event that was applied.
    pub event: OrderEvent,

    /// The version the order is stored at now.
    pub new_version: Version,
}

/// Owns the order state machine.
///
/// Every mutation follows the same order of checks: the order exists, the
/// caller's version is current, the business rules accept the command, and
/// finally the write wins its compare-and-swap. Conflicts are never retried
/// here; the caller re-reads and decides.
#[derive(Clone)]
pub struct WorkflowEngine<S: OrderStore> {
    repository: OrderRepository<S>,
    config: WorkflowConfig,
}

impl<S: OrderStore> WorkflowEngine<S> {
    pub fn new(store: S, config: WorkflowConfig) -> Self {
        Self {
            repository: OrderRepository::new(store),
            config,
        }
    }

    /// Creates a new order at version 0.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<CommandResult, DomainError> {
        let (order, event) = FulfillmentOrder::create(cmd, Utc::now())?;
        self.repository.insert(&order).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            fulfilling_department = %order.fulfilling_department_id(),
            "order created"
        );

        Ok(CommandResult {
            new_version: order.version(),
            order,
            event,
        })
    }

    /// Loads an order.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<FulfillmentOrder, DomainError> {
        self.repository.load(order_id).await
    }

    /// Returns the orders matching a worklist query.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(
        &self,
        query: OrderQuery,
    ) -> Result<Vec<FulfillmentOrder>, DomainError> {
        self.repository.list(query).await
    }

    /// Moves an order to a payload-free status.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, target = %cmd.target))]
    pub async fn advance(&self, cmd: AdvanceOrder) -> Result<CommandResult, DomainError> {
        let target = cmd.target;
        let actor = cmd.actor;
        self.execute(cmd.order_id, cmd.expected_version, |order| {
            order.advance_to(target, &actor, Utc::now())
        })
        .await
    }

    /// Computes coverage and moves the order to `coverage_verified`.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn verify_coverage(&self, cmd: VerifyCoverage) -> Result<CommandResult, DomainError> {
        let terms = cmd.terms.unwrap_or(self.config.default_coverage);
        let total_cost = cmd.total_cost;
        let actor = cmd.actor;
        self.execute(cmd.order_id, cmd.expected_version, |order| {
            order.verify_coverage(total_cost, &terms, &actor, Utc::now())
        })
        .await
    }

    /// Amends the item of an order that has not been priced yet.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn amend(&self, cmd: AmendOrder) -> Result<CommandResult, DomainError> {
        let changes = cmd.changes;
        let actor = cmd.actor;
        self.execute(cmd.order_id, cmd.expected_version, |order| {
            order.amend(&changes, &actor, Utc::now())
        })
        .await
    }

    /// Cancels an order.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn cancel(&self, cmd: CancelOrder) -> Result<CommandResult, DomainError> {
        let reason = cmd.reason;
        let actor = cmd.actor;
        self.execute(cmd.order_id, cmd.expected_version, |order| {
            order.cancel(&reason, &actor, Utc::now())
        })
        .await
    }

    /// Loads the order, checks the caller's version, runs the command and
    /// swaps the result in.
    async fn execute<F>(
        &self,
        order_id: OrderId,
        expected: Version,
        command_fn: F,
    ) -> Result<CommandResult, DomainError>
    where
        F: FnOnce(&FulfillmentOrder) -> Result<OrderEvent, OrderError>,
    {
        let mut order = self.repository.load(order_id).await?;
        ensure_version(&order, expected)?;

        let event = command_fn(&order)?;
        order.apply(event.clone());

        if let Err(err) = self.repository.save(expected, &mut order).await {
            if matches!(err, DomainError::ConcurrentModification { .. }) {
                metrics::counter!("order_conflicts_total").increment(1);
                tracing::warn!(%order_id, %expected, "lost compare-and-swap race");
            }
            return Err(err);
        }

        metrics::counter!("order_transitions_total", "to" => order.status().as_str())
            .increment(1);
        tracing::info!(
            event_type = event.event_type(),
            status = %order.status(),
            version = %order.version(),
            "order updated"
        );

        Ok(CommandResult {
            new_version: order.version(),
            order,
            event,
        })
    }
}

/// Fails with `ConcurrentModification` if `order` is not at `expected`.
pub fn ensure_version(order: &FulfillmentOrder, expected: Version) -> Result<(), DomainError> {
    if order.version() == expected {
        return Ok(());
    }
    metrics::counter!("order_conflicts_total").increment(1);
    Err(DomainError::ConcurrentModification {
        order_id: order.id(),
        expected,
        actual: order.version(),
    })
}
