//! Order commands.
//!
//! Every command except [`CreateOrder`] carries the version the caller last
//! observed; the engine rejects it if the stored order has moved on.

use common::{DepartmentId, OrderId, ProviderId, SubjectId};
use order_store::Version;

use crate::coverage::CoverageTerms;

use super::{Money, OrderItem, OrderKind, OrderStatus};

/// Command to create a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    /// The order ID to create.
    pub order_id: OrderId,
    pub kind: OrderKind,
    pub subject_id: SubjectId,
    pub provider_id: ProviderId,
    pub origin_department_id: DepartmentId,
    pub fulfilling_department_id: DepartmentId,
    pub item: OrderItem,
    pub created_by: String,
}

impl CreateOrder {
    /// Creates a new CreateOrder command with a generated order ID.
    pub fn new(
        subject_id: SubjectId,
        provider_id: ProviderId,
        origin_department_id: impl Into<DepartmentId>,
        fulfilling_department_id: impl Into<DepartmentId>,
        item: OrderItem,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            order_id: OrderId::new(),
            kind: OrderKind::default(),
            subject_id,
            provider_id,
            origin_department_id: origin_department_id.into(),
            fulfilling_department_id: fulfilling_department_id.into(),
            item,
            created_by: created_by.into(),
        }
    }

    pub fn with_kind(mut self, kind: OrderKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Command to move an order to a payload-free status.
#[derive(Debug, Clone)]
pub struct AdvanceOrder {
    pub order_id: OrderId,
    pub target: OrderStatus,
    pub expected_version: Version,
    pub actor: String,
}

impl AdvanceOrder {
    pub fn new(
        order_id: OrderId,
        target: OrderStatus,
        expected_version: Version,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            target,
            expected_version,
            actor: actor.into(),
        }
    }
}

/// Command to compute and attach coverage.
///
/// Missing fields fall back to `quantity × unit_cost` and the engine's
/// default terms.
#[derive(Debug, Clone)]
pub struct VerifyCoverage {
    pub order_id: OrderId,
    pub expected_version: Version,
    pub total_cost: Option<Money>,
    pub terms: Option<CoverageTerms>,
    pub actor: String,
}

impl VerifyCoverage {
    pub fn new(order_id: OrderId, expected_version: Version, actor: impl Into<String>) -> Self {
        Self {
            order_id,
            expected_version,
            total_cost: None,
            terms: None,
            actor: actor.into(),
        }
    }

    pub fn with_total_cost(mut self, total_cost: Money) -> Self {
        self.total_cost = Some(total_cost);
        self
    }

    pub fn with_terms(mut self, terms: CoverageTerms) -> Self {
        self.terms = Some(terms);
        self
    }
}

/// Changes to the dispensed item. Unset fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemChanges {
    pub description: Option<String>,
    pub quantity: Option<u32>,
    pub unit_cost: Option<Money>,
}

impl ItemChanges {
    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.quantity.is_none() && self.unit_cost.is_none()
    }

    /// Returns `item` with these changes applied.
    pub fn apply_to(&self, item: &OrderItem) -> OrderItem {
        OrderItem {
            description: self
                .description
                .clone()
                .unwrap_or_else(|| item.description.clone()),
            quantity: self.quantity.unwrap_or(item.quantity),
            unit_cost: self.unit_cost.unwrap_or(item.unit_cost),
        }
    }
}

/// Command to amend the item of an order that has not been priced yet.
#[derive(Debug, Clone)]
pub struct AmendOrder {
    pub order_id: OrderId,
    pub expected_version: Version,
    pub changes: ItemChanges,
    pub actor: String,
}

impl AmendOrder {
    pub fn new(
        order_id: OrderId,
        expected_version: Version,
        changes: ItemChanges,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            expected_version,
            changes,
            actor: actor.into(),
        }
    }
}

/// Command to cancel an order.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    /// The order to cancel.
    pub order_id: OrderId,

    pub expected_version: Version,

    /// Reason for cancellation.
    pub reason: String,

    /// Who cancelled the order.
    pub actor: String,
}

impl CancelOrder {
    /// Creates a new CancelOrder command.
    pub fn new(
        order_id: OrderId,
        expected_version: Version,
        reason: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            expected_version,
            reason: reason.into(),
            actor: actor.into(),
        }
    }
}
