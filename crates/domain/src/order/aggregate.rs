//! Fulfillment order aggregate.

use chrono::{DateTime, Utc};
use common::{DepartmentId, OrderId, ProviderId, SubjectId};
use order_store::Version;
use serde::{Deserialize, Serialize};

use crate::coverage::{CoverageTerms, InsuranceCoverage, calculate_coverage};
use crate::receipt::{PaymentMethod, Receipt};

use super::{
    CreateOrder, ItemChanges, Money, OrderError, OrderEvent, OrderItem, OrderKind, OrderStatus,
    events::{
        CoverageVerifiedData, OrderAmendedData, OrderCancelledData, OrderCreatedData,
        OrderSettledData, TransitionData,
    },
};

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Status held after the change.
    pub status: OrderStatus,
    pub actor: String,
    pub at: DateTime<Utc>,

    /// Free text for changes that are not plain progressions
    /// (cancellation reason, `"amended"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A dispensable clinical order.
///
/// Command methods take `&self`, validate, and return the event they would
/// produce; [`FulfillmentOrder::apply`] folds an event into state. Persisting
/// the result is the caller's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentOrder {
    id: OrderId,

    /// Version of the stored copy this order was read from.
    #[serde(default)]
    version: Version,

    kind: OrderKind,
    subject_id: SubjectId,
    provider_id: ProviderId,
    origin_department_id: DepartmentId,
    fulfilling_department_id: DepartmentId,
    item: OrderItem,
    status: OrderStatus,
    coverage: Option<InsuranceCoverage>,
    settlement: Option<Receipt>,
    cancellation_reason: Option<String>,
    history: Vec<HistoryEntry>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

// Query methods
impl FulfillmentOrder {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn kind(&self) -> OrderKind {
        self.kind
    }

    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    pub fn provider_id(&self) -> ProviderId {
        self.provider_id
    }

    pub fn origin_department_id(&self) -> &DepartmentId {
        &self.origin_department_id
    }

    pub fn fulfilling_department_id(&self) -> &DepartmentId {
        &self.fulfilling_department_id
    }

    pub fn item(&self) -> &OrderItem {
        &self.item
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn coverage(&self) -> Option<&InsuranceCoverage> {
        self.coverage.as_ref()
    }

    pub fn settlement(&self) -> Option<&Receipt> {
        self.settlement.as_ref()
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    /// Append-only audit trail, oldest first.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns the priced total if coverage is set, otherwise quantity × unit cost.
    pub fn total_cost(&self) -> Money {
        match &self.coverage {
            Some(coverage) => coverage.total_cost(),
            // Creation and amendment reject items whose total overflows.
            None => self.item.total_cost().unwrap_or_default(),
        }
    }

    /// Returns what the patient owes at pickup: the patient share when
    /// coverage was verified, the full total for self-pay.
    pub fn amount_due(&self) -> Money {
        match &self.coverage {
            Some(coverage) => coverage.patient_amount(),
            None => self.total_cost(),
        }
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

// Command methods
impl FulfillmentOrder {
    /// Validates a creation command and returns the new order with its
    /// creation event already applied.
    pub fn create(
        cmd: CreateOrder,
        now: DateTime<Utc>,
    ) -> Result<(FulfillmentOrder, OrderEvent), OrderError> {
        validate_actor(&cmd.created_by)?;
        validate_item(&cmd.item)?;
        if cmd.origin_department_id.is_blank() {
            return Err(OrderError::InvalidInput(
                "origin department is required".to_string(),
            ));
        }
        if cmd.fulfilling_department_id.is_blank() {
            return Err(OrderError::InvalidInput(
                "fulfilling department is required".to_string(),
            ));
        }

        let data = OrderCreatedData {
            order_id: cmd.order_id,
            kind: cmd.kind,
            subject_id: cmd.subject_id,
            provider_id: cmd.provider_id,
            origin_department_id: cmd.origin_department_id,
            fulfilling_department_id: cmd.fulfilling_department_id,
            item: cmd.item,
            created_by: cmd.created_by,
            created_at: now,
        };

        let mut order = FulfillmentOrder {
            id: data.order_id,
            version: Version::initial(),
            kind: data.kind,
            subject_id: data.subject_id,
            provider_id: data.provider_id,
            origin_department_id: data.origin_department_id.clone(),
            fulfilling_department_id: data.fulfilling_department_id.clone(),
            item: data.item.clone(),
            status: OrderStatus::Created,
            coverage: None,
            settlement: None,
            cancellation_reason: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let event = OrderEvent::OrderCreated(data);
        order.apply(event.clone());
        Ok((order, event))
    }

    /// Moves the order to a status that needs no payload.
    pub fn advance_to(
        &self,
        target: OrderStatus,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<OrderEvent, OrderError> {
        self.ensure_transition(target)?;
        if target.requires_payload() {
            let operation = match target {
                OrderStatus::CoverageVerified => "verify_coverage",
                OrderStatus::Settled => "settle",
                _ => "cancel",
            };
            return Err(OrderError::PayloadRequired { target, operation });
        }
        validate_actor(actor)?;

        let data = TransitionData {
            actor: actor.to_string(),
            occurred_at: now,
        };

        match target {
            OrderStatus::SentToFulfiller => Ok(OrderEvent::SentToFulfiller(data)),
            OrderStatus::Received => Ok(OrderEvent::ReceivedByFulfiller(data)),
            OrderStatus::InProcessing => Ok(OrderEvent::ProcessingStarted(data)),
            OrderStatus::ReadyForPickup => Ok(OrderEvent::ReadyForPickup(data)),
            _ => Err(OrderError::InvalidTransition {
                current: self.status,
                requested: target,
            }),
        }
    }

    /// Computes coverage for `total_cost` (or the item total) under `terms`.
    pub fn verify_coverage(
        &self,
        total_cost: Option<Money>,
        terms: &CoverageTerms,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<OrderEvent, OrderError> {
        self.ensure_transition(OrderStatus::CoverageVerified)?;
        validate_actor(actor)?;

        let total_cost = match total_cost {
            Some(total) => total,
            None => self.item.total_cost().ok_or_else(|| {
                OrderError::InvalidInput("item total cost overflows".to_string())
            })?,
        };
        let coverage = calculate_coverage(total_cost, terms)?;

        Ok(OrderEvent::CoverageVerified(CoverageVerifiedData {
            coverage,
            verified_by: actor.to_string(),
            verified_at: now,
        }))
    }

    /// Checks that the order can be settled with this payment and returns
    /// the amount due.
    pub fn check_settleable(
        &self,
        amount_tendered: Money,
        payment_method: PaymentMethod,
    ) -> Result<Money, OrderError> {
        if let Some(receipt) = &self.settlement {
            return Err(OrderError::AlreadySettled {
                receipt_number: receipt.receipt_number.clone(),
            });
        }
        self.ensure_transition(OrderStatus::Settled)?;

        if amount_tendered.is_negative() {
            return Err(OrderError::InvalidInput(format!(
                "amount tendered must not be negative, got {amount_tendered}"
            )));
        }

        let amount_due = self.amount_due();
        if payment_method.requires_upfront_payment() && amount_tendered < amount_due {
            return Err(OrderError::InsufficientPayment {
                amount_due,
                amount_tendered,
            });
        }
        Ok(amount_due)
    }

    /// Settles the order with an already-issued receipt.
    pub fn settle(&self, receipt: Receipt) -> Result<OrderEvent, OrderError> {
        let amount_due = self.check_settleable(receipt.amount_tendered, receipt.payment_method)?;
        validate_actor(&receipt.issued_by)?;

        if receipt.order_id != self.id {
            return Err(OrderError::InvalidInput(format!(
                "receipt {} belongs to order {}",
                receipt.receipt_number, receipt.order_id
            )));
        }
        if receipt.amount_due != amount_due {
            return Err(OrderError::InvalidInput(format!(
                "receipt amount due {} does not match {amount_due}",
                receipt.amount_due
            )));
        }
        if receipt.receipt_number.trim().is_empty() {
            return Err(OrderError::InvalidInput(
                "receipt number is required".to_string(),
            ));
        }

        Ok(OrderEvent::OrderSettled(OrderSettledData { receipt }))
    }

    /// Cancels the order.
    pub fn cancel(
        &self,
        reason: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<OrderEvent, OrderError> {
        if !self.status.can_cancel() {
            return Err(OrderError::AlreadyTerminal {
                status: self.status,
            });
        }
        validate_actor(actor)?;
        if reason.trim().is_empty() {
            return Err(OrderError::InvalidInput(
                "cancellation reason is required".to_string(),
            ));
        }

        Ok(OrderEvent::OrderCancelled(OrderCancelledData {
            reason: reason.to_string(),
            cancelled_by: actor.to_string(),
            cancelled_at: now,
        }))
    }

    /// Amends the item. Only allowed before coverage is verified.
    pub fn amend(
        &self,
        changes: &ItemChanges,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<OrderEvent, OrderError> {
        if !self.status.can_amend() {
            return Err(OrderError::InvalidStateForAction {
                current: self.status,
                action: "amend",
            });
        }
        validate_actor(actor)?;
        if changes.is_empty() {
            return Err(OrderError::InvalidInput(
                "amendment changes nothing".to_string(),
            ));
        }

        let item = changes.apply_to(&self.item);
        validate_item(&item)?;

        Ok(OrderEvent::OrderAmended(OrderAmendedData {
            previous: self.item.clone(),
            item,
            amended_by: actor.to_string(),
            amended_at: now,
        }))
    }

    fn ensure_transition(&self, target: OrderStatus) -> Result<(), OrderError> {
        if self.status.can_transition_to(target) {
            Ok(())
        } else {
            Err(OrderError::InvalidTransition {
                current: self.status,
                requested: target,
            })
        }
    }
}

// Apply
impl FulfillmentOrder {
    /// Folds an event into state and appends the matching history entry.
    pub fn apply(&mut self, event: OrderEvent) {
        let actor = event.actor().to_string();
        let at = event.occurred_at();
        let mut note = None;

        if let Some(status) = event.resulting_status() {
            self.status = status;
        }

        match event {
            OrderEvent::CoverageVerified(data) => {
                self.coverage = Some(data.coverage);
            }
            OrderEvent::OrderSettled(data) => {
                note = Some(data.receipt.receipt_number.clone());
                self.settlement = Some(data.receipt);
            }
            OrderEvent::OrderCancelled(data) => {
                note = Some(data.reason.clone());
                self.cancellation_reason = Some(data.reason);
            }
            OrderEvent::OrderAmended(data) => {
                self.item = data.item;
                note = Some("amended".to_string());
            }
            OrderEvent::OrderCreated(_)
            | OrderEvent::SentToFulfiller(_)
            | OrderEvent::ReceivedByFulfiller(_)
            | OrderEvent::ProcessingStarted(_)
            | OrderEvent::ReadyForPickup(_) => {}
        }

        self.updated_at = at;
        self.history.push(HistoryEntry {
            status: self.status,
            actor,
            at,
            note,
        });
    }
}

fn validate_actor(actor: &str) -> Result<(), OrderError> {
    if actor.trim().is_empty() {
        return Err(OrderError::InvalidInput("actor is required".to_string()));
    }
    Ok(())
}

fn validate_item(item: &OrderItem) -> Result<(), OrderError> {
    if item.description.trim().is_empty() {
        return Err(OrderError::InvalidInput(
            "item description is required".to_string(),
        ));
    }
    if item.quantity == 0 {
        return Err(OrderError::InvalidInput(
            "quantity must be greater than 0".to_string(),
        ));
    }
    if item.unit_cost.is_negative() {
        return Err(OrderError::InvalidInput(format!(
            "unit cost must not be negative, got {}",
            item.unit_cost
        )));
    }
    if item.total_cost().is_none() {
        return Err(OrderError::InvalidInput(
            "quantity × unit cost overflows".to_string(),
        ));
    }
    Ok(())
}
