//! Fulfillment order events.
//!
//! Command methods on [`FulfillmentOrder`](super::FulfillmentOrder) decide an
//! event; `apply` folds it into state. Events are never persisted on their
//! own: the folded order document is what gets stored.

use chrono::{DateTime, Utc};
use common::{DepartmentId, OrderId, ProviderId, SubjectId};
use serde::{Deserialize, Serialize};

use crate::coverage::InsuranceCoverage;
use crate::receipt::Receipt;

use super::{OrderItem, OrderKind, OrderStatus};

/// Events that can occur on a fulfillment order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was written by the originating department.
    OrderCreated(OrderCreatedData),

    /// Order was handed to the fulfilling department.
    SentToFulfiller(TransitionData),

    /// The fulfiller acknowledged the order.
    ReceivedByFulfiller(TransitionData),

    /// Coverage was computed and attached.
    CoverageVerified(CoverageVerifiedData),

    /// Dispensing or collection started.
    ProcessingStarted(TransitionData),

    /// Order is waiting for pickup.
    ReadyForPickup(TransitionData),

    /// Payment was taken and a receipt issued.
    OrderSettled(OrderSettledData),

    /// Order was cancelled.
    OrderCancelled(OrderCancelledData),

    /// The item was amended. Status is unchanged.
    OrderAmended(OrderAmendedData),
}

impl OrderEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "OrderCreated",
            OrderEvent::SentToFulfiller(_) => "SentToFulfiller",
            OrderEvent::ReceivedByFulfiller(_) => "ReceivedByFulfiller",
            OrderEvent::CoverageVerified(_) => "CoverageVerified",
            OrderEvent::ProcessingStarted(_) => "ProcessingStarted",
            OrderEvent::ReadyForPickup(_) => "ReadyForPickup",
            OrderEvent::OrderSettled(_) => "OrderSettled",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::OrderAmended(_) => "OrderAmended",
        }
    }

    /// Returns the status the order holds after this event.
    ///
    /// `None` for events that do not change status.
    pub fn resulting_status(&self) -> Option<OrderStatus> {
        match self {
            OrderEvent::OrderCreated(_) => Some(OrderStatus::Created),
            OrderEvent::SentToFulfiller(_) => Some(OrderStatus::SentToFulfiller),
            OrderEvent::ReceivedByFulfiller(_) => Some(OrderStatus::Received),
            OrderEvent::CoverageVerified(_) => Some(OrderStatus::CoverageVerified),
            OrderEvent::ProcessingStarted(_) => Some(OrderStatus::InProcessing),
            OrderEvent::ReadyForPickup(_) => Some(OrderStatus::ReadyForPickup),
            OrderEvent::OrderSettled(_) => Some(OrderStatus::Settled),
            OrderEvent::OrderCancelled(_) => Some(OrderStatus::Cancelled),
            OrderEvent::OrderAmended(_) => None,
        }
    }

    /// Returns who caused the event.
    pub fn actor(&self) -> &str {
        match self {
            OrderEvent::OrderCreated(data) => &data.created_by,
            OrderEvent::SentToFulfiller(data)
            | OrderEvent::ReceivedByFulfiller(data)
            | OrderEvent::ProcessingStarted(data)
            | OrderEvent::ReadyForPickup(data) => &data.actor,
            OrderEvent::CoverageVerified(data) => &data.verified_by,
            OrderEvent::OrderSettled(data) => &data.receipt.issued_by,
            OrderEvent::OrderCancelled(data) => &data.cancelled_by,
            OrderEvent::OrderAmended(data) => &data.amended_by,
        }
    }

    /// Returns when the event happened.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(data) => data.created_at,
            OrderEvent::SentToFulfiller(data)
            | OrderEvent::ReceivedByFulfiller(data)
            | OrderEvent::ProcessingStarted(data)
            | OrderEvent::ReadyForPickup(data) => data.occurred_at,
            OrderEvent::CoverageVerified(data) => data.verified_at,
            OrderEvent::OrderSettled(data) => data.receipt.issued_at,
            OrderEvent::OrderCancelled(data) => data.cancelled_at,
            OrderEvent::OrderAmended(data) => data.amended_at,
        }
    }
}

/// Data for OrderCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub order_id: OrderId,
    pub kind: OrderKind,
    pub subject_id: SubjectId,
    pub provider_id: ProviderId,
    pub origin_department_id: DepartmentId,
    pub fulfilling_department_id: DepartmentId,
    pub item: OrderItem,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Data shared by the payload-free status changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionData {
    /// Staff member or system that made the change.
    pub actor: String,

    pub occurred_at: DateTime<Utc>,
}

/// Data for CoverageVerified event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageVerifiedData {
    /// The computed split. Stored as a snapshot and never recomputed.
    pub coverage: InsuranceCoverage,
    pub verified_by: String,
    pub verified_at: DateTime<Utc>,
}

/// Data for OrderSettled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSettledData {
    pub receipt: Receipt,
}

/// Data for OrderCancelled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub reason: String,
    pub cancelled_by: String,
    pub cancelled_at: DateTime<Utc>,
}

/// Data for OrderAmended event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAmendedData {
    /// Item before the amendment.
    pub previous: OrderItem,

    /// Item after the amendment.
    pub item: OrderItem,
    pub amended_by: String,
    pub amended_at: DateTime<Utc>,
}
