//! Order workflow state machine.

use serde::{Deserialize, Serialize};

/// The status of a fulfillment order in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──► SentToFulfiller ──► Received ──► CoverageVerified ──► InProcessing ──► ReadyForPickup ──► Settled
///    │               │               │                │                  │                 │
///    └───────────────┴───────────────┴────────────────┴──────────────────┴─────────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order was written by the originating department.
    #[default]
    Created,

    /// Order was handed to the fulfilling department.
    SentToFulfiller,

    /// The fulfiller acknowledged the order.
    Received,

    /// Insurer/patient split has been computed and attached.
    CoverageVerified,

    /// The fulfiller is dispensing or collecting.
    InProcessing,

    /// Waiting for the patient to pay and pick up.
    ReadyForPickup,

    /// Payment taken and receipt issued (terminal state).
    Settled,

    /// Order was cancelled (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Every status, in workflow order.
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Created,
        OrderStatus::SentToFulfiller,
        OrderStatus::Received,
        OrderStatus::CoverageVerified,
        OrderStatus::InProcessing,
        OrderStatus::ReadyForPickup,
        OrderStatus::Settled,
        OrderStatus::Cancelled,
    ];

    /// Returns true if the transition table permits `self -> target`.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;

        match (self, target) {
            (Created, SentToFulfiller)
            | (SentToFulfiller, Received)
            | (Received, CoverageVerified)
            | (CoverageVerified, InProcessing)
            | (InProcessing, ReadyForPickup)
            | (ReadyForPickup, Settled) => true,
            (current, Cancelled) => !current.is_terminal(),
            _ => false,
        }
    }

    /// Returns the status reached by the next forward step, if any.
    pub fn next(&self) -> Option<OrderStatus> {
        use OrderStatus::*;

        match self {
            Created => Some(SentToFulfiller),
            SentToFulfiller => Some(Received),
            Received => Some(CoverageVerified),
            CoverageVerified => Some(InProcessing),
            InProcessing => Some(ReadyForPickup),
            ReadyForPickup => Some(Settled),
            Settled | Cancelled => None,
        }
    }

    /// Returns true if entering this status needs more than a status change
    /// (coverage terms, a payment, or a cancellation reason).
    pub fn requires_payload(&self) -> bool {
        matches!(
            self,
            OrderStatus::CoverageVerified | OrderStatus::Settled | OrderStatus::Cancelled
        )
    }

    /// Returns true if the item may still be amended in this status.
    pub fn can_amend(&self) -> bool {
        matches!(
            self,
            OrderStatus::Created | OrderStatus::SentToFulfiller | OrderStatus::Received
        )
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Settled | OrderStatus::Cancelled)
    }

    /// Returns the canonical status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::SentToFulfiller => "sent_to_fulfiller",
            OrderStatus::Received => "received",
            OrderStatus::CoverageVerified => "coverage_verified",
            OrderStatus::InProcessing => "in_processing",
            OrderStatus::ReadyForPickup => "ready_for_pickup",
            OrderStatus::Settled => "settled",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a string is not a canonical status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}
