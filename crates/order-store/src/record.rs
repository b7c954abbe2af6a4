use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DepartmentId, OrderId, SubjectId};

/// Version number of a stored order, used for optimistic concurrency control.
///
/// A freshly created order is at version 0 and every accepted write
/// increments it by exactly one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a newly created order (0).
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A stored order.
///
/// The store only understands the indexed columns; `document` is the full
/// serialized order and is never interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: OrderId,

    /// Version of the order after the write that produced this record.
    pub version: Version,

    /// Canonical status name, e.g. `"ready_for_pickup"`.
    pub status: String,

    pub subject_id: SubjectId,
    pub origin_department_id: DepartmentId,
    pub fulfilling_department_id: DepartmentId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// The serialized order.
    pub document: serde_json::Value,
}

/// A stored receipt. At most one exists per order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    /// Globally unique, human-referenceable number.
    pub receipt_number: String,
    pub order_id: OrderId,
    pub issued_at: DateTime<Utc>,

    /// The serialized receipt.
    pub document: serde_json::Value,
}
