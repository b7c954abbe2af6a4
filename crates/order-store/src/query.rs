use chrono::{DateTime, Utc};

use crate::{DepartmentId, OrderRecord, SubjectId};

/// Builder for worklist queries over stored orders.
///
/// Results are ordered by `updated_at`, then by order id.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Filter by status names (any of these).
    pub statuses: Option<Vec<String>>,

    /// Filter by the department executing the order.
    pub fulfilling_department_id: Option<DepartmentId>,

    /// Filter by the department that raised the order.
    pub origin_department_id: Option<DepartmentId>,

    /// Filter by subject.
    pub subject_id: Option<SubjectId>,

    /// Filter to orders updated at or after this timestamp.
    pub updated_from: Option<DateTime<Utc>>,

    /// Filter to orders updated at or before this timestamp.
    pub updated_to: Option<DateTime<Utc>>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderQuery {
    /// Creates a new empty query matching every order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for a fulfilling department's worklist.
    pub fn for_fulfiller(department: impl Into<DepartmentId>) -> Self {
        Self {
            fulfilling_department_id: Some(department.into()),
            ..Default::default()
        }
    }

    /// Filters by a single status.
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.statuses = Some(vec![status.into()]);
        self
    }

    /// Filters by several statuses (any of these).
    pub fn statuses(mut self, statuses: Vec<String>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    /// Filters by fulfilling department.
    pub fn fulfilling_department(mut self, department: impl Into<DepartmentId>) -> Self {
        self.fulfilling_department_id = Some(department.into());
        self
    }

    /// Filters by originating department.
    pub fn origin_department(mut self, department: impl Into<DepartmentId>) -> Self {
        self.origin_department_id = Some(department.into());
        self
    }

    /// Filters by subject.
    pub fn subject(mut self, subject_id: SubjectId) -> Self {
        self.subject_id = Some(subject_id);
        self
    }

    /// Filters to orders updated at or after this timestamp.
    pub fn updated_from(mut self, timestamp: DateTime<Utc>) -> Self {
        self.updated_from = Some(timestamp);
        self
    }

    /// Filters to orders updated at or before this timestamp.
    pub fn updated_to(mut self, timestamp: DateTime<Utc>) -> Self {
        self.updated_to = Some(timestamp);
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the record passes every filter. Paging is not applied.
    pub fn matches(&self, record: &OrderRecord) -> bool {
        if let Some(ref statuses) = self.statuses
            && !statuses.contains(&record.status)
        {
            return false;
        }
        if let Some(ref department) = self.fulfilling_department_id
            && &record.fulfilling_department_id != department
        {
            return false;
        }
        if let Some(ref department) = self.origin_department_id
            && &record.origin_department_id != department
        {
            return false;
        }
        if let Some(subject_id) = self.subject_id
            && record.subject_id != subject_id
        {
            return false;
        }
        if let Some(from) = self.updated_from
            && record.updated_at < from
        {
            return false;
        }
        if let Some(to) = self.updated_to
            && record.updated_at > to
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OrderId, Version};

    fn record(status: &str, fulfiller: &str) -> OrderRecord {
        let now = Utc::now();
        OrderRecord {
            order_id: OrderId::new(),
            version: Version::initial(),
            status: status.to_string(),
            subject_id: SubjectId::new(),
            origin_department_id: DepartmentId::new("cardiology"),
            fulfilling_department_id: DepartmentId::new(fulfiller),
            created_at: now,
            updated_at: now,
            document: serde_json::json!({}),
        }
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(OrderQuery::new().matches(&record("created", "pharmacy")));
    }

    #[test]
    fn fulfiller_worklist_filters_department_and_status() {
        let query = OrderQuery::for_fulfiller("pharmacy").status("received");

        assert!(query.matches(&record("received", "pharmacy")));
        assert!(!query.matches(&record("received", "lab")));
        assert!(!query.matches(&record("created", "pharmacy")));
    }

    #[test]
    fn subject_and_time_filters() {
        let r = record("created", "lab");
        assert!(OrderQuery::new().subject(r.subject_id).matches(&r));
        assert!(!OrderQuery::new().subject(SubjectId::new()).matches(&r));

        let later = r.updated_at + chrono::Duration::seconds(5);
        assert!(!OrderQuery::new().updated_from(later).matches(&r));
        assert!(OrderQuery::new().updated_to(later).matches(&r));
    }
}
