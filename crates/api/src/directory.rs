//! Read-only subject/provider name lookup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ProviderId, SubjectId};
use tokio::sync::RwLock;

/// Display names for the people an order refers to.
///
/// Lookups never fail an order operation: an unknown id simply has no name.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn subject_name(&self, subject_id: SubjectId) -> Option<String>;
    async fn provider_name(&self, provider_id: ProviderId) -> Option<String>;
}

#[derive(Debug, Default)]
struct Entries {
    subjects: HashMap<SubjectId, String>,
    providers: HashMap<ProviderId, String>,
}

/// In-memory directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    entries: Arc<RwLock<Entries>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_subject(&self, subject_id: SubjectId, name: impl Into<String>) {
        self.entries
            .write()
            .await
            .subjects
            .insert(subject_id, name.into());
    }

    pub async fn register_provider(&self, provider_id: ProviderId, name: impl Into<String>) {
        self.entries
            .write()
            .await
            .providers
            .insert(provider_id, name.into());
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn subject_name(&self, subject_id: SubjectId) -> Option<String> {
        self.entries.read().await.subjects.get(&subject_id).cloned()
    }

    async fn provider_name(&self, provider_id: ProviderId) -> Option<String> {
        self.entries
            .read()
            .await
            .providers
            .get(&provider_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registered_names_are_returned() {
        let directory = InMemoryDirectory::new();
        let subject = SubjectId::new();
        let provider = ProviderId::new();
        directory.register_subject(subject, "Jane Doe").await;
        directory.register_provider(provider, "Dr. Smith").await;

        assert_eq!(directory.subject_name(subject).await.as_deref(), Some("Jane Doe"));
        assert_eq!(directory.provider_name(provider).await.as_deref(), Some("Dr. Smith"));
        assert_eq!(directory.subject_name(SubjectId::new()).await, None);
    }
}
