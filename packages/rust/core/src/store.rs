use tracing::instrument;

use revindex_shared::{
    DocumentPayload, PersistedRevision, Result, RevisionEvent, TimestampSource,
};
use revindex_storage::{Storage, UpsertOutcome};

use crate::revalidate::Revalidator;

/// Persistence plus the post-write revalidation hook.
pub struct RevisionStore {
    storage: Storage,
    revalidator: Box<dyn Revalidator>,
    timestamps: TimestampSource,
}

impl RevisionStore {
    pub fn new(
        storage: Storage,
        revalidator: Box<dyn Revalidator>,
        timestamps: TimestampSource,
    ) -> Self {
        Self {
            storage,
            revalidator,
            timestamps,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub async fn is_already_indexed(&self, content_id: &str) -> Result<bool> {
        self.storage.is_already_indexed(content_id).await
    }

    /// The stored revision an incoming payload will replace, if any.
    pub async fn previous(&self, revision_id: &str) -> Result<Option<PersistedRevision>> {
        self.storage.get_revision(revision_id).await
    }

    pub async fn latest_update(&self) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        self.storage.latest_update().await
    }

    /// Upsert, then revalidate the written revision. A revalidation failure
    /// is returned after the write has committed.
    #[instrument(skip_all, fields(id = %payload.id))]
    pub async fn upsert(
        &self,
        payload: &DocumentPayload,
        event: &RevisionEvent,
    ) -> Result<UpsertOutcome> {
        let outcome = self
            .storage
            .upsert_revision(payload, event, self.timestamps)
            .await?;

        if let Some(revision) = outcome.revision() {
            self.revalidator.revalidate(revision).await?;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use revindex_shared::AuditKind;

    use crate::pipeline::tests::{StubRevalidator, event, payload_json, temp_storage};

    fn payload(id: &str) -> DocumentPayload {
        serde_json::from_value(payload_json(id, 200)).unwrap()
    }

    #[tokio::test]
    async fn revalidation_error_surfaces_after_commit() {
        let mut revalidator = StubRevalidator::new();
        revalidator.fail_first = 1;
        let store = RevisionStore::new(
            temp_storage().await,
            Box::new(revalidator),
            TimestampSource::Store,
        );

        let err = store
            .upsert(&payload("bitcoin"), &event("QmA", 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "side_effect");

        assert!(store.is_already_indexed("QmA").await.unwrap());
        let revision = store.previous("bitcoin").await.unwrap().unwrap();
        assert_eq!(revision.content_id, "QmA");
        let audit = store.storage().audit_records("bitcoin").await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].kind, AuditKind::Created);
    }

    #[tokio::test]
    async fn already_indexed_write_is_not_revalidated() {
        let revalidator = StubRevalidator::new();
        let calls = revalidator.calls.clone();
        let store = RevisionStore::new(
            temp_storage().await,
            Box::new(revalidator),
            TimestampSource::Store,
        );

        let first = store.upsert(&payload("bitcoin"), &event("QmA", 1)).await.unwrap();
        assert!(matches!(first, UpsertOutcome::Created(_)));

        let second = store.upsert(&payload("bitcoin"), &event("QmA", 1)).await.unwrap();
        assert_eq!(second, UpsertOutcome::AlreadyIndexed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
