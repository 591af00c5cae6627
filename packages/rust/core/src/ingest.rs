//! Single-event ingestion, for callers that learn about one edit at a time
//! (webhooks, manual replays) instead of polling an event source.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use revindex_shared::{IndexerError, Result, RevisionEvent};

use crate::pipeline::{ItemOutcome, Orchestrator};

/// One edit as reported by an external caller.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub content_id: String,
    pub block: u64,
    pub timestamp: DateTime<Utc>,
    pub transaction_hash: String,
    pub author: String,
}

impl IngestRequest {
    /// Check the content id shape and build the event.
    pub fn into_event(self, content_id_len: usize) -> Result<RevisionEvent> {
        if self.content_id.len() != content_id_len {
            return Err(IndexerError::parse(format!(
                "content id '{}' must be {content_id_len} characters",
                self.content_id
            )));
        }
        Ok(RevisionEvent {
            content_id: self.content_id,
            source_block: self.block,
            source_timestamp: self.timestamp,
            transaction_hash: self.transaction_hash,
            author_address: self.author.to_lowercase(),
        })
    }
}

/// Run one event through the same steps as a polling cycle.
///
/// A rejected payload is returned as [`IndexerError::Rejected`] so the caller
/// can report the rule that failed; an already indexed content id is
/// [`ItemOutcome::Skipped`].
#[instrument(skip_all, fields(content_id = %event.content_id))]
pub async fn ingest_event(orchestrator: &Orchestrator, event: RevisionEvent) -> Result<ItemOutcome> {
    match orchestrator.process_event(&event).await? {
        ItemOutcome::Rejected(code) => Err(IndexerError::Rejected { code }),
        outcome => {
            info!(?outcome, "event ingested");
            Ok(outcome)
        }
    }
}
