//! Event sources that turn on-chain edit activity into [`RevisionEvent`]s.
//!
//! This crate provides:
//! - [`EventSource`]: the common capability both strategies implement
//! - [`IndexedQuerySource`]: one GraphQL query against an indexing service
//! - [`ChainScanSource`]: direct `eth_getLogs` scanning with batched fan-out
//! - [`BlockLookup`]: timestamp to block height resolution
//!
//! Sources return deduplicated events in no particular order.

pub mod abi;
pub mod blocks;
pub mod indexed;
pub mod rpc;
pub mod scan;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use revindex_shared::{IndexerConfig, IndexerError, Result, RevisionEvent, SourceStrategy};

pub use blocks::BlockLookup;
pub use indexed::IndexedQuerySource;
pub use rpc::RpcClient;
pub use scan::ChainScanSource;

/// User-Agent string for outbound requests.
pub(crate) const USER_AGENT: &str = concat!("revindex/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A source of revision events.
///
/// Callers must not rely on chronological order of the returned events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Return every edit event recorded at or after `watermark`.
    async fn fetch_events_since(&self, watermark: DateTime<Utc>) -> Result<Vec<RevisionEvent>>;

    /// Human-readable source name for tracing.
    fn name(&self) -> &str;
}

/// Build the event source selected in the configuration.
pub fn build_source(config: &IndexerConfig) -> Result<Box<dyn EventSource>> {
    match config.source.strategy {
        SourceStrategy::Indexed => Ok(Box::new(IndexedQuerySource::new(&config.source)?)),
        SourceStrategy::Chain => Ok(Box::new(ChainScanSource::new(&config.source)?)),
    }
}

/// Keep the first event seen for each content id.
pub fn dedupe_by_content_id(events: Vec<RevisionEvent>) -> Vec<RevisionEvent> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|e| seen.insert(e.content_id.clone()))
        .collect()
}

/// Decode failures while talking to a node surface as adapter errors.
pub(crate) fn into_adapter_error(e: IndexerError) -> IndexerError {
    match e {
        IndexerError::Parse { message } => IndexerError::Adapter(message),
        other => other,
    }
}

pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| IndexerError::Adapter(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use revindex_shared::AppConfig;

    fn event(content_id: &str, block: u64) -> RevisionEvent {
        RevisionEvent {
            content_id: content_id.into(),
            source_block: block,
            source_timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            transaction_hash: format!("0x{block:064x}"),
            author_address: "0xabc".into(),
        }
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let events = vec![event("QmA", 1), event("QmB", 2), event("QmA", 3)];
        let deduped = dedupe_by_content_id(events);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].source_block, 1);
    }

    #[test]
    fn build_source_rejects_unconfigured_chain() {
        let mut config = IndexerConfig::try_from(&AppConfig::default()).unwrap();
        config.source.strategy = SourceStrategy::Chain;
        let err = build_source(&config).err().expect("missing contract must fail");
        assert!(err.to_string().contains("contract_address"));
    }

    #[test]
    fn build_source_defaults_to_indexed() {
        let config = IndexerConfig::try_from(&AppConfig::default()).unwrap();
        let source = build_source(&config).expect("indexed source");
        assert_eq!(source.name(), "indexed");
    }
}
