//! Indexed-query strategy: one GraphQL query against an indexing service.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use tracing::{debug, info, instrument};

use revindex_shared::{IndexerError, Result, RevisionEvent, SourceConfig};

use crate::{EventSource, dedupe_by_content_id};

/// Timeout for the indexing-service query.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

const EVENTS_QUERY: &str = r#"
query RevisionEvents($since: Int!) {
  ipfshashs(where: { createdAt_gt: $since }, orderBy: createdAt, first: 1000) {
    id
    block
    createdAt
    transactionHash
    userId
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphResponse {
    data: Option<GraphData>,
    #[serde(default)]
    errors: Vec<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphData {
    ipfshashs: Vec<IndexedRecord>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
}

/// One record as served by the indexing service.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexedRecord {
    id: String,
    #[serde(deserialize_with = "flexible_u64")]
    block: u64,
    #[serde(deserialize_with = "flexible_u64")]
    created_at: u64,
    transaction_hash: String,
    user_id: String,
}

/// Indexers serialize big integers as strings; accept both forms.
fn flexible_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(u64),
        Str(String),
    }

    match NumOrStr::deserialize(deserializer)? {
        NumOrStr::Num(n) => Ok(n),
        NumOrStr::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Event source backed by an indexing service.
pub struct IndexedQuerySource {
    client: reqwest::Client,
    endpoint: String,
    content_id_len: usize,
}

impl IndexedQuerySource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            client: crate::http_client(QUERY_TIMEOUT)?,
            endpoint: config.indexer_url.clone(),
            content_id_len: config.content_id_len,
        })
    }

    fn to_event(&self, record: IndexedRecord) -> Option<RevisionEvent> {
        if record.id.len() != self.content_id_len {
            debug!(id = %record.id, "dropping record with unexpected content id length");
            return None;
        }
        let created = i64::try_from(record.created_at).ok()?;
        let source_timestamp = Utc.timestamp_opt(created, 0).single()?;

        Some(RevisionEvent {
            content_id: record.id,
            source_block: record.block,
            source_timestamp,
            transaction_hash: record.transaction_hash,
            author_address: record.user_id.to_lowercase(),
        })
    }
}

#[async_trait]
impl EventSource for IndexedQuerySource {
    #[instrument(skip_all, fields(source = "indexed", watermark = %watermark))]
    async fn fetch_events_since(&self, watermark: DateTime<Utc>) -> Result<Vec<RevisionEvent>> {
        let body = json!({
            "query": EVENTS_QUERY,
            "variables": { "since": watermark.timestamp() },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexerError::Adapter(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexerError::Adapter(format!(
                "{}: HTTP {status}",
                self.endpoint
            )));
        }

        let parsed: GraphResponse = response
            .json()
            .await
            .map_err(|e| IndexerError::Adapter(format!("malformed indexer response: {e}")))?;

        if let Some(first) = parsed.errors.first() {
            return Err(IndexerError::Adapter(format!(
                "indexer query failed: {}",
                first.message
            )));
        }

        let records = parsed
            .data
            .ok_or_else(|| IndexerError::Adapter("indexer response has no data".into()))?
            .ipfshashs;
        let total = records.len();

        let events: Vec<RevisionEvent> = records
            .into_iter()
            .filter_map(|r| self.to_event(r))
            .collect();

        info!(records = total, events = events.len(), "indexer query complete");

        Ok(dedupe_by_content_id(events))
    }

    fn name(&self) -> &str {
        "indexed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CID_A: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
    const CID_B: &str = "QmT78zSuBmuS4z925WZfrqQ1qHaJ56DQaTfyMUF7F8ff5o";

    async fn source_for(server: &MockServer) -> IndexedQuerySource {
        let config = SourceConfig {
            indexer_url: format!("{}/graphql", server.uri()),
            ..SourceConfig::default()
        };
        IndexedQuerySource::new(&config).unwrap()
    }

    #[tokio::test]
    async fn maps_records_and_drops_malformed_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "variables": { "since": 1_700_000_000 } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "ipfshashs": [
                    { "id": CID_A, "block": "17000001", "createdAt": "1700000100",
                      "transactionHash": "0x01", "userId": "0xABCD" },
                    { "id": "not-a-cid", "block": 17000002, "createdAt": 1700000200,
                      "transactionHash": "0x02", "userId": "0xabcd" },
                    { "id": CID_B, "block": 17000003, "createdAt": 1700000300,
                      "transactionHash": "0x03", "userId": "0xabcd" },
                    { "id": CID_A, "block": 17000004, "createdAt": 1700000400,
                      "transactionHash": "0x04", "userId": "0xabcd" }
                ]}
            })))
            .mount(&server)
            .await;

        let source = source_for(&server).await;
        let since = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let events = source.fetch_events_since(since).await.unwrap();

        assert_eq!(events.len(), 2);
        let a = events.iter().find(|e| e.content_id == CID_A).unwrap();
        assert_eq!(a.source_block, 17_000_001);
        assert_eq!(a.author_address, "0xabcd");
        assert_eq!(a.source_timestamp.timestamp(), 1_700_000_100);
    }

    #[tokio::test]
    async fn graphql_errors_surface_as_adapter_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{ "message": "indexing_error" }]
            })))
            .mount(&server)
            .await;

        let source = source_for(&server).await;
        let err = source.fetch_events_since(Utc::now()).await.unwrap_err();
        assert_eq!(err.kind(), "adapter");
        assert!(err.to_string().contains("indexing_error"));
    }

    #[tokio::test]
    async fn http_errors_surface_as_adapter_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = source_for(&server).await;
        let err = source.fetch_events_since(Utc::now()).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
