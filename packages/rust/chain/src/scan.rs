//! Direct on-chain log scanning.
//!
//! Logs are fetched in one `eth_getLogs` range query, split into fixed-size
//! batches, and resolved with bounded fan-out: up to `max_concurrent_batches`
//! batches run at once, and every log inside a batch is resolved concurrently.
//! A log that fails to resolve is dropped without failing its batch.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::future::join_all;
use futures::stream;
use tracing::{debug, info, instrument, warn};

use revindex_shared::{IndexerError, Result, RevisionEvent, SourceConfig};

use crate::abi;
use crate::blocks::BlockLookup;
use crate::rpc::{RpcClient, RpcLog, parse_quantity};
use crate::{EventSource, dedupe_by_content_id};

/// Event source that reads contract logs straight from a JSON-RPC node.
pub struct ChainScanSource {
    rpc: Arc<RpcClient>,
    lookup: BlockLookup,
    contract_address: String,
    event_topic: String,
    batch_size: usize,
    max_concurrent_batches: usize,
}

impl ChainScanSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        if config.contract_address.is_empty() {
            return Err(IndexerError::config(
                "source.contract_address is required for the chain strategy",
            ));
        }
        if config.event_topic.is_empty() {
            return Err(IndexerError::config(
                "source.event_topic is required for the chain strategy",
            ));
        }

        let rpc = Arc::new(RpcClient::new(&config.rpc_url)?);
        Ok(Self {
            lookup: BlockLookup::new(rpc.clone()),
            rpc,
            contract_address: config.contract_address.to_lowercase(),
            event_topic: config.event_topic.to_lowercase(),
            batch_size: config.batch_size.max(1),
            max_concurrent_batches: config.max_concurrent_batches.max(1),
        })
    }

    /// Scan from `start_block` to the current head.
    #[instrument(skip(self, watermark))]
    pub async fn scan_from(
        &self,
        start_block: u64,
        watermark: DateTime<Utc>,
    ) -> Result<Vec<RevisionEvent>> {
        let head = self.rpc.block_number().await?;
        if start_block > head {
            return Ok(Vec::new());
        }

        let logs = self
            .rpc
            .logs(&self.contract_address, &self.event_topic, start_block, head)
            .await?;

        info!(logs = logs.len(), start_block, head, "fetched contract logs");

        let batches: Vec<Vec<RpcLog>> = logs
            .chunks(self.batch_size)
            .map(<[RpcLog]>::to_vec)
            .collect();

        let mut resolved: Vec<(usize, Vec<RevisionEvent>)> =
            stream::iter(batches.into_iter().enumerate())
                .map(|(index, batch)| async move { (index, self.resolve_batch(batch).await) })
                .buffer_unordered(self.max_concurrent_batches)
                .collect()
                .await;

        // Batches complete out of order; merge by index.
        resolved.sort_by_key(|(index, _)| *index);

        let events: Vec<RevisionEvent> = resolved
            .into_iter()
            .flat_map(|(_, events)| events)
            .filter(|e| e.source_timestamp >= watermark)
            .collect();

        Ok(dedupe_by_content_id(events))
    }

    async fn resolve_batch(&self, batch: Vec<RpcLog>) -> Vec<RevisionEvent> {
        let results = join_all(batch.iter().map(|log| self.resolve_log(log))).await;

        results
            .into_iter()
            .zip(batch.iter())
            .filter_map(|(result, log)| match result {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(tx = %log.transaction_hash, error = %e, "dropping unresolvable log");
                    None
                }
            })
            .collect()
    }

    /// Resolve one log: its block timestamp plus the decoded event fields.
    async fn resolve_log(&self, log: &RpcLog) -> Result<RevisionEvent> {
        let block = self.rpc.block_by_hash(&log.block_hash).await?;
        let decoded = abi::decode_posted(log)?;

        debug!(content_id = %decoded.content_id, block = %log.block_number, "resolved log");

        Ok(RevisionEvent {
            content_id: decoded.content_id,
            source_block: parse_quantity(&log.block_number)?,
            source_timestamp: block.timestamp()?,
            transaction_hash: log.transaction_hash.clone(),
            author_address: decoded.author,
        })
    }
}

#[async_trait]
impl EventSource for ChainScanSource {
    #[instrument(skip_all, fields(source = "chain", watermark = %watermark))]
    async fn fetch_events_since(&self, watermark: DateTime<Utc>) -> Result<Vec<RevisionEvent>> {
        let start_block = self
            .lookup
            .block_at_or_after(watermark)
            .await
            .map_err(crate::into_adapter_error)?;
        self.scan_from(start_block, watermark)
            .await
            .map_err(crate::into_adapter_error)
    }

    fn name(&self) -> &str {
        "chain"
    }
}
