//! Polling orchestrator: watermark → events → sequential per-item processing.
//!
//! Each cycle fetches events newer than the watermark and processes them one
//! at a time, in block order: duplicate pre-check, fetch, analyze, validate,
//! upsert. Item failures are logged and skipped; an event-source failure ends
//! the cycle. In loop mode a cycle that indexed something is followed
//! immediately by the next one; otherwise the loop sleeps for the poll
//! interval. Everything stops once the [`CancellationToken`] fires.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use revindex_analysis::ChangeAnalyzer;
use revindex_chain::EventSource;
use revindex_shared::{
    AuditKind, IndexerConfig, IndexerError, Origin, Result, RevisionEvent, ValidatorCode,
};
use revindex_storage::UpsertOutcome;
use revindex_validation::ContentValidator;

use crate::fetcher::ContentFetcher;
use crate::store::RevisionStore;

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Indexed(AuditKind),
    /// Content id already stored; nothing fetched or written.
    Skipped,
    Rejected(ValidatorCode),
}

/// Per-cycle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub events: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Events that reached a terminal outcome this cycle.
    pub fn processed(&self) -> usize {
        self.indexed + self.skipped + self.rejected + self.failed
    }
}

pub struct Orchestrator {
    source: Box<dyn EventSource>,
    fetcher: ContentFetcher,
    analyzer: ChangeAnalyzer,
    validator: ContentValidator,
    store: RevisionStore,
    item_delay: Duration,
    poll_interval: Duration,
    fallback_window: chrono::Duration,
}

impl Orchestrator {
    pub fn new(
        config: &IndexerConfig,
        source: Box<dyn EventSource>,
        store: RevisionStore,
    ) -> Result<Self> {
        Ok(Self {
            source,
            fetcher: ContentFetcher::from_config(config)?,
            analyzer: ChangeAnalyzer::new(config.scoring.clone()),
            validator: ContentValidator::new(config.validation.clone()),
            store,
            item_delay: config.item_delay,
            poll_interval: config.poll_interval,
            fallback_window: config.fallback_window,
        })
    }

    pub fn store(&self) -> &RevisionStore {
        &self.store
    }

    /// Explicit start, else the newest stored update, else now minus the
    /// fallback window.
    pub async fn determine_watermark(&self, start: Option<DateTime<Utc>>) -> Result<DateTime<Utc>> {
        if let Some(start) = start {
            return Ok(start);
        }
        match self.store.latest_update().await? {
            Some(latest) => Ok(latest),
            None => Utc::now()
                .checked_sub_signed(self.fallback_window)
                .ok_or_else(|| IndexerError::config("fallback window exceeds the supported time range")),
        }
    }

    /// Run a single cycle.
    pub async fn run_once(&self, start: Option<DateTime<Utc>>) -> Result<RunSummary> {
        self.run_cycle(start, &CancellationToken::new()).await
    }

    /// Repeat cycles until `cancel` fires. `start` applies to the first cycle
    /// only; later cycles refresh the watermark from storage.
    pub async fn run_loop(&self, start: Option<DateTime<Utc>>, cancel: CancellationToken) {
        let mut start = start;

        while !cancel.is_cancelled() {
            let idle = match self.run_cycle(start.take(), &cancel).await {
                Ok(summary) => summary.indexed == 0,
                Err(e) => {
                    error!(error = %e, kind = e.kind(), "cycle aborted");
                    true
                }
            };
            if !idle {
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        info!("indexer loop stopped");
    }

    #[instrument(skip_all, fields(source = self.source.name()))]
    async fn run_cycle(
        &self,
        start: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let started = Instant::now();
        let watermark = self.determine_watermark(start).await?;
        let mut events = self.source.fetch_events_since(watermark).await?;
        events.sort_by(|a, b| {
            a.source_block
                .cmp(&b.source_block)
                .then_with(|| a.transaction_hash.cmp(&b.transaction_hash))
        });

        let mut summary = RunSummary {
            events: events.len(),
            ..RunSummary::default()
        };
        info!(%watermark, events = events.len(), "fetched events");

        for event in &events {
            if cancel.is_cancelled() {
                info!(remaining = summary.events - summary.processed(), "cycle cancelled");
                break;
            }
            match self.process_event(event).await {
                Ok(ItemOutcome::Indexed(_)) => {
                    summary.indexed += 1;
                    if !self.item_delay.is_zero() {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(self.item_delay) => {}
                        }
                    }
                }
                Ok(ItemOutcome::Skipped) => summary.skipped += 1,
                Ok(ItemOutcome::Rejected(code)) => {
                    summary.rejected += 1;
                    warn!(content_id = %event.content_id, code = %code, "payload rejected; dropped");
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(content_id = %event.content_id, kind = e.kind(), error = %e, "item failed; skipped");
                }
            }
        }

        info!(
            events = summary.events,
            indexed = summary.indexed,
            skipped = summary.skipped,
            rejected = summary.rejected,
            failed = summary.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cycle complete"
        );
        Ok(summary)
    }

    /// Pre-check → fetch → analyze → validate → upsert for one event.
    #[instrument(skip_all, fields(content_id = %event.content_id))]
    pub async fn process_event(&self, event: &RevisionEvent) -> Result<ItemOutcome> {
        if self.store.is_already_indexed(&event.content_id).await? {
            return Ok(ItemOutcome::Skipped);
        }

        let payload = self.fetcher.fetch(&event.content_id).await?;
        let previous = self.store.previous(&payload.id).await?;

        let (payload, metrics) = self.analyzer.process(payload, previous.as_ref());

        let origin = Origin::Chain {
            signer: event.author_address.clone(),
        };
        let verdict = self.validator.validate(&payload, &origin, previous.as_ref());
        if !verdict.status {
            return Ok(ItemOutcome::Rejected(verdict.code));
        }

        Ok(match self.store.upsert(&payload, event).await? {
            UpsertOutcome::Created(_) => {
                info!(id = %payload.id, score = metrics.quality_score, "revision created");
                ItemOutcome::Indexed(AuditKind::Created)
            }
            UpsertOutcome::Updated(_) => {
                info!(
                    id = %payload.id,
                    score = metrics.quality_score,
                    percent_changed = metrics.percent_changed,
                    "revision updated"
                );
                ItemOutcome::Indexed(AuditKind::Updated)
            }
            UpsertOutcome::AlreadyIndexed => ItemOutcome::Skipped,
        })
    }
}
