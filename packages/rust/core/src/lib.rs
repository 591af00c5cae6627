//! Pipeline orchestration for revindex.
//!
//! This crate ties the event sources, the content gateway, change analysis,
//! validation and storage together:
//! - [`fetcher`]: payload retrieval from the content gateway
//! - [`revalidate`]: front-end cache revalidation after a write
//! - [`store`]: storage plus the post-write hook
//! - [`pipeline`]: the polling orchestrator
//! - [`ingest`]: single-event ingestion

pub mod fetcher;
pub mod ingest;
pub mod pipeline;
pub mod revalidate;
pub mod store;

pub use fetcher::ContentFetcher;
pub use ingest::{IngestRequest, ingest_event};
pub use pipeline::{ItemOutcome, Orchestrator, RunSummary};
pub use revalidate::{HttpRevalidator, NoopRevalidator, Revalidator, build_revalidator};
pub use store::RevisionStore;

use revindex_shared::{IndexerConfig, Result};
use revindex_storage::Storage;

/// User-Agent string for outbound HTTP requests.
pub const USER_AGENT: &str = concat!("revindex/", env!("CARGO_PKG_VERSION"));

/// Open storage and wire every component from configuration.
pub async fn build_orchestrator(config: &IndexerConfig) -> Result<Orchestrator> {
    let storage = Storage::open(&config.database_path).await?;
    let store = RevisionStore::new(
        storage,
        build_revalidator(&config.revalidation)?,
        config.timestamp_source,
    );
    let source = revindex_chain::build_source(config)?;
    Orchestrator::new(config, source, store)
}
