//! Shared types, error model, and configuration for revindex.
//!
//! This crate is the foundation depended on by all other revindex crates.
//! It provides:
//! - [`IndexerError`]: the unified error type
//! - Domain types ([`RevisionEvent`], [`DocumentPayload`], [`PersistedRevision`], ...)
//! - Configuration ([`AppConfig`], [`IndexerConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, GatewayConfig, IndexerConfig, PipelineConfig, RevalidationConfig, ScoringConfig,
    SourceConfig, SourceStrategy, ValidationConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{IndexerError, Result};
pub use types::{
    AuditKind, AuditRecord, CategoryRef, ChangeMetrics, DocumentPayload, IdRef, ImageRef,
    MetaEntry, Origin, PersistedRevision, RevisionEvent, TimestampSource, ValidationVerdict,
    ValidatorCode, meta_keys,
};
