//! Application configuration for revindex.
//!
//! User config lives at `~/.revindex/revindex.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};
use crate::types::TimestampSource;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "revindex.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".revindex";

// ---------------------------------------------------------------------------
// Config structs (matching revindex.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub revalidation: RevalidationConfig,
}

/// `[gateway]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL; payloads are fetched from `{base_url}/{content_id}`.
    #[serde(default = "default_gateway_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_gateway_url() -> String {
    "https://ipfs.io/ipfs".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// Which event-source strategy to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStrategy {
    /// Query the indexing service (GraphQL).
    #[default]
    Indexed,
    /// Scan contract logs over JSON-RPC.
    Chain,
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub strategy: SourceStrategy,

    /// GraphQL endpoint of the indexing service.
    #[serde(default = "default_indexer_url")]
    pub indexer_url: String,

    /// Expected length of a content id; other ids are dropped.
    #[serde(default = "default_content_id_len")]
    pub content_id_len: usize,

    /// EVM JSON-RPC endpoint.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Address of the contract emitting edit events.
    #[serde(default)]
    pub contract_address: String,

    /// topic0 of the edit event, i.e. `keccak256("Posted(address,string)")`.
    #[serde(default)]
    pub event_topic: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            strategy: SourceStrategy::default(),
            indexer_url: default_indexer_url(),
            content_id_len: default_content_id_len(),
            rpc_url: default_rpc_url(),
            contract_address: String::new(),
            event_topic: String::new(),
            batch_size: default_batch_size(),
            max_concurrent_batches: default_max_concurrent_batches(),
        }
    }
}

fn default_indexer_url() -> String {
    "http://localhost:8000/subgraphs/name/wiki".into()
}
fn default_content_id_len() -> usize {
    46
}
fn default_rpc_url() -> String {
    "http://localhost:8545".into()
}
fn default_batch_size() -> usize {
    50
}
fn default_max_concurrent_batches() -> usize {
    5
}

/// `[validation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,

    /// Hosts markdown links may point at (subdomains included).
    #[serde(default = "default_allowed_domains")]
    pub allowed_domains: Vec<String>,

    #[serde(default = "default_min_words")]
    pub min_words: usize,

    #[serde(default = "default_min_images")]
    pub min_images: usize,

    #[serde(default = "default_max_images")]
    pub max_images: usize,

    #[serde(default = "default_max_summary_chars")]
    pub max_summary_chars: usize,

    /// Metadata values must be strictly shorter than this.
    #[serde(default = "default_max_metadata_len")]
    pub max_metadata_len: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            allowed_domains: default_allowed_domains(),
            min_words: default_min_words(),
            min_images: default_min_images(),
            max_images: default_max_images(),
            max_summary_chars: default_max_summary_chars(),
            max_metadata_len: default_max_metadata_len(),
        }
    }
}

fn default_languages() -> Vec<String> {
    ["en", "es", "zh", "ko"].map(String::from).to_vec()
}
fn default_allowed_domains() -> Vec<String> {
    [
        "iq.wiki",
        "youtube.com",
        "youtu.be",
        "vimeo.com",
        "wikipedia.org",
        "github.com",
        "twitter.com",
        "x.com",
        "etherscan.io",
        "coingecko.com",
        "coinmarketcap.com",
    ]
    .map(String::from)
    .to_vec()
}
fn default_min_words() -> usize {
    150
}
fn default_min_images() -> usize {
    1
}
fn default_max_images() -> usize {
    5
}
fn default_max_summary_chars() -> usize {
    128
}
fn default_max_metadata_len() -> usize {
    255
}

/// `[scoring]` section: ideal counts for the quality score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_ideal_words")]
    pub ideal_words: usize,
    #[serde(default = "default_ideal_internal_links")]
    pub ideal_internal_links: usize,
    #[serde(default = "default_ideal_citations")]
    pub ideal_citations: usize,
    #[serde(default = "default_ideal_media")]
    pub ideal_media: usize,
    #[serde(default = "default_ideal_tags")]
    pub ideal_tags: usize,
    #[serde(default = "default_ideal_summary_chars")]
    pub ideal_summary_chars: usize,
    #[serde(default = "default_ideal_socials")]
    pub ideal_socials: usize,

    /// Link prefix that marks a link as internal.
    #[serde(default = "default_internal_link_prefix")]
    pub internal_link_prefix: String,

    /// Metadata keys that hold social profile links.
    #[serde(default = "default_social_keys")]
    pub social_keys: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            ideal_words: default_ideal_words(),
            ideal_internal_links: default_ideal_internal_links(),
            ideal_citations: default_ideal_citations(),
            ideal_media: default_ideal_media(),
            ideal_tags: default_ideal_tags(),
            ideal_summary_chars: default_ideal_summary_chars(),
            ideal_socials: default_ideal_socials(),
            internal_link_prefix: default_internal_link_prefix(),
            social_keys: default_social_keys(),
        }
    }
}

fn default_ideal_words() -> usize {
    800
}
fn default_ideal_internal_links() -> usize {
    10
}
fn default_ideal_citations() -> usize {
    10
}
fn default_ideal_media() -> usize {
    5
}
fn default_ideal_tags() -> usize {
    3
}
fn default_ideal_summary_chars() -> usize {
    100
}
fn default_ideal_socials() -> usize {
    4
}
fn default_internal_link_prefix() -> String {
    "https://iq.wiki/wiki/".into()
}
fn default_social_keys() -> Vec<String> {
    [
        "twitter_profile",
        "facebook_profile",
        "instagram_profile",
        "linkedin_profile",
        "youtube_profile",
        "telegram_profile",
        "discord_profile",
        "github_profile",
        "reddit_profile",
    ]
    .map(String::from)
    .to_vec()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// libSQL database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Pause after each successfully indexed item.
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,

    /// Pause between polling cycles in loop mode.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Look-back window used when storage is empty.
    #[serde(default = "default_fallback_window_hours")]
    pub fallback_window_hours: i64,

    #[serde(default)]
    pub timestamp_source: TimestampSource,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            item_delay_ms: default_item_delay_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            fallback_window_hours: default_fallback_window_hours(),
            timestamp_source: TimestampSource::default(),
        }
    }
}

fn default_database_path() -> String {
    "var/revindex.db".into()
}
fn default_item_delay_ms() -> u64 {
    3000
}
fn default_poll_interval_secs() -> u64 {
    3
}
fn default_fallback_window_hours() -> i64 {
    24
}

/// `[revalidation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevalidationConfig {
    /// Front-end cache invalidation endpoint. Disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Name of the env var holding the shared secret (never store the secret itself).
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
}

impl Default for RevalidationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            secret_env: default_secret_env(),
        }
    }
}

fn default_secret_env() -> String {
    "REVINDEX_REVALIDATE_SECRET".into()
}

// ---------------------------------------------------------------------------
// Runtime config (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime configuration injected into every pipeline component.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub gateway_url: String,
    pub gateway_timeout: Duration,
    pub source: SourceConfig,
    pub validation: ValidationConfig,
    pub scoring: ScoringConfig,
    pub database_path: PathBuf,
    pub item_delay: Duration,
    pub poll_interval: Duration,
    pub fallback_window: chrono::Duration,
    pub timestamp_source: TimestampSource,
    pub revalidation: RevalidationConfig,
}

impl TryFrom<&AppConfig> for IndexerConfig {
    type Error = IndexerError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let hours = config.pipeline.fallback_window_hours;
        let fallback_window = chrono::TimeDelta::try_hours(hours)
            .filter(|window| *window >= chrono::TimeDelta::zero())
            .ok_or_else(|| {
                IndexerError::config(format!("pipeline.fallback_window_hours out of range: {hours}"))
            })?;

        Ok(Self {
            gateway_url: config.gateway.base_url.trim_end_matches('/').to_string(),
            gateway_timeout: Duration::from_secs(config.gateway.timeout_secs),
            source: config.source.clone(),
            validation: config.validation.clone(),
            scoring: config.scoring.clone(),
            database_path: PathBuf::from(&config.pipeline.database_path),
            item_delay: Duration::from_millis(config.pipeline.item_delay_ms),
            poll_interval: Duration::from_secs(config.pipeline.poll_interval_secs),
            fallback_window,
            timestamp_source: config.pipeline.timestamp_source,
            revalidation: config.revalidation.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.revindex/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| IndexerError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.revindex/revindex.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| IndexerError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| IndexerError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| IndexerError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| IndexerError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| IndexerError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
