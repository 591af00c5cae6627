//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use revindex_core::{IngestRequest, build_orchestrator, ingest_event};
use revindex_shared::{
    AppConfig, IndexerConfig, SourceStrategy, TimestampSource, init_config, load_config,
    load_config_from,
};
use revindex_storage::Storage;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// revindex: on-chain edits in, validated revisions out.
#[derive(Parser)]
#[command(
    name = "revindex",
    version,
    about = "Index on-chain document edits into validated, scored, persisted revisions.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.revindex/revindex.toml).
    #[arg(long, global = true, env = "REVINDEX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Event source selection.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum SourceArg {
    Indexed,
    Chain,
}

impl From<SourceArg> for SourceStrategy {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Indexed => SourceStrategy::Indexed,
            SourceArg::Chain => SourceStrategy::Chain,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Poll the event source and index new revisions.
    Run {
        /// Start watermark as unix seconds (defaults to the newest stored update).
        #[arg(long)]
        start: Option<i64>,

        /// Keep polling until interrupted.
        #[arg(long = "loop")]
        repeat: bool,

        /// Stamp revisions with the event's block time instead of the store clock.
        #[arg(long)]
        event_timestamps: bool,

        /// Override the configured event source.
        #[arg(long)]
        source: Option<SourceArg>,
    },

    /// Index a single edit event.
    Ingest {
        /// Content id of the payload in the gateway.
        content_id: String,

        /// Block height of the edit.
        #[arg(long)]
        block: u64,

        /// Block timestamp as unix seconds.
        #[arg(long)]
        timestamp: i64,

        /// Transaction hash.
        #[arg(long)]
        tx: String,

        /// Signer address.
        #[arg(long)]
        author: String,
    },

    /// Print a stored revision and its audit trail as JSON.
    Show {
        /// Revision id (slug).
        id: String,
    },

    /// Hide a revision from readers, or make it visible again.
    Hide {
        /// Revision id (slug).
        id: String,

        /// Clear the hidden flag instead of setting it.
        #[arg(long)]
        unhide: bool,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "revindex=info",
        1 => "revindex=debug",
        _ => "revindex=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let app_config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Run {
            start,
            repeat,
            event_timestamps,
            source,
        } => {
            let mut app_config = app_config;
            if event_timestamps {
                app_config.pipeline.timestamp_source = TimestampSource::Event;
            }
            if let Some(source) = source {
                app_config.source.strategy = source.into();
            }
            let start = start.map(unix_to_utc).transpose()?;
            cmd_run(&app_config, start, repeat).await
        }
        Command::Ingest {
            content_id,
            block,
            timestamp,
            tx,
            author,
        } => {
            let request = IngestRequest {
                content_id,
                block,
                timestamp: unix_to_utc(timestamp)?,
                transaction_hash: tx,
                author,
            };
            cmd_ingest(&app_config, request).await
        }
        Command::Show { id } => cmd_show(&app_config, &id).await,
        Command::Hide { id, unhide } => cmd_hide(&app_config, &id, !unhide).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&app_config),
        },
    }
}

fn unix_to_utc(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| eyre!("invalid unix timestamp: {secs}"))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(app_config: &AppConfig, start: Option<DateTime<Utc>>, repeat: bool) -> Result<()> {
    let config = IndexerConfig::try_from(app_config)?;
    let orchestrator = build_orchestrator(&config).await?;

    if !repeat {
        let summary = orchestrator.run_once(start).await?;
        println!(
            "events: {}  indexed: {}  skipped: {}  rejected: {}  failed: {}",
            summary.events, summary.indexed, summary.skipped, summary.rejected, summary.failed
        );
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, finishing the in-flight item"),
            Err(e) => warn!(error = %e, "failed to listen for interrupt"),
        }
        on_signal.cancel();
    });

    orchestrator.run_loop(start, cancel).await;
    Ok(())
}

async fn cmd_ingest(app_config: &AppConfig, request: IngestRequest) -> Result<()> {
    let config = IndexerConfig::try_from(app_config)?;
    let event = request.into_event(config.source.content_id_len)?;
    let orchestrator = build_orchestrator(&config).await?;

    let outcome = ingest_event(&orchestrator, event).await?;
    println!("{outcome:?}");
    Ok(())
}

async fn cmd_show(app_config: &AppConfig, id: &str) -> Result<()> {
    let config = IndexerConfig::try_from(app_config)?;
    let storage = Storage::open_readonly(&config.database_path).await?;

    let revision = storage
        .get_revision(id)
        .await?
        .ok_or_else(|| eyre!("no revision with id '{id}'"))?;
    let audit = storage.audit_records(id).await?;

    let report = serde_json::json!({ "revision": revision, "audit": audit });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_hide(app_config: &AppConfig, id: &str, hidden: bool) -> Result<()> {
    let config = IndexerConfig::try_from(app_config)?;
    let storage = Storage::open(&config.database_path).await?;

    if !storage.hide_revision(id, hidden).await? {
        return Err(eyre!("no revision with id '{id}'"));
    }
    println!("{id}: hidden = {hidden}");
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
