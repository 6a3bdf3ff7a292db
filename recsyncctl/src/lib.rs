use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use recsync_core::publish::records::CameraRecord;
use recsync_core::{
    load_recsync_config, HttpCatalogBrowser, MetadataSnapshot, MetadataStore, RecsyncConfig,
    SyncEngine, SyncError, TransportClient, TransportError,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] recsync_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine error: {0}")]
    Engine(#[from] SyncError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("refresh cycle failed")]
    CycleFailed,
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "recsync command-line control interface", long_about = None)]
pub struct Cli {
    /// Path to recsync.toml
    #[arg(long, default_value = "configs/recsync.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one refresh cycle and exit
    Sync,
    /// Run refresh cycles on the configured interval
    Watch,
    /// Show the persisted metadata snapshot
    Status,
    /// Discover cameras and show their latest recordings
    Cameras,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    init_tracing();
    if let Commands::Completions { shell } = &cli.command {
        let mut command = Cli::command();
        let name = command.get_name().to_string();
        clap_complete::generate(*shell, &mut command, name, &mut std::io::stdout());
        return Ok(());
    }

    let config = load_recsync_config(&cli.config)?;
    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Sync => runtime.block_on(sync_once(&config, cli.format)),
        Commands::Watch => runtime.block_on(watch(&config)),
        Commands::Status => status(&config, cli.format),
        Commands::Cameras => runtime.block_on(cameras(&config, cli.format)),
        Commands::Completions { .. } => unreachable!("handled above"),
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

fn build_engine(config: &RecsyncConfig) -> Result<SyncEngine> {
    let transport = Arc::new(TransportClient::new(&config.connection, &config.transport)?);
    let browser = Arc::new(HttpCatalogBrowser::new(
        transport.clone(),
        config.connection.browse_entity.clone(),
    ));
    Ok(SyncEngine::new(config, browser, transport, None)?)
}

#[derive(Debug, Serialize)]
struct SyncReport {
    cameras: Vec<CameraRecord>,
}

async fn sync_once(config: &RecsyncConfig, format: OutputFormat) -> Result<()> {
    let engine = build_engine(config)?;
    if !engine.refresh().await {
        return Err(AppError::CycleFailed);
    }
    let report = SyncReport {
        cameras: engine.records(),
    };
    render(&report, format, |report| {
        let mut out = String::new();
        for record in &report.cameras {
            match (&record.state, &record.error) {
                (Some(state), _) => out.push_str(&format!("{}: {}\n", record.camera, state)),
                (None, Some(error)) => {
                    out.push_str(&format!("{}: unavailable ({})\n", record.camera, error))
                }
                (None, None) => out.push_str(&format!("{}: unavailable\n", record.camera)),
            }
        }
        out
    })
}

async fn watch(config: &RecsyncConfig) -> Result<()> {
    let engine = build_engine(config)?;
    let period = Duration::from_secs(config.sync.scan_interval_minutes * 60);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if !engine.refresh().await {
            warn!("cycle failed; previous published state left untouched");
        }
    }
}

fn status(config: &RecsyncConfig, format: OutputFormat) -> Result<()> {
    let store = MetadataStore::new(
        PathBuf::from(&config.paths.storage_dir).join("metadata/recordings.json"),
    );
    let snapshot = store
        .try_load()
        .map_err(|err| AppError::MissingResource(err.to_string()))?
        .ok_or_else(|| {
            AppError::MissingResource(
                "no metadata file yet; run `recsyncctl sync` first".to_string(),
            )
        })?;
    render(&snapshot, format, render_snapshot)
}

fn render_snapshot(snapshot: &MetadataSnapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "last update: {}\n",
        snapshot.last_update.as_deref().unwrap_or("never")
    ));
    for (camera, entry) in &snapshot.recording_cache {
        out.push_str(&format!(
            "{}: {} {} ({}) -> {}\n",
            camera, entry.timestamp, entry.duration, entry.event_type, entry.path
        ));
    }
    out
}

async fn cameras(config: &RecsyncConfig, format: OutputFormat) -> Result<()> {
    let engine = build_engine(config)?;
    if !engine.refresh().await {
        return Err(AppError::CycleFailed);
    }
    let descriptors = engine.cameras();
    render(&descriptors, format, |descriptors| {
        let mut out = String::new();
        for descriptor in descriptors {
            match &descriptor.error {
                Some(error) => out.push_str(&format!(
                    "[{}] {}: error: {}\n",
                    descriptor.camera_index, descriptor.camera_name, error
                )),
                None => out.push_str(&format!(
                    "[{}] {}: {} {} {} {}\n",
                    descriptor.camera_index,
                    descriptor.camera_name,
                    descriptor.date,
                    descriptor.timestamp,
                    descriptor.duration,
                    descriptor.event_type
                )),
            }
        }
        out
    })
}

fn render<T: Serialize>(
    value: &T,
    format: OutputFormat,
    text: impl FnOnce(&T) -> String,
) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => print!("{}", text(value)),
    }
    Ok(())
}
