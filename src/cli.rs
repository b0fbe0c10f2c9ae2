//! CLI argument definitions and dispatch.
//!
//! `docflow serve` runs the HTTP trigger surface with the orchestrator;
//! `docflow status` reads a session's durable record directly and prints the
//! same payload the status endpoint serves, for operators poking at a
//! deployment from a shell.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

use docflow_config::Config;
use docflow_engine::{Orchestrator, StageTimeout};
use docflow_generator::{StageGenerators, build_client};
use docflow_guard::ConcurrencyGuard;
use docflow_reporter::{AlertSink, FailureReporter, NoopSink, WebhookSink};
use docflow_server::{GenerationService, StatusResponse};
use docflow_store::{FsProgressStore, ProgressStore};
use docflow_utils::SessionId;

/// docflow - background document-generation orchestrator
#[derive(Parser)]
#[command(name = "docflow")]
#[command(about = "Sequences, persists and resumes per-session document generation")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (defaults to docflow.toml when present)
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Verbose logging (equivalent to RUST_LOG=docflow=debug)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP trigger surface and orchestrator
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print a session's generation status as JSON
    Status {
        /// Session identifier
        session_id: String,
    },
}

/// Parse arguments and run the selected command to completion.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    docflow_utils::logging::init_tracing(cli.verbose)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    match cli.command {
        Command::Serve { bind } => runtime.block_on(serve(config, bind)),
        Command::Status { session_id } => runtime.block_on(print_status(&config, &session_id)),
    }
}

async fn serve(mut config: Config, bind_override: Option<String>) -> anyhow::Result<()> {
    if let Some(bind) = bind_override {
        config.server.bind = bind;
        config.validate().context("invalid bind override")?;
    }

    let service = build_service(&config)?;
    docflow_server::serve(&config.server.bind, service)
        .await
        .map_err(|e| anyhow::anyhow!("server failed: {e}"))
}

/// Wire config into the full service: store, per-stage generators, guard,
/// reporter, orchestrator.
pub fn build_service(config: &Config) -> anyhow::Result<Arc<GenerationService>> {
    let store = Arc::new(FsProgressStore::new(config.storage.data_dir.clone()));

    let client = build_client(Duration::from_secs(config.generation.connect_timeout_secs))
        .context("failed to build generation HTTP client")?;
    let generators = StageGenerators::http(&config.generation.base_url, client.clone());

    let sink: Arc<dyn AlertSink> = match &config.alerts.webhook_url {
        Some(url) => Arc::new(WebhookSink::new(client, url.clone())),
        None => Arc::new(NoopSink),
    };

    let orchestrator = Orchestrator::new(
        store as Arc<dyn ProgressStore>,
        generators,
        ConcurrencyGuard::new(),
        FailureReporter::new(sink),
        StageTimeout::from_secs(config.generation.stage_timeout_secs),
    );

    Ok(Arc::new(GenerationService::new(orchestrator)))
}

async fn print_status(config: &Config, raw_session_id: &str) -> anyhow::Result<()> {
    let session_id = SessionId::parse(raw_session_id).context("invalid session id")?;
    let store = FsProgressStore::new(config.storage.data_dir.clone());
    let record = store
        .fetch(&session_id)
        .await
        .context("failed to read session record")?;

    let payload = StatusResponse::from_record(&record);
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
