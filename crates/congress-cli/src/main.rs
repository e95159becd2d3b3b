mod output;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use congress_core::{CursorState, SyncConfig};
use congress_sync::{EndpointOutcome, SyncEngine};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::output::LocalHost;

#[derive(Parser)]
#[command(name = "congress-ingest", version, about = "Incremental Congress.gov ingestion")]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the table schemas for the selected endpoints
    Schema {
        /// Configuration file; only its `endpoints` selection is used
        #[arg(long)]
        config: Option<PathBuf>,
        /// Show the Arrow schema instead of the JSON descriptors
        #[arg(long)]
        arrow: bool,
    },
    /// Print the congress currently in session
    Current {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, env = "CONGRESS_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// Run one incremental update
    Update {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, env = "CONGRESS_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        /// Cursor state file, read at start and rewritten at every checkpoint
        #[arg(long)]
        state: Option<PathBuf>,
        /// Write operations here as JSON lines instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Schema { config, arrow } => cmd_schema(config.as_deref(), arrow),
        Command::Current { config, api_key } => cmd_current(&config, api_key).await,
        Command::Update {
            config,
            api_key,
            state,
            out,
        } => cmd_update(&config, api_key, state, out.as_deref()).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_config(path: &Path, api_key: Option<String>) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let mut config: Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    if let Some(key) = api_key {
        let Some(map) = config.as_object_mut() else {
            bail!("config {} is not a JSON object", path.display());
        };
        map.insert("api_key".into(), Value::String(key));
    }
    Ok(config)
}

fn cmd_schema(config: Option<&Path>, arrow: bool) -> anyhow::Result<()> {
    let configuration = match config {
        Some(path) => read_config(path, None)?,
        None => Value::Object(Default::default()),
    };
    let tables = congress_core::schema(&configuration)?;

    if !arrow {
        println!("{}", serde_json::to_string_pretty(&tables)?);
        return Ok(());
    }

    for table in &tables {
        println!("{} (primary key: {})", table.table, table.primary_key.join(", "));
        for field in table.to_arrow_schema().fields() {
            let nullable = if field.is_nullable() { "" } else { " not null" };
            let json = match field.metadata().get("logical_type") {
                Some(logical) => format!(" [{logical}]"),
                None => String::new(),
            };
            println!("  {:<28} {}{nullable}{json}", field.name(), field.data_type());
        }
    }
    Ok(())
}

async fn cmd_current(config: &Path, api_key: Option<String>) -> anyhow::Result<()> {
    let config = SyncConfig::from_value(&read_config(config, api_key)?)?;
    let engine = SyncEngine::new(config)?;
    println!("{}", engine.current_session().await?);
    Ok(())
}

async fn cmd_update(
    config: &Path,
    api_key: Option<String>,
    state_path: Option<PathBuf>,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let config = SyncConfig::from_value(&read_config(config, api_key)?)?;
    tracing::debug!(?config, "loaded configuration");

    let previous = match &state_path {
        Some(path) => output::read_state(path).await?,
        None => None,
    };
    let mut state = CursorState::from_value(previous.as_ref())?;
    tracing::info!(endpoints = state.len(), "loaded cursor state");
    for (endpoint, entry) in state.iter() {
        tracing::debug!(
            endpoint,
            session = ?entry.session_number,
            offset = entry.offset,
            from = ?entry.from_time,
            "stored cursor"
        );
    }

    let mut host = LocalHost::open(out, state_path).await?;
    let engine = SyncEngine::new(config)?;
    let summary = engine.run(&mut state, &mut host).await?;
    let (upserts, checkpoints) = (host.upserts, host.checkpoints);
    host.finish().await?;

    eprintln!("current congress: {}", summary.current_session);
    for report in &summary.reports {
        if report.outcome != EndpointOutcome::Skipped {
            eprintln!("  {:<20} {:>4}  {}", report.endpoint, report.session, report.outcome);
        }
    }
    eprintln!("{upserts} upserts, {checkpoints} checkpoints");

    let aborted = summary.aborted().count();
    if aborted > 0 {
        bail!("{aborted} endpoint(s) aborted; rerun to resume from the last checkpoint");
    }
    Ok(())
}
