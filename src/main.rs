#![forbid(unsafe_code)]

//! `notebook-evalctl` — evaluation engine client binary.
//!
//! Drives a notebook install or evaluation against the evaluation engine,
//! streams engine events to stdout as JSON lines, and exits once the
//! session goes idle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use notebook_evaluator::config::GlobalConfig;
use notebook_evaluator::engine::protocol::StopRequest;
use notebook_evaluator::engine::{EvaluationEngine, HttpEngine};
use notebook_evaluator::evaluator::{EvaluatorClient, Subscription};
use notebook_evaluator::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "notebook-evalctl", about = "Evaluation engine client", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Install a notebook's dependencies and wait for completion.
    Install {
        #[command(flatten)]
        target: NotebookArgs,
    },
    /// Evaluate a notebook and wait for completion.
    Evaluate {
        #[command(flatten)]
        target: NotebookArgs,

        /// Evaluate all cells up to and including this cell.
        #[arg(long, conflicts_with = "single_cell")]
        to_cell: Option<String>,

        /// Evaluate only this cell.
        #[arg(long)]
        single_cell: Option<String>,
    },
    /// Ask the engine to stop all work for a notebook.
    Stop {
        /// The notebook to stop.
        #[arg(long)]
        notebook_id: String,
    },
}

#[derive(Debug, Args)]
struct NotebookArgs {
    /// Path to the serialized notebook JSON document.
    #[arg(long)]
    notebook: PathBuf,

    /// Notebook id; generated when omitted.
    #[arg(long)]
    notebook_id: Option<String>,

    /// Containing path of the notebook, reported to the engine.
    #[arg(long)]
    containing_path: Option<String>,

    /// Give up after this many seconds without the session going idle.
    #[arg(long, default_value_t = 600)]
    timeout_seconds: u64,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::from_env()?,
    };
    info!(base_url = %config.engine.base_url, "connecting to evaluation engine");

    let engine = Arc::new(HttpEngine::new(&config.engine)?);

    match args.command {
        Command::Install { target } => {
            run_job(&engine, &config, &target, |client, id, notebook, path| {
                client.install_notebook(id, notebook, path);
            })
            .await
        }
        Command::Evaluate {
            target,
            to_cell,
            single_cell,
        } => {
            run_job(&engine, &config, &target, |client, id, notebook, path| {
                match (to_cell, single_cell) {
                    (_, Some(cell_id)) => client.eval_single_cell(id, notebook, &cell_id, path),
                    (Some(cell_id), None) => client.eval_to_cell(id, notebook, &cell_id, path),
                    (None, None) => client.eval_notebook(id, notebook, path),
                }
            })
            .await
        }
        Command::Stop { notebook_id } => {
            engine
                .stop(StopRequest {
                    notebook_id: notebook_id.clone(),
                })
                .await?;
            info!(%notebook_id, "stop request delivered");
            Ok(())
        }
    }
}

/// Start one job through the coordinator and wait until the session goes
/// idle, streaming engine events to stdout.
async fn run_job(
    engine: &Arc<HttpEngine>,
    config: &GlobalConfig,
    target: &NotebookArgs,
    start: impl FnOnce(&EvaluatorClient, &str, &Value, Option<&str>),
) -> Result<()> {
    let notebook = read_notebook(&target.notebook)?;
    let notebook_id = target
        .notebook_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let client = EvaluatorClient::new(
        Arc::clone(engine) as Arc<dyn EvaluationEngine>,
        config.session.poll_interval(),
        config.session.idle_grace(),
    );

    // Subscribe before starting the job so no notification is missed.
    let jobs = client.on_jobs_changed();
    let events = client.on_engine_event();

    start(&client, &notebook_id, &notebook, target.containing_path.as_deref());

    watch_until_idle(
        &client,
        engine.as_ref(),
        &notebook_id,
        jobs,
        events,
        Duration::from_secs(target.timeout_seconds),
    )
    .await
}

/// Stream engine events until every job has retired, or the timeout fires.
async fn watch_until_idle(
    client: &EvaluatorClient,
    engine: &dyn EvaluationEngine,
    notebook_id: &str,
    mut jobs: Subscription<()>,
    mut events: Subscription<Value>,
    timeout: Duration,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => {
                warn!(notebook_id, "timed out waiting for the engine to go idle");
                // Deliver the stop directly; a fire-and-forget dispatch
                // would race process exit.
                if let Err(err) = engine
                    .stop(StopRequest { notebook_id: notebook_id.to_owned() })
                    .await
                {
                    warn!(%err, "stop request failed");
                }
                return Err(AppError::Engine(
                    "timed out waiting for the evaluation engine".into(),
                ));
            }
            event = events.recv() => {
                if let Some(event) = event {
                    println!("{event}");
                }
            }
            changed = jobs.recv() => {
                if changed.is_some() && !client.is_working() {
                    // Flush events queued behind the final completion.
                    while let Ok(event) = events.try_recv() {
                        println!("{event}");
                    }
                    info!("all jobs complete");
                    return Ok(());
                }
            }
        }
    }
}

fn read_notebook(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| AppError::Io(format!("cannot read notebook {}: {err}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|err| AppError::Notebook(format!("invalid notebook document: {err}")))
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
