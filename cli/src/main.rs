//! Submits a file of URLs as one job and waits for it to finish.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use linkqueue::db::default_database_path;
use linkqueue::{
    init_tracing, load_config, Item, JobEventKind, JobPriority, JobStatus, LinkQueue,
    LinkQueueError, LogFormat, QueueConfig, SqliteRepository,
};

const OWNER_ID: &str = "cli";

#[derive(Debug, Parser)]
#[command(name = "linkqueue-cli", version, about, long_about = None)]
struct Cli {
    /// File with one URL per line. Blank lines and lines starting with '#'
    /// are ignored.
    urls_file: PathBuf,

    /// Path to a JSON queue config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database path. Defaults to ~/.linkqueue/data/linkqueue.db
    #[arg(long)]
    db: Option<PathBuf>,

    /// Job priority: low, normal, high or urgent
    #[arg(short, long, default_value = "normal")]
    priority: JobPriority,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("Failed to read '{path}': {source}")]
    ReadUrls {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{0}' contains no URLs")]
    NoUrls(PathBuf),

    #[error("No database path given and no home directory found")]
    NoDatabasePath,

    #[error(transparent)]
    Queue(#[from] LinkQueueError),

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

fn read_items(path: &Path) -> Result<Vec<Item>, CliError> {
    let content = std::fs::read_to_string(path).map_err(|e| CliError::ReadUrls {
        path: path.to_path_buf(),
        source: e,
    })?;
    let items: Vec<Item> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Item::new)
        .collect();
    if items.is_empty() {
        return Err(CliError::NoUrls(path.to_path_buf()));
    }
    Ok(items)
}

async fn run(cli: Cli) -> Result<bool, CliError> {
    let config = match &cli.config {
        Some(path) => load_config(path).map_err(LinkQueueError::from)?,
        None => QueueConfig::default(),
    };
    let db_path = match cli.db {
        Some(path) => path,
        None => default_database_path().ok_or(CliError::NoDatabasePath)?,
    };
    let items = read_items(&cli.urls_file)?;

    let repository = SqliteRepository::open(&db_path).map_err(LinkQueueError::from)?;
    let queue = LinkQueue::builder()
        .config(config)
        .repository(Arc::new(repository))
        .open()
        .await?;

    let mut events = queue.subscribe();
    queue.start()?;
    let job_id = queue.submit(OWNER_ID, items, None, Some(cli.priority))?;
    info!(job_id = %job_id, "Job submitted");

    let interrupted = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break true,
            event = events.recv() => match event {
                Ok(event) if event.job_id == job_id => {
                    info!(
                        kind = %event.kind,
                        processed = event.progress.processed,
                        failed = event.progress.failed,
                        total = event.progress.total,
                        "{}",
                        event.message
                    );
                    if event.kind.is_final() {
                        break false;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Missed {} progress events", skipped);
                    if queue.get_job(&job_id)?.is_terminal() {
                        break false;
                    }
                }
                Err(RecvError::Closed) => break false,
            },
        }
    };

    queue.shutdown().await;
    if interrupted {
        warn!(job_id = %job_id, "Interrupted; the job resumes on the next run");
        return Ok(false);
    }

    let job = queue.get_job(&job_id)?;
    match job.status {
        JobStatus::Completed => {
            let output = queue.get_results(&job_id)?;
            println!("{}", serde_json::to_string_pretty(&output.summary)?);
            Ok(true)
        }
        _ => {
            println!("{}", serde_json::to_string_pretty(&job.status_view())?);
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_tracing(format);

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
