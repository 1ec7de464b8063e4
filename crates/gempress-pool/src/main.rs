//! Gempress worker pool binary.
//!
//! Runs the pool supervisor. The supervisor re-executes this binary with
//! the hidden `--internal-worker` flag to host each worker process.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use gempress_pool::runner::RunnerRegistry;
use gempress_pool::{worker, PoolConfig, Supervisor};
use gempress_queue::{JobQueue, SqliteJobQueue};

#[derive(Debug, Parser)]
#[command(name = "gempress-pool", version, about = "Self-scaling worker pool for gempress jobs")]
struct Args {
    /// Run as a pool-managed worker process (internal).
    #[arg(long, hide = true)]
    internal_worker: bool,

    /// Worker identity assigned by the supervisor (internal).
    #[arg(long, hide = true)]
    worker_id: Option<Uuid>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Worker stdout is the control channel; all logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gempress_pool=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = PoolConfig::from_env()?;

    if args.internal_worker {
        let worker_id = args.worker_id.unwrap_or_else(Uuid::new_v4);
        worker::run(worker_id, &config).await?;
        return Ok(());
    }

    tracing::info!(
        min_workers = config.min_workers,
        max_workers = config.max_workers,
        queue_db = %config.queue_db.display(),
        "Starting gempress worker pool"
    );

    let queue: Arc<dyn JobQueue> = Arc::new(SqliteJobQueue::connect(&config.queue_db).await?);
    let runners = RunnerRegistry::builtin();
    let mut supervisor = Supervisor::new(config, queue, runners);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    supervisor.run(shutdown).await?;

    tracing::info!("Worker pool stopped");
    Ok(())
}
