//! Worker subprocess spawning.
//!
//! Workers are re-executions of the pool binary in its hidden
//! `--internal-worker` mode. The control channel rides on piped
//! stdin/stdout; stderr is inherited so worker logs land with the
//! supervisor's.

use std::process::Stdio;

use tokio::process::Command;
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::proc::WorkerProc;

/// Spawn a worker subprocess registered under `worker_id`.
pub fn spawn_worker(config: &PoolConfig, worker_id: Uuid) -> Result<WorkerProc, PoolError> {
    let exe = match &config.worker_bin {
        Some(path) => path.clone(),
        None => std::env::current_exe()?,
    };

    let mut cmd = Command::new(exe);
    cmd.arg("--internal-worker")
        .arg("--worker-id")
        .arg(worker_id.to_string())
        .env("GEMPRESS_QUEUE_DB", &config.queue_db)
        .env(
            "GEMPRESS_CLAIM_BACKOFF_MS",
            config.claim_backoff.as_millis().to_string(),
        )
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let child = cmd.spawn()?;
    WorkerProc::from_child(worker_id, child)
}
