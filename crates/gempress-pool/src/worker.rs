//! Worker process: claim-and-execute loop plus the control listener.
//!
//! A worker is one OS process. Its main loop claims jobs attributed to its
//! identity and runs them strictly one at a time; a concurrent listener
//! task answers supervisor requests arriving on stdin. Runner failures and
//! unregistered job types are not caught here: the process dies, and the
//! supervisor's liveness pass recovers the orphaned claim.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use gempress_queue::{ClaimedJob, JobQueue, SqliteJobQueue};

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::protocol::{parse_request, ControlReply, ControlRequest, ParsedRequest};
use crate::runner::RunnerRegistry;

/// State shared between the job loop and the control listener.
///
/// Both fields are coarse: the listener is the only writer of `running`
/// once the loop starts, and the job loop is the only writer of
/// `current_job`.
pub struct WorkerState {
    running: AtomicBool,
    current_job: Mutex<Option<Uuid>>,
}

impl WorkerState {
    /// Fresh, not-yet-running state.
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            current_job: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    pub fn current_job(&self) -> Option<Uuid> {
        *self.current_job.lock().expect("worker state mutex poisoned")
    }

    pub fn set_current_job(&self, job: Option<Uuid>) {
        *self.current_job.lock().expect("worker state mutex poisoned") = job;
    }
}

impl Default for WorkerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the reply for one control line, updating state as a side effect.
///
/// A `stop` is cooperative: it clears the running flag and acknowledges;
/// the job loop exits once its current job (or backoff sleep) finishes.
pub fn handle_control_line(line: &str, state: &WorkerState) -> ControlReply {
    match parse_request(line) {
        ParsedRequest::Malformed => ControlReply::invalid_format(),
        ParsedRequest::Unknown(tag) => ControlReply::Unknown { tag },
        ParsedRequest::Known(ControlRequest::Stop) => {
            state.set_running(false);
            ControlReply::Stopped
        }
        ParsedRequest::Known(ControlRequest::Status) => ControlReply::Status {
            current_job: state.current_job(),
            running: state.is_running(),
        },
    }
}

/// Control-channel listener: one reply per incoming stdin line.
async fn control_listener(worker_id: Uuid, state: Arc<WorkerState>) -> Result<(), PoolError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        tracing::debug!(worker_id = %worker_id, message = %line, "Control message received");
        let reply = handle_control_line(&line, &state);
        stdout.write_all(reply.to_line().as_bytes()).await?;
        stdout.flush().await?;
    }

    // EOF: the supervisor is gone, stop claiming work.
    state.set_running(false);
    Ok(())
}

/// Run one job to completion.
///
/// `cleanup` executes whether or not `run` failed; a failure from either
/// propagates out and takes the process down with it.
async fn execute_job(
    registry: &RunnerRegistry,
    queue: Arc<dyn JobQueue>,
    job: &ClaimedJob,
) -> Result<(), PoolError> {
    let factory = registry
        .get(&job.job_type)
        .ok_or_else(|| PoolError::UnknownJobType {
            job_type: job.job_type.clone(),
            job_id: job.id,
        })?;

    let mut runner = factory.create(job.id, queue);
    runner.setup().await?;
    let run_result = runner.run().await;
    let cleanup_result = runner.cleanup().await;
    run_result?;
    cleanup_result?;
    Ok(())
}

/// Worker process entry point.
pub async fn run(worker_id: Uuid, config: &PoolConfig) -> Result<(), PoolError> {
    let queue: Arc<dyn JobQueue> = Arc::new(SqliteJobQueue::connect(&config.queue_db).await?);
    let runners = RunnerRegistry::builtin();

    let state = Arc::new(WorkerState::new());
    state.set_running(true);

    let listener = tokio::spawn(control_listener(worker_id, state.clone()));
    tracing::debug!(worker_id = %worker_id, "Worker process started");

    while state.is_running() {
        match queue.claim_next_pending_job(worker_id).await? {
            Some(job) => {
                tracing::debug!(
                    worker_id = %worker_id,
                    job_id = %job.id,
                    job_type = %job.job_type,
                    "Job claimed"
                );
                state.set_current_job(Some(job.id));
                let result = execute_job(&runners, queue.clone(), &job).await;
                state.set_current_job(None);
                result?;
                tracing::debug!(worker_id = %worker_id, job_id = %job.id, "Job completed");
            }
            None => {
                // Queue miss: back off instead of hammering the gateway.
                tokio::time::sleep(config.claim_backoff).await;
            }
        }
    }

    tracing::debug!(worker_id = %worker_id, "Worker process shutting down");
    listener.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_clears_running_and_acks() {
        let state = WorkerState::new();
        state.set_running(true);

        let reply = handle_control_line("[\"stop\"]", &state);
        assert_eq!(reply, ControlReply::Stopped);
        assert!(!state.is_running());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let state = WorkerState::new();
        state.set_running(true);

        assert_eq!(handle_control_line("[\"stop\"]", &state), ControlReply::Stopped);
        // A second stop on an already-stopped worker still answers
        // deterministically.
        assert_eq!(handle_control_line("[\"stop\"]", &state), ControlReply::Stopped);
        assert!(!state.is_running());
    }

    #[test]
    fn test_status_reflects_state() {
        let state = WorkerState::new();
        state.set_running(true);
        let job = Uuid::new_v4();
        state.set_current_job(Some(job));

        let reply = handle_control_line("[\"status\"]", &state);
        assert_eq!(
            reply,
            ControlReply::Status {
                current_job: Some(job),
                running: true,
            }
        );

        state.set_current_job(None);
        state.set_running(false);
        let reply = handle_control_line("[\"status\"]", &state);
        assert_eq!(
            reply,
            ControlReply::Status {
                current_job: None,
                running: false,
            }
        );
    }

    #[test]
    fn test_malformed_messages() {
        let state = WorkerState::new();
        for line in ["", "not json", "[]", "{\"a\":1}", "[7]"] {
            assert_eq!(
                handle_control_line(line, &state),
                ControlReply::invalid_format(),
                "line {line:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_unknown_tag_echoed_negatively() {
        let state = WorkerState::new();
        let reply = handle_control_line("[\"reload\"]", &state);
        assert_eq!(
            reply,
            ControlReply::Unknown {
                tag: "reload".to_string()
            }
        );
    }
}
