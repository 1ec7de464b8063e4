//! Pool error types.

use thiserror::Error;
use uuid::Uuid;

use gempress_queue::QueueError;

/// Errors raised by the worker pool and its workers.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No runner is registered for a claimed job's type. Fatal to the
    /// worker that claimed it; the claim is recovered like any crash.
    #[error("no runner registered for job type {job_type} (job id: {job_id})")]
    UnknownJobType { job_type: String, job_id: Uuid },

    /// A worker neither acknowledged a stop nor yielded to a forced kill.
    #[error("worker {worker_id} failed to shut down cleanly: {reason}")]
    WorkerShutdown { worker_id: Uuid, reason: String },

    /// A control-channel line could not be decoded.
    #[error("invalid control message: {0}")]
    Protocol(String),

    /// Worker process plumbing failure (lost pipe, missing handle).
    #[error("worker ipc error: {0}")]
    Ipc(String),

    /// A job payload did not match what its runner expects.
    #[error("invalid job payload: {0}")]
    Payload(String),

    /// Queue gateway error.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_job_type_display() {
        let err = PoolError::UnknownJobType {
            job_type: "mystery".to_string(),
            job_id: Uuid::nil(),
        };
        assert!(err.to_string().contains("mystery"));
        assert!(err.to_string().starts_with("no runner registered"));
    }
}
