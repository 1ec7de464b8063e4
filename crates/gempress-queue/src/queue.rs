//! The job queue gateway trait.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{ClaimedJob, Job, QueueStatus};

/// Gateway to the shared job queue.
///
/// Claiming is the only mutual-exclusion primitive the pool relies on:
/// `claim_next_pending_job` must atomically move one pending job to
/// in-progress and attribute it to the calling worker. Implementations must
/// not lose or duplicate a claim across process crashes.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Insert a new pending job and return its id.
    async fn enqueue(
        &self,
        job_type: &str,
        payload: serde_json::Value,
    ) -> Result<Uuid, QueueError>;

    /// Atomically claim the oldest pending job for `worker_id`.
    ///
    /// Returns `None` on a queue miss (no pending jobs).
    async fn claim_next_pending_job(
        &self,
        worker_id: Uuid,
    ) -> Result<Option<ClaimedJob>, QueueError>;

    /// Fetch a job by id.
    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, QueueError>;

    /// Fetch the in-progress job claimed by `worker_id`, if any.
    async fn get_job_claimed_by(&self, worker_id: Uuid) -> Result<Option<Job>, QueueError>;

    /// Release a claim: the job goes back to pending and its attempt
    /// counter is incremented.
    async fn release(&self, job_id: Uuid) -> Result<(), QueueError>;

    /// Mark a job done and clear its claim.
    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError>;

    /// Aggregate queue statistics.
    async fn status(&self) -> Result<QueueStatus, QueueError>;
}
