//! In-memory job queue.
//!
//! Same claim semantics as the SQLite backend, but confined to one process.
//! Used by unit tests and by tooling that needs a throwaway queue.

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{ClaimedJob, Job, JobState, QueueStatus};
use crate::queue::JobQueue;

/// Mutex-guarded in-memory queue.
#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<Vec<Job>>,
}

impl MemoryJobQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job in a specific state, bypassing the normal lifecycle.
    ///
    /// Test helper for setting up claimed or finished jobs directly.
    pub fn insert_raw(&self, job: Job) {
        self.jobs.lock().expect("queue mutex poisoned").push(job);
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: serde_json::Value,
    ) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now().timestamp();

        self.jobs.lock().expect("queue mutex poisoned").push(Job {
            id,
            job_type: job_type.to_string(),
            payload,
            state: JobState::Pending,
            claimed_by: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        });

        Ok(id)
    }

    async fn claim_next_pending_job(
        &self,
        worker_id: Uuid,
    ) -> Result<Option<ClaimedJob>, QueueError> {
        let mut jobs = self.jobs.lock().expect("queue mutex poisoned");

        // Insertion order doubles as enqueue order.
        let Some(job) = jobs.iter_mut().find(|j| j.state == JobState::Pending) else {
            return Ok(None);
        };

        job.state = JobState::InProgress;
        job.claimed_by = Some(worker_id);
        job.updated_at = chrono::Utc::now().timestamp();

        Ok(Some(ClaimedJob {
            id: job.id,
            job_type: job.job_type.clone(),
        }))
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, QueueError> {
        let jobs = self.jobs.lock().expect("queue mutex poisoned");
        Ok(jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn get_job_claimed_by(&self, worker_id: Uuid) -> Result<Option<Job>, QueueError> {
        let jobs = self.jobs.lock().expect("queue mutex poisoned");
        Ok(jobs
            .iter()
            .find(|j| j.claimed_by == Some(worker_id) && j.state == JobState::InProgress)
            .cloned())
    }

    async fn release(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().expect("queue mutex poisoned");
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or(QueueError::NotFound(job_id))?;

        job.state = JobState::Pending;
        job.claimed_by = None;
        job.attempts += 1;
        job.updated_at = chrono::Utc::now().timestamp();
        Ok(())
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().expect("queue mutex poisoned");
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or(QueueError::NotFound(job_id))?;

        job.state = JobState::Done;
        job.claimed_by = None;
        job.updated_at = chrono::Utc::now().timestamp();
        Ok(())
    }

    async fn status(&self) -> Result<QueueStatus, QueueError> {
        let jobs = self.jobs.lock().expect("queue mutex poisoned");
        let pending = jobs.iter().filter(|j| j.state == JobState::Pending).count() as u64;
        let in_progress = jobs
            .iter()
            .filter(|j| j.state == JobState::InProgress)
            .count() as u64;

        Ok(QueueStatus::from_counts(pending, in_progress))
    }
}
