//! SQLite-backed job queue.
//!
//! The queue database is a single file shared by the supervisor and every
//! worker process. WAL journal mode plus a busy timeout make the claim
//! statement safe under cross-process contention; the claim itself is one
//! `UPDATE ... RETURNING`, so it either attributes a job to exactly one
//! worker or touches nothing.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{ClaimedJob, Job, JobState, QueueStatus};
use crate::queue::JobQueue;

/// How long SQLite retries on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite implementation of the queue gateway.
#[derive(Clone)]
pub struct SqliteJobQueue {
    pool: SqlitePool,
}

impl SqliteJobQueue {
    /// Open (creating if missing) the queue database at `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let queue = Self { pool };
        queue.migrate().await?;
        Ok(queue)
    }

    /// Idempotent schema setup, run by every process on connect.
    async fn migrate(&self) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id         TEXT PRIMARY KEY,
                job_type   TEXT NOT NULL,
                payload    TEXT NOT NULL DEFAULT '{}',
                state      TEXT NOT NULL DEFAULT 'pending',
                claimed_by TEXT,
                attempts   INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state, created_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_claimed_by ON jobs(claimed_by)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn row_to_job(row: &SqliteRow) -> Result<Job, QueueError> {
        let id: String = row.try_get("id")?;
        let id = Uuid::parse_str(&id)
            .map_err(|e| QueueError::InvalidRecord(format!("bad job id {id}: {e}")))?;

        let claimed_by: Option<String> = row.try_get("claimed_by")?;
        let claimed_by = claimed_by
            .map(|s| {
                Uuid::parse_str(&s)
                    .map_err(|e| QueueError::InvalidRecord(format!("bad worker id {s}: {e}")))
            })
            .transpose()?;

        let state: String = row.try_get("state")?;
        let state = JobState::parse(&state)
            .ok_or_else(|| QueueError::InvalidRecord(format!("unknown state {state}")))?;

        let payload: String = row.try_get("payload")?;
        let payload = serde_json::from_str(&payload)
            .map_err(|e| QueueError::InvalidRecord(format!("bad payload: {e}")))?;

        Ok(Job {
            id,
            job_type: row.try_get("job_type")?,
            payload,
            state,
            claimed_by,
            attempts: row.try_get("attempts")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: serde_json::Value,
    ) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO jobs (id, job_type, payload, state, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'pending', ?4, ?4)",
        )
        .bind(id.to_string())
        .bind(job_type)
        .bind(payload.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::debug!(job_id = %id, job_type = %job_type, "Job enqueued");
        Ok(id)
    }

    async fn claim_next_pending_job(
        &self,
        worker_id: Uuid,
    ) -> Result<Option<ClaimedJob>, QueueError> {
        let now = chrono::Utc::now().timestamp();

        let row = sqlx::query(
            "UPDATE jobs
                SET state = 'in_progress', claimed_by = ?1, updated_at = ?2
              WHERE state = 'pending'
                AND id = (
                    SELECT id FROM jobs
                     WHERE state = 'pending'
                     ORDER BY created_at, id
                     LIMIT 1
              )
              RETURNING id, job_type",
        )
        .bind(worker_id.to_string())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row.try_get("id")?;
        let id = Uuid::parse_str(&id)
            .map_err(|e| QueueError::InvalidRecord(format!("bad job id {id}: {e}")))?;

        Ok(Some(ClaimedJob {
            id,
            job_type: row.try_get("job_type")?,
        }))
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, QueueError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(job_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::row_to_job(&r)).transpose()
    }

    async fn get_job_claimed_by(&self, worker_id: Uuid) -> Result<Option<Job>, QueueError> {
        let row = sqlx::query(
            "SELECT * FROM jobs WHERE claimed_by = ?1 AND state = 'in_progress' LIMIT 1",
        )
        .bind(worker_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_job(&r)).transpose()
    }

    async fn release(&self, job_id: Uuid) -> Result<(), QueueError> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            "UPDATE jobs
                SET state = 'pending', claimed_by = NULL,
                    attempts = attempts + 1, updated_at = ?2
              WHERE id = ?1",
        )
        .bind(job_id.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(job_id));
        }

        tracing::debug!(job_id = %job_id, "Job released back to pending");
        Ok(())
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            "UPDATE jobs
                SET state = 'done', claimed_by = NULL, updated_at = ?2
              WHERE id = ?1",
        )
        .bind(job_id.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(job_id));
        }

        Ok(())
    }

    async fn status(&self) -> Result<QueueStatus, QueueError> {
        let row = sqlx::query(
            "SELECT
                 COUNT(*) FILTER (WHERE state = 'pending') AS pending,
                 COUNT(*) FILTER (WHERE state = 'in_progress') AS in_progress
             FROM jobs",
        )
        .fetch_one(&self.pool)
        .await?;

        let pending: i64 = row.try_get("pending")?;
        let in_progress: i64 = row.try_get("in_progress")?;

        Ok(QueueStatus::from_counts(pending as u64, in_progress as u64))
    }
}
