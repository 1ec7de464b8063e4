//! Job data model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to be claimed by a worker.
    Pending,
    /// Claimed by exactly one worker and executing.
    InProgress,
    /// Finished successfully.
    Done,
}

impl JobState {
    /// Stable string form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::InProgress => "in_progress",
            JobState::Done => "done",
        }
    }

    /// Parse the storage string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobState::Pending),
            "in_progress" => Some(JobState::InProgress),
            "done" => Some(JobState::Done),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job stored in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Job identifier.
    pub id: Uuid,

    /// Job type key used for runner dispatch.
    pub job_type: String,

    /// Runner-specific payload.
    pub payload: serde_json::Value,

    /// Current lifecycle state.
    pub state: JobState,

    /// Worker currently holding the claim, if any.
    pub claimed_by: Option<Uuid>,

    /// Number of times the job has been released back to pending.
    pub attempts: i64,

    /// Creation time (unix seconds).
    pub created_at: i64,

    /// Last update time (unix seconds).
    pub updated_at: i64,
}

/// The result of a successful claim: just enough to dispatch a runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedJob {
    /// Job identifier.
    pub id: Uuid,

    /// Job type key.
    pub job_type: String,
}

/// Aggregate queue statistics used by the autoscaling policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueStatus {
    /// Jobs waiting to be claimed.
    pub pending: u64,

    /// Jobs currently claimed by a worker.
    pub in_progress: u64,

    /// `pending / (pending + in_progress)`, or 0.0 for an empty queue.
    pub pending_ratio: f64,
}

impl QueueStatus {
    /// Build a status from raw counts, computing the pending ratio.
    pub fn from_counts(pending: u64, in_progress: u64) -> Self {
        let total = pending + in_progress;
        let pending_ratio = if total == 0 {
            0.0
        } else {
            pending as f64 / total as f64
        };
        Self {
            pending,
            in_progress,
            pending_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for state in [JobState::Pending, JobState::InProgress, JobState::Done] {
            assert_eq!(JobState::parse(state.as_str()), Some(state));
        }
        assert_eq!(JobState::parse("bogus"), None);
    }

    #[test]
    fn test_state_serde_snake_case() {
        let json = serde_json::to_string(&JobState::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_status_ratio() {
        let status = QueueStatus::from_counts(3, 1);
        assert_eq!(status.pending_ratio, 0.75);

        let empty = QueueStatus::from_counts(0, 0);
        assert_eq!(empty.pending_ratio, 0.0);
    }
}
