//! Queue error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while talking to the job queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Underlying database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The referenced job does not exist.
    #[error("job {0} not found")]
    NotFound(Uuid),

    /// A stored row could not be decoded into a job.
    #[error("invalid job record: {0}")]
    InvalidRecord(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let id = Uuid::nil();
        let err = QueueError::NotFound(id);
        assert_eq!(
            err.to_string(),
            "job 00000000-0000-0000-0000-000000000000 not found"
        );
    }
}
