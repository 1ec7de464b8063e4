//! Gempress Job Queue
//!
//! Persistent job queue shared by the pool supervisor and its worker
//! processes. The queue is the single source of mutual exclusion over jobs:
//! claiming a pending job is atomic, so at most one live worker ever holds
//! a claim on a given job.
//!
//! This crate provides:
//! - The job data model (`Job`, `JobState`, `QueueStatus`)
//! - The `JobQueue` gateway trait consumed by workers and the supervisor
//! - A SQLite-backed implementation usable across processes
//! - An in-memory implementation for tests and single-process tooling

pub mod error;
pub mod job;
pub mod memory;
pub mod queue;
pub mod sqlite;

pub use error::QueueError;
pub use job::{ClaimedJob, Job, JobState, QueueStatus};
pub use memory::MemoryJobQueue;
pub use queue::JobQueue;
pub use sqlite::SqliteJobQueue;
