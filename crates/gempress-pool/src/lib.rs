//! Gempress Worker Pool
//!
//! A self-scaling pool of job-executing worker processes supervised by a
//! control loop. Workers are independent OS processes: each one runs a
//! claim-and-execute loop against the shared job queue while answering
//! supervisor control requests over its stdin/stdout channel.
//!
//! This crate provides:
//! - The pool supervisor: liveness reconciliation, autoscaling, shutdown
//! - The worker process entry point and its control-channel listener
//! - The newline-delimited JSON control protocol
//! - The runner registry and the gemtext conversion runner
//!
//! Crash recovery is deliberate by omission: a worker never catches runner
//! failures. The process dies, the supervisor notices on its next tick,
//! and the orphaned claim is retried through the job's runner.

pub mod config;
pub mod error;
pub mod proc;
pub mod protocol;
pub mod runner;
pub mod spawn;
pub mod supervisor;
pub mod worker;

pub use config::PoolConfig;
pub use error::PoolError;
pub use supervisor::{PoolState, Supervisor};
