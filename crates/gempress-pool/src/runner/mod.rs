//! Job runner dispatch.
//!
//! Runners are resolved from a registry keyed by job type. The registry is
//! built once at process startup; nothing registers itself as a side
//! effect of being linked in.

mod gemtext;

pub use gemtext::{GemtextRunner, GemtextRunnerFactory};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use gempress_queue::JobQueue;

use crate::error::PoolError;

/// The lifecycle of one job execution.
///
/// `cleanup` always runs after `run`, whether `run` succeeded or not.
/// `retry` is invoked out-of-band by the supervisor when the worker that
/// claimed the job died; it must make the job claimable again.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Load job details and prepare resources.
    async fn setup(&mut self) -> Result<(), PoolError>;

    /// Execute the job to completion.
    async fn run(&mut self) -> Result<(), PoolError>;

    /// Tear down; runs regardless of `run`'s outcome.
    async fn cleanup(&mut self) -> Result<(), PoolError>;

    /// Recover an orphaned claim after a worker crash.
    async fn retry(&mut self) -> Result<(), PoolError>;
}

/// Produces a runner instance for one claimed job.
pub trait RunnerFactory: Send + Sync {
    /// The job type key this factory handles.
    fn job_type(&self) -> &'static str;

    /// Build a runner bound to a specific job.
    fn create(&self, job_id: Uuid, queue: Arc<dyn JobQueue>) -> Box<dyn JobRunner>;
}

/// Registry of runner factories, keyed by job type.
pub struct RunnerRegistry {
    runners: HashMap<String, Arc<dyn RunnerFactory>>,
}

impl RunnerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            runners: HashMap::new(),
        }
    }

    /// Registry with all built-in runners.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(GemtextRunnerFactory);
        registry
    }

    /// Register a factory under its job type.
    pub fn register<F: RunnerFactory + 'static>(&mut self, factory: F) {
        let job_type = factory.job_type().to_string();
        self.runners.insert(job_type, Arc::new(factory));
    }

    /// Resolve a factory by job type.
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn RunnerFactory>> {
        self.runners.get(job_type).cloned()
    }

    /// Check whether a job type is registered.
    pub fn has(&self, job_type: &str) -> bool {
        self.runners.contains_key(job_type)
    }

    /// List all registered job types.
    pub fn list(&self) -> Vec<&str> {
        self.runners.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerRegistry")
            .field("runners", &self.runners.keys().collect::<Vec<_>>())
            .finish()
    }
}
