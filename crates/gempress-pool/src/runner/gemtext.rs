//! Markdown/MDX to gemtext conversion runner.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use gempress_format::{format_document, FormatterRegistry};
use gempress_queue::JobQueue;

use crate::error::PoolError;
use crate::runner::{JobRunner, RunnerFactory};

/// Payload carried by a `gemtext` job.
#[derive(Debug, Clone, Deserialize)]
struct GemtextJobSpec {
    /// Source document path.
    input: PathBuf,

    /// Destination gemtext path.
    output: PathBuf,

    /// Source flavor; inferred from the input extension when omitted.
    #[serde(default)]
    extension: Option<String>,
}

impl GemtextJobSpec {
    fn extension(&self) -> String {
        self.extension.clone().unwrap_or_else(|| {
            self.input
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| "md".to_string())
        })
    }
}

/// Factory for [`GemtextRunner`].
pub struct GemtextRunnerFactory;

impl RunnerFactory for GemtextRunnerFactory {
    fn job_type(&self) -> &'static str {
        "gemtext"
    }

    fn create(&self, job_id: Uuid, queue: Arc<dyn JobQueue>) -> Box<dyn JobRunner> {
        Box::new(GemtextRunner::new(job_id, queue))
    }
}

/// Converts one source document into gemtext and completes the job.
pub struct GemtextRunner {
    job_id: Uuid,
    queue: Arc<dyn JobQueue>,
    spec: Option<GemtextJobSpec>,
}

impl GemtextRunner {
    /// Create a runner bound to `job_id`.
    pub fn new(job_id: Uuid, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            job_id,
            queue,
            spec: None,
        }
    }
}

#[async_trait]
impl JobRunner for GemtextRunner {
    async fn setup(&mut self) -> Result<(), PoolError> {
        let job = self
            .queue
            .get_job(self.job_id)
            .await?
            .ok_or_else(|| PoolError::Payload(format!("job {} not found", self.job_id)))?;

        let spec: GemtextJobSpec = serde_json::from_value(job.payload)
            .map_err(|e| PoolError::Payload(e.to_string()))?;
        self.spec = Some(spec);
        Ok(())
    }

    async fn run(&mut self) -> Result<(), PoolError> {
        let spec = self
            .spec
            .as_ref()
            .ok_or_else(|| PoolError::Payload("runner used before setup".to_string()))?;

        let source = tokio::fs::read_to_string(&spec.input).await?;

        let registry = FormatterRegistry::builtin();
        let chain = registry.for_extension(&spec.extension());
        let rendered = format_document(&source, &chain);

        if let Some(parent) = spec.output.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&spec.output, rendered).await?;

        self.queue.complete(self.job_id).await?;

        tracing::info!(
            job_id = %self.job_id,
            input = %spec.input.display(),
            output = %spec.output.display(),
            "Document converted"
        );
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), PoolError> {
        tracing::debug!(job_id = %self.job_id, "Conversion runner cleaned up");
        Ok(())
    }

    async fn retry(&mut self) -> Result<(), PoolError> {
        self.queue.release(self.job_id).await?;
        tracing::info!(job_id = %self.job_id, "Job released for retry");
        Ok(())
    }
}
