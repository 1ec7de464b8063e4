//! Gempress command line tool.
//!
//! Thin operator surface over the shared job queue: enqueue conversion
//! jobs for the worker pool, inspect queue statistics, or convert a single
//! document in-process without going through the queue at all.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use gempress_format::{format_document, FormatterRegistry};
use gempress_queue::{JobQueue, SqliteJobQueue};

#[derive(Parser)]
#[command(name = "gempress")]
#[command(version, about = "Gempress Command Line Tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Queue database path (overrides GEMPRESS_QUEUE_DB)
    #[arg(long)]
    queue_db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a document conversion job for the worker pool
    Enqueue {
        /// Source document (.md or .mdx)
        #[arg(short, long)]
        input: PathBuf,

        /// Destination gemtext file
        #[arg(short, long)]
        output: PathBuf,

        /// Job type key used for runner dispatch
        #[arg(long, default_value = "gemtext")]
        job_type: String,
    },

    /// Show queue statistics
    Status,

    /// Convert one document in-process, bypassing the queue
    Convert {
        /// Source document (.md or .mdx)
        input: PathBuf,

        /// Destination gemtext file
        output: PathBuf,
    },
}

impl Cli {
    fn queue_db(&self) -> PathBuf {
        self.queue_db
            .clone()
            .or_else(|| std::env::var("GEMPRESS_QUEUE_DB").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("gempress-queue.db"))
    }
}

async fn convert_local(input: &Path, output: &Path) -> Result<()> {
    let source = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))?;

    let extension = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "md".to_string());

    let registry = FormatterRegistry::builtin();
    let rendered = format_document(&source, &registry.for_extension(&extension));

    tokio::fs::write(output, rendered)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("{} -> {}", input.display(), output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Enqueue {
            input,
            output,
            job_type,
        } => {
            let queue = SqliteJobQueue::connect(cli.queue_db()).await?;
            let job_id = queue
                .enqueue(
                    job_type,
                    serde_json::json!({ "input": input, "output": output }),
                )
                .await?;
            println!("{job_id}");
        }

        Commands::Status => {
            let queue = SqliteJobQueue::connect(cli.queue_db()).await?;
            let status = queue.status().await?;
            println!("pending:       {}", status.pending);
            println!("in progress:   {}", status.in_progress);
            println!("pending ratio: {:.2}", status.pending_ratio);
        }

        Commands::Convert { input, output } => {
            convert_local(input, output).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_convert_local() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("note.md");
        let output = dir.path().join("note.gmi");
        tokio::fs::write(&input, "- [Home](gemini://example.org)\n")
            .await
            .unwrap();

        convert_local(&input, &output).await.unwrap();

        let rendered = tokio::fs::read_to_string(&output).await.unwrap();
        assert_eq!(rendered, "=> gemini://example.org Home\n");
    }

    #[tokio::test]
    async fn test_convert_local_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let result = convert_local(&dir.path().join("absent.md"), &dir.path().join("o.gmi")).await;
        assert!(result.is_err());
    }
}
