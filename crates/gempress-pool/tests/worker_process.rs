//! End-to-end tests driving real worker processes against a SQLite queue.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use gempress_pool::runner::RunnerRegistry;
use gempress_pool::{PoolConfig, Supervisor};
use gempress_queue::{JobQueue, JobState, SqliteJobQueue};

fn worker_command(db: &Path, worker_id: Uuid) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_gempress-pool"));
    cmd.arg("--internal-worker")
        .arg("--worker-id")
        .arg(worker_id.to_string())
        .env("GEMPRESS_QUEUE_DB", db)
        .env("GEMPRESS_CLAIM_BACKOFF_MS", "100")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    cmd
}

async fn send_line(child: &mut Child, line: &str) {
    let stdin = child.stdin.as_mut().expect("worker stdin");
    stdin.write_all(line.as_bytes()).await.unwrap();
    stdin.write_all(b"\n").await.unwrap();
    stdin.flush().await.unwrap();
}

async fn roundtrip(
    child: &mut Child,
    lines: &mut Lines<BufReader<ChildStdout>>,
    request: &str,
) -> String {
    send_line(child, request).await;
    tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("timed out waiting for control reply")
        .unwrap()
        .expect("worker closed its control channel")
}

async fn wait_for_job_done(queue: &SqliteJobQueue, job_id: Uuid) {
    for _ in 0..150 {
        if let Some(job) = queue.get_job(job_id).await.unwrap() {
            if job.state == JobState::Done {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("timed out waiting for job {job_id} to complete");
}

#[tokio::test]
async fn worker_converts_enqueued_document() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("queue.db");
    let input = dir.path().join("post.md");
    let output = dir.path().join("post.gmi");
    tokio::fs::write(&input, "# Hello\n- [Docs](https://example.org)\n")
        .await
        .unwrap();

    let queue = SqliteJobQueue::connect(&db).await.unwrap();
    let job_id = queue
        .enqueue(
            "gemtext",
            serde_json::json!({ "input": &input, "output": &output }),
        )
        .await
        .unwrap();

    let mut child = worker_command(&db, Uuid::new_v4()).spawn().unwrap();

    wait_for_job_done(&queue, job_id).await;

    let rendered = tokio::fs::read_to_string(&output).await.unwrap();
    assert_eq!(rendered, "# Hello\n=> https://example.org Docs\n");

    let stdout = child.stdout.take().unwrap();
    let mut lines = BufReader::new(stdout).lines();

    // Idle worker answers a status request.
    let reply = roundtrip(&mut child, &mut lines, "[\"status\"]").await;
    let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(value[0], "status");
    assert_eq!(value[1], true);
    assert_eq!(value[2], serde_json::Value::Null);
    assert_eq!(value[3], true);

    // Stop is acknowledged and the process exits cleanly.
    let reply = roundtrip(&mut child, &mut lines, "[\"stop\"]").await;
    assert_eq!(reply, "[\"stop\",true]");

    let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn worker_control_channel_rejects_bad_messages() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("queue.db");

    let mut child = worker_command(&db, Uuid::new_v4()).spawn().unwrap();
    let stdout = child.stdout.take().unwrap();
    let mut lines = BufReader::new(stdout).lines();

    assert_eq!(
        roundtrip(&mut child, &mut lines, "this is not json").await,
        "[\"error\",\"Invalid message format\"]"
    );
    assert_eq!(
        roundtrip(&mut child, &mut lines, "[]").await,
        "[\"error\",\"Invalid message format\"]"
    );
    assert_eq!(
        roundtrip(&mut child, &mut lines, "[\"reload\"]").await,
        "[\"reload\",false]"
    );
    assert_eq!(
        roundtrip(&mut child, &mut lines, "[\"stop\"]").await,
        "[\"stop\",true]"
    );

    let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn worker_dies_on_unknown_job_type() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("queue.db");

    let queue = SqliteJobQueue::connect(&db).await.unwrap();
    let job_id = queue
        .enqueue("mystery", serde_json::json!({}))
        .await
        .unwrap();

    let worker_id = Uuid::new_v4();
    let mut child = worker_command(&db, worker_id).spawn().unwrap();

    // The unregistered job type is fatal to the worker.
    let status = tokio::time::timeout(Duration::from_secs(15), child.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(!status.success());

    // The claim is orphaned, attributed to the dead worker; recovering it
    // is the supervisor's reconciliation job.
    let job = queue.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::InProgress);
    assert_eq!(job.claimed_by, Some(worker_id));
}

#[tokio::test]
async fn supervisor_recovers_job_orphaned_by_worker_crash() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("queue.db");

    let queue = Arc::new(SqliteJobQueue::connect(&db).await.unwrap());
    // The input file does not exist, so every worker that claims this job
    // dies mid-execution and orphans the claim.
    let job_id = queue
        .enqueue(
            "gemtext",
            serde_json::json!({
                "input": dir.path().join("missing.md"),
                "output": dir.path().join("missing.gmi"),
            }),
        )
        .await
        .unwrap();

    let config = PoolConfig {
        min_workers: 1,
        max_workers: 2,
        tick_interval: Duration::from_millis(200),
        claim_backoff: Duration::from_millis(100),
        control_timeout: Duration::from_secs(3),
        queue_db: db.clone(),
        worker_bin: Some(env!("CARGO_BIN_EXE_gempress-pool").into()),
    };

    let dyn_queue: Arc<dyn JobQueue> = queue.clone();
    let mut supervisor = Supervisor::new(config, dyn_queue, RunnerRegistry::builtin());

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let pool = tokio::spawn(async move {
        supervisor.run(token).await.unwrap();
        supervisor
    });

    // Reconciliation must notice the dead worker and release the claim.
    let mut retried = false;
    for _ in 0..150 {
        let job = queue.get_job(job_id).await.unwrap().unwrap();
        if job.attempts >= 1 {
            retried = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(retried, "orphaned claim was never retried");

    shutdown.cancel();
    let supervisor = tokio::time::timeout(Duration::from_secs(20), pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(supervisor.worker_count(), 0);
}

#[tokio::test]
async fn supervisor_runs_pool_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("queue.db");
    let input = dir.path().join("page.md");
    let output = dir.path().join("page.gmi");
    tokio::fs::write(&input, "plain text\n").await.unwrap();

    let queue = Arc::new(SqliteJobQueue::connect(&db).await.unwrap());
    let job_id = queue
        .enqueue(
            "gemtext",
            serde_json::json!({ "input": &input, "output": &output }),
        )
        .await
        .unwrap();

    let config = PoolConfig {
        min_workers: 1,
        max_workers: 2,
        tick_interval: Duration::from_millis(200),
        claim_backoff: Duration::from_millis(100),
        control_timeout: Duration::from_secs(3),
        queue_db: db.clone(),
        worker_bin: Some(env!("CARGO_BIN_EXE_gempress-pool").into()),
    };

    let dyn_queue: Arc<dyn JobQueue> = queue.clone();
    let mut supervisor = Supervisor::new(config, dyn_queue, RunnerRegistry::builtin());

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let pool = tokio::spawn(async move {
        supervisor.run(token).await.unwrap();
        supervisor
    });

    wait_for_job_done(&queue, job_id).await;

    assert_eq!(
        tokio::fs::read_to_string(&output).await.unwrap(),
        "plain text\n"
    );

    shutdown.cancel();
    let supervisor = tokio::time::timeout(Duration::from_secs(20), pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(supervisor.worker_count(), 0);
}
