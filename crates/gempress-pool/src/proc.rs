//! Process handle for worker subprocesses.
//!
//! Wraps a spawned child with the line-oriented control channel on its
//! stdin/stdout. The pool map owns exactly one handle per worker; shutdown
//! coordinators take the handle with them, so no two tasks ever touch the
//! same channel.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout};
use uuid::Uuid;

use crate::error::PoolError;
use crate::protocol::{ControlReply, ControlRequest};

/// Handle to a worker subprocess with its control channel.
pub struct WorkerProc {
    id: Uuid,
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl WorkerProc {
    /// Wrap a spawned child. The child must have piped stdin and stdout.
    pub fn from_child(id: Uuid, mut child: Child) -> Result<Self, PoolError> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PoolError::Ipc("worker stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PoolError::Ipc("worker stdout not captured".to_string()))?;

        Ok(Self {
            id,
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    /// Worker identity.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// OS process id, if the process has not been reaped yet.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Send a control request.
    pub async fn send(&mut self, request: &ControlRequest) -> Result<(), PoolError> {
        self.stdin.write_all(request.to_line().as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Receive the next reply. `None` means the worker closed its stdout.
    pub async fn recv(&mut self) -> Result<Option<ControlReply>, PoolError> {
        match self.stdout.next_line().await? {
            Some(line) => Ok(Some(ControlReply::from_line(&line)?)),
            None => Ok(None),
        }
    }

    /// Receive with a deadline; a timeout degrades to `None` rather than
    /// blocking the caller indefinitely.
    pub async fn recv_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<ControlReply>, PoolError> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(result) => result,
            Err(_) => Ok(None),
        }
    }

    /// Non-blocking liveness check.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait up to `timeout` for the process to exit. Returns whether it did.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.child.wait())
            .await
            .map(|status| status.is_ok())
            .unwrap_or(false)
    }

    /// Forcibly terminate the process and reap it.
    pub async fn kill(&mut self) -> Result<(), PoolError> {
        self.child.kill().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn piped(program: &str, args: &[&str]) -> WorkerProc {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true);
        let child = cmd.spawn().expect("failed to spawn test child");
        WorkerProc::from_child(Uuid::new_v4(), child).expect("failed to wrap test child")
    }

    #[tokio::test]
    async fn test_liveness_and_kill() {
        let mut proc = piped("sleep", &["60"]);
        assert!(proc.is_alive());

        proc.kill().await.expect("kill failed");
        assert!(!proc.is_alive());
    }

    #[tokio::test]
    async fn test_recv_timeout_on_silent_child() {
        // `sleep` never writes to stdout, so the receive must time out.
        let mut proc = piped("sleep", &["60"]);

        proc.send(&ControlRequest::Status).await.unwrap();
        let reply = proc
            .recv_timeout(Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(reply, None);

        proc.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_recv_rejects_non_protocol_output() {
        // `cat` echoes the request verbatim, which is not a valid reply.
        let mut proc = piped("cat", &[]);

        proc.send(&ControlRequest::Stop).await.unwrap();
        let result = proc.recv_timeout(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(PoolError::Protocol(_))));

        proc.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_recv_none_on_eof() {
        let mut proc = piped("true", &[]);

        // Once the child exits its stdout is closed.
        let reply = proc.recv_timeout(Duration::from_secs(5)).await.unwrap();
        assert_eq!(reply, None);
        assert!(!proc.is_alive());
    }
}
