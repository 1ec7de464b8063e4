//! Pool supervisor: liveness reconciliation, autoscaling and shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use gempress_queue::JobQueue;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::proc::WorkerProc;
use crate::protocol::{ControlReply, ControlRequest, WorkerStatus};
use crate::runner::RunnerRegistry;
use crate::spawn::spawn_worker;

/// Supervisor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Filling the pool to its minimum size.
    Starting,
    /// Ticking: reconcile dead workers, rebalance, sleep.
    Running,
    /// Fanning out per-worker stop coordinators.
    ShuttingDown,
    /// Terminal.
    Stopped,
}

/// Autoscaling decision for one tick, taken after the minimum fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScaleAction {
    Up,
    Down,
    Hold,
}

/// The scale-up and scale-down thresholds are disjoint by construction
/// (0.25/0.8 versus 0.01/0.5), so at most one side fires per tick.
pub(crate) fn scale_action(
    pending_ratio: f64,
    load_ratio: f64,
    size: usize,
    min: usize,
    max: usize,
) -> ScaleAction {
    if pending_ratio > 0.25 && load_ratio >= 0.8 && size < max {
        return ScaleAction::Up;
    }
    if pending_ratio < 0.01 && load_ratio <= 0.5 && size > min {
        return ScaleAction::Down;
    }
    ScaleAction::Hold
}

/// Owns the worker pool and its control loop.
///
/// The worker map is mutated only by this loop; shutdown coordinators take
/// their handles out of the map before running, so concurrent coordinators
/// never share an entry.
pub struct Supervisor {
    id: Uuid,
    config: PoolConfig,
    queue: Arc<dyn JobQueue>,
    runners: RunnerRegistry,
    workers: HashMap<Uuid, WorkerProc>,
    state: PoolState,
}

impl Supervisor {
    /// Create a supervisor over `queue` dispatching through `runners`.
    pub fn new(config: PoolConfig, queue: Arc<dyn JobQueue>, runners: RunnerRegistry) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            queue,
            runners,
            workers: HashMap::new(),
            state: PoolState::Starting,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PoolState {
        self.state
    }

    /// Current pool size.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Control loop: runs until `shutdown` is cancelled, then drains the
    /// pool through per-worker coordinators.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), PoolError> {
        tracing::info!(
            pool_id = %self.id,
            min_workers = self.config.min_workers,
            "Bringing up minimal worker pool"
        );
        while self.workers.len() < self.config.min_workers && !shutdown.is_cancelled() {
            self.spawn_worker()?;
        }
        self.state = PoolState::Running;

        while !shutdown.is_cancelled() {
            if let Err(e) = self.clean_up_dead_workers().await {
                self.state = PoolState::Stopped;
                return Err(e);
            }
            if let Err(e) = self.balance_workers().await {
                self.state = PoolState::Stopped;
                return Err(e);
            }

            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(self.config.tick_interval) => {}
            }
        }

        self.state = PoolState::ShuttingDown;
        self.shutdown_pool().await;
        self.state = PoolState::Stopped;
        Ok(())
    }

    /// Spawn a worker and register it in the pool.
    fn spawn_worker(&mut self) -> Result<Uuid, PoolError> {
        let worker_id = Uuid::new_v4();
        let proc = spawn_worker(&self.config, worker_id)?;
        tracing::info!(worker_id = %worker_id, pid = ?proc.pid(), "Spawned worker");
        self.workers.insert(worker_id, proc);
        Ok(worker_id)
    }

    /// Remove a worker from the pool and stop it inline.
    async fn stop_worker_by_id(&mut self, worker_id: Uuid) -> Result<(), PoolError> {
        let Some(proc) = self.workers.remove(&worker_id) else {
            return Ok(());
        };
        Self::stop_worker(proc, self.config.control_timeout).await
    }

    /// Graceful-stop coordinator for one worker.
    ///
    /// Sends `stop` and waits for the acknowledgement, then for process
    /// exit, each bounded by `timeout`. Anything short of a clean exit
    /// escalates to a forced kill; a kill that itself fails means OS-level
    /// process control is broken and surfaces as `WorkerShutdown`.
    async fn stop_worker(mut proc: WorkerProc, timeout: Duration) -> Result<(), PoolError> {
        let worker_id = proc.id();

        // A dead pipe just means the worker is already gone; the kill
        // below reaps it either way.
        let _ = proc.send(&ControlRequest::Stop).await;

        if let Ok(Some(ControlReply::Stopped)) = proc.recv_timeout(timeout).await {
            if proc.wait_timeout(timeout).await {
                tracing::debug!(worker_id = %worker_id, "Worker stopped cleanly");
                return Ok(());
            }
        }

        if !proc.is_alive() {
            // Already exited; nothing left to kill.
            return Ok(());
        }

        tracing::warn!(worker_id = %worker_id, "Worker did not stop gracefully, killing");
        proc.kill().await.map_err(|e| PoolError::WorkerShutdown {
            worker_id,
            reason: format!("could not kill process: {e}"),
        })
    }

    /// Remove dead workers and retry any job they died holding.
    ///
    /// This is the sole job-failure recovery path: a crashed worker leaves
    /// its claim orphaned, and the claim's runner is asked to `retry` it
    /// exactly once here.
    async fn clean_up_dead_workers(&mut self) -> Result<(), PoolError> {
        let dead: Vec<Uuid> = self
            .workers
            .iter_mut()
            .filter_map(|(id, proc)| if proc.is_alive() { None } else { Some(*id) })
            .collect();

        for worker_id in dead {
            tracing::warn!(worker_id = %worker_id, "Found dead worker process, removing from pool");
            self.workers.remove(&worker_id);

            let Some(job) = self.queue.get_job_claimed_by(worker_id).await? else {
                continue;
            };

            tracing::warn!(
                worker_id = %worker_id,
                job_id = %job.id,
                "Dead worker had claimed a job, retrying"
            );
            let factory =
                self.runners
                    .get(&job.job_type)
                    .ok_or_else(|| PoolError::UnknownJobType {
                        job_type: job.job_type.clone(),
                        job_id: job.id,
                    })?;
            let mut runner = factory.create(job.id, self.queue.clone());
            runner.retry().await?;
        }

        Ok(())
    }

    /// Autoscaling pass, evaluated once per tick.
    async fn balance_workers(&mut self) -> Result<(), PoolError> {
        let status = self.queue.status().await?;
        let mut total = self.workers.len();

        // Restore the minimum before anything else; this also keeps the
        // load-ratio denominator non-zero.
        if total < self.config.min_workers {
            tracing::warn!(
                current = total,
                minimum = self.config.min_workers,
                "Worker pool below minimum"
            );
            for _ in total..self.config.min_workers {
                self.spawn_worker()?;
            }
            total = self.config.min_workers;
        }
        if total == 0 {
            return Ok(());
        }

        let load_ratio = status.in_progress as f64 / total as f64;

        match scale_action(
            status.pending_ratio,
            load_ratio,
            total,
            self.config.min_workers,
            self.config.max_workers,
        ) {
            ScaleAction::Up => {
                tracing::info!(
                    pending_ratio = status.pending_ratio,
                    load_ratio,
                    "Worker pool overloaded, spawning worker"
                );
                self.spawn_worker()?;
            }
            ScaleAction::Down => {
                tracing::info!(
                    pending_ratio = status.pending_ratio,
                    load_ratio,
                    "Worker pool underloaded, stopping a worker"
                );
                // Victim selection is arbitrary: whichever entry the map
                // yields first, not the most idle worker.
                if let Some(worker_id) = self.workers.keys().next().copied() {
                    self.stop_worker_by_id(worker_id).await?;
                }
            }
            ScaleAction::Hold => {}
        }

        Ok(())
    }

    /// Query one worker's status over its channel.
    ///
    /// Degrades to the `NoResponse` sentinel on timeout or a broken
    /// channel; never blocks past the control timeout.
    pub async fn get_worker_status(&mut self, worker_id: Uuid) -> Result<WorkerStatus, PoolError> {
        let proc = self
            .workers
            .get_mut(&worker_id)
            .ok_or_else(|| PoolError::Ipc(format!("worker {worker_id} not in pool")))?;

        if proc.send(&ControlRequest::Status).await.is_err() {
            return Ok(WorkerStatus::NoResponse);
        }

        match proc.recv_timeout(self.config.control_timeout).await {
            Ok(Some(ControlReply::Status {
                current_job,
                running,
            })) => Ok(WorkerStatus::Responded {
                current_job,
                running,
            }),
            _ => Ok(WorkerStatus::NoResponse),
        }
    }

    /// Fan out one stop coordinator per worker so a hung worker cannot
    /// delay the others, then observe their completion.
    async fn shutdown_pool(&mut self) {
        tracing::info!(
            pool_id = %self.id,
            workers = self.workers.len(),
            "Cleaning up worker pool"
        );

        let timeout = self.config.control_timeout;
        let mut coordinators = JoinSet::new();
        for (worker_id, proc) in self.workers.drain() {
            coordinators.spawn(async move { (worker_id, Self::stop_worker(proc, timeout).await) });
        }

        while let Some(result) = coordinators.join_next().await {
            match result {
                Ok((worker_id, Ok(()))) => {
                    tracing::debug!(worker_id = %worker_id, "Worker shutdown complete");
                }
                Ok((worker_id, Err(e))) => {
                    tracing::error!(worker_id = %worker_id, error = %e, "Worker shutdown failed");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Shutdown coordinator panicked");
                }
            }
        }
    }
}
