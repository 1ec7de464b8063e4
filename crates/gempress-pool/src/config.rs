//! Pool configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Pool size floor; restored aggressively every tick.
    pub min_workers: usize,

    /// Pool size ceiling for scale-up.
    pub max_workers: usize,

    /// Delay between supervisor reconciliation ticks.
    pub tick_interval: Duration,

    /// Worker sleep after a queue miss.
    pub claim_backoff: Duration,

    /// Deadline for stop acknowledgements, exit waits and status replies.
    pub control_timeout: Duration,

    /// Path of the shared SQLite queue database.
    pub queue_db: PathBuf,

    /// Explicit worker executable; defaults to the current executable.
    /// Useful when the supervisor runs from a wrapper or a test harness.
    pub worker_bin: Option<PathBuf>,
}

impl PoolConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let min_workers: usize = std::env::var("GEMPRESS_MIN_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2);

        let max_workers: usize = std::env::var("GEMPRESS_MAX_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8);

        let tick_secs: u64 = std::env::var("GEMPRESS_TICK_INTERVAL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let backoff_ms: u64 = std::env::var("GEMPRESS_CLAIM_BACKOFF_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(500);

        let control_secs: u64 = std::env::var("GEMPRESS_CONTROL_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let queue_db = std::env::var("GEMPRESS_QUEUE_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("gempress-queue.db"));

        let worker_bin = std::env::var("GEMPRESS_WORKER_BIN").ok().map(PathBuf::from);

        if max_workers < min_workers {
            anyhow::bail!(
                "GEMPRESS_MAX_WORKERS ({max_workers}) must be >= GEMPRESS_MIN_WORKERS ({min_workers})"
            );
        }

        Ok(Self {
            min_workers,
            max_workers,
            tick_interval: Duration::from_secs(tick_secs),
            claim_backoff: Duration::from_millis(backoff_ms),
            control_timeout: Duration::from_secs(control_secs),
            queue_db,
            worker_bin,
        })
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: 8,
            tick_interval: Duration::from_secs(5),
            claim_backoff: Duration::from_millis(500),
            control_timeout: Duration::from_secs(5),
            queue_db: PathBuf::from("gempress-queue.db"),
            worker_bin: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.min_workers, 2);
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.claim_backoff, Duration::from_millis(500));
        assert_eq!(config.control_timeout, Duration::from_secs(5));
    }
}
