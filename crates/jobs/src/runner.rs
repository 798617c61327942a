use crate::{BlocklistSyncJob, CacheMaintenanceJob, ConfigWatchJob, RateLimitSweepJob};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Keep a job's loop alive: respawn it if it exits by panicking, stop once
/// the shutdown token fires or the loop returns normally.
pub(crate) fn supervise<F>(name: &'static str, shutdown: CancellationToken, spawn_loop: F)
where
    F: Fn() -> JoinHandle<()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let finished = spawn_loop().await;
            match finished {
                Err(e) if e.is_panic() && !shutdown.is_cancelled() => {
                    error!(job = name, "Background job panicked; restarting");
                }
                _ => break,
            }
        }
    });
}

/// Central orchestrator for all background jobs.
///
/// Register jobs with the builder methods, then call `.start()` once. Each
/// job owns its interval loop and exits on the shared cancellation token.
pub struct JobRunner {
    blocklist_sync: Option<BlocklistSyncJob>,
    cache_maintenance: Option<CacheMaintenanceJob>,
    rate_limit_sweep: Option<RateLimitSweepJob>,
    config_watch: Option<ConfigWatchJob>,
}

impl JobRunner {
    pub fn new() -> Self {
        Self {
            blocklist_sync: None,
            cache_maintenance: None,
            rate_limit_sweep: None,
            config_watch: None,
        }
    }

    pub fn with_blocklist_sync(mut self, job: BlocklistSyncJob) -> Self {
        self.blocklist_sync = Some(job);
        self
    }

    pub fn with_cache_maintenance(mut self, job: CacheMaintenanceJob) -> Self {
        self.cache_maintenance = Some(job);
        self
    }

    pub fn with_rate_limit_sweep(mut self, job: RateLimitSweepJob) -> Self {
        self.rate_limit_sweep = Some(job);
        self
    }

    pub fn with_config_watch(mut self, job: ConfigWatchJob) -> Self {
        self.config_watch = Some(job);
        self
    }

    /// Start all registered background jobs.
    pub async fn start(self) {
        info!("Starting background jobs");

        if let Some(job) = self.blocklist_sync {
            Arc::new(job).start().await;
        }
        if let Some(job) = self.cache_maintenance {
            Arc::new(job).start().await;
        }
        if let Some(job) = self.rate_limit_sweep {
            Arc::new(job).start().await;
        }
        if let Some(job) = self.config_watch {
            Arc::new(job).start().await;
        }

        info!("All background jobs started");
    }
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}
