use glory_hole_application::ports::CachePort;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Minute-tick cache sweep.
///
/// Each tick walks the shards and drops expired entries; the per-shard
/// write lock is held only for the length of one shard's sweep.
pub struct CacheMaintenanceJob {
    cache: Arc<dyn CachePort>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl CacheMaintenanceJob {
    pub fn new(cache: Arc<dyn CachePort>) -> Self {
        Self {
            cache,
            interval: Duration::from_secs(60),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub async fn start(self: Arc<Self>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting cache maintenance job"
        );
        crate::runner::supervise("cache_maintenance", self.shutdown.clone(), move || {
            let job = Arc::clone(&self);
            tokio::spawn(job.run())
        });
    }

    async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("CacheMaintenanceJob: shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let removed = self.cache.purge_expired();
                    if removed > 0 {
                        debug!(removed, "CacheMaintenanceJob: swept expired entries");
                    }
                }
            }
        }
    }
}
