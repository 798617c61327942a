use glory_hole_application::ports::BlocklistPort;
use glory_hole_application::ReadinessState;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Periodic blocklist refresh.
///
/// The first refresh runs immediately (it gates the readiness endpoint);
/// the interval ticks after that only when auto-update is enabled. A
/// panicking loop is respawned by the owner task.
pub struct BlocklistSyncJob {
    blocklist: Arc<dyn BlocklistPort>,
    readiness: Arc<ReadinessState>,
    interval_secs: u64,
    auto_update: bool,
    shutdown: CancellationToken,
}

impl BlocklistSyncJob {
    pub fn new(blocklist: Arc<dyn BlocklistPort>, readiness: Arc<ReadinessState>) -> Self {
        Self {
            blocklist,
            readiness,
            interval_secs: 86_400,
            auto_update: true,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_interval(mut self, interval_secs: u64) -> Self {
        self.interval_secs = interval_secs.max(60);
        self
    }

    pub fn with_auto_update(mut self, auto_update: bool) -> Self {
        self.auto_update = auto_update;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub async fn start(self: Arc<Self>) {
        info!(
            interval_secs = self.interval_secs,
            auto_update = self.auto_update,
            "Starting blocklist sync job"
        );
        crate::runner::supervise("blocklist_sync", self.shutdown.clone(), move || {
            let job = Arc::clone(&self);
            tokio::spawn(job.run())
        });
    }

    async fn run(self: Arc<Self>) {
        // Initial load: queries are served with an empty snapshot until
        // this finishes, but readiness flips regardless of the outcome
        // (all-sources-failed still counts as a completed attempt).
        if !self.readiness.blocklist_loaded() {
            match self.blocklist.refresh().await {
                Ok(()) => info!("Initial blocklist load completed"),
                Err(e) => error!(error = %e, "Initial blocklist load failed"),
            }
            self.readiness.mark_blocklist_loaded();
        }

        if !self.auto_update {
            return;
        }

        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("BlocklistSyncJob: shutting down");
                    break;
                }
                _ = interval.tick() => {
                    info!("BlocklistSyncJob: refreshing sources");
                    match self.blocklist.refresh().await {
                        Ok(()) => info!("BlocklistSyncJob: refresh completed"),
                        Err(e) => error!(error = %e, "BlocklistSyncJob: refresh failed"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use glory_hole_application::ports::BlocklistStats;
    use glory_hole_domain::DomainError;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingBlocklist {
        refreshes: AtomicU64,
    }

    #[async_trait]
    impl BlocklistPort for CountingBlocklist {
        fn contains(&self, _domain: &str) -> bool {
            false
        }
        async fn refresh(&self) -> Result<(), DomainError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn loaded(&self) -> bool {
            self.refreshes.load(Ordering::SeqCst) > 0
        }
        fn stats(&self) -> BlocklistStats {
            BlocklistStats::default()
        }
    }

    #[tokio::test]
    async fn initial_refresh_flips_readiness() {
        let blocklist = Arc::new(CountingBlocklist {
            refreshes: AtomicU64::new(0),
        });
        let readiness = Arc::new(ReadinessState::new());
        let job = Arc::new(
            BlocklistSyncJob::new(blocklist.clone(), readiness.clone()).with_auto_update(false),
        );
        job.start().await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(blocklist.refreshes.load(Ordering::SeqCst), 1);
        assert!(readiness.blocklist_loaded());
    }
}
