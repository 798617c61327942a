use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Anything with idle-bucket cleanup semantics. Implemented by the DNS and
/// HTTP rate limiters via small adapters in the wire-up.
pub trait SweepTarget: Send + Sync {
    /// Remove buckets idle longer than `idle`; returns how many went.
    fn sweep(&self, idle: Duration) -> usize;
}

/// Periodic rate-limit bucket cleanup.
pub struct RateLimitSweepJob {
    target: Arc<dyn SweepTarget>,
    interval: Duration,
    idle: Duration,
    shutdown: CancellationToken,
}

impl RateLimitSweepJob {
    pub fn new(target: Arc<dyn SweepTarget>, interval: Duration) -> Self {
        Self {
            target,
            idle: interval,
            interval,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub async fn start(self: Arc<Self>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting rate-limit sweep job"
        );
        crate::runner::supervise("rate_limit_sweep", self.shutdown.clone(), move || {
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
                    info!("RateLimitSweepJob: shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let removed = self.target.sweep(self.idle);
                    if removed > 0 {
                        debug!(removed, "RateLimitSweepJob: buckets removed");
                    }
                }
            }
        }
    }
}
