use glory_hole_application::ports::{BlocklistPort, CachePort, QueryLogSink};
use glory_hole_application::{KillSwitch, ReadinessState};
use glory_hole_infrastructure::dns::RateLimiter;
use glory_hole_infrastructure::ServerMetrics;
use std::sync::Arc;
use std::time::Instant;

/// Handles the core publishes to the management API, by reference rather
/// than copy. The API layer reads through these and does not reach into
/// the pipeline's internals.
#[derive(Clone)]
pub struct ApiState {
    pub readiness: Arc<ReadinessState>,
    pub kill_switch: Arc<KillSwitch>,
    pub metrics: Arc<ServerMetrics>,
    pub blocklist: Arc<dyn BlocklistPort>,
    pub cache: Option<Arc<dyn CachePort>>,
    pub sink: Arc<dyn QueryLogSink>,
    /// The HTTP-side limiter instance, distinct from the DNS one.
    pub rate_limiter: Option<Arc<RateLimiter>>,
    pub started_at: Instant,
    pub version: &'static str,
}
