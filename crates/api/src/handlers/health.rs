use crate::state::ApiState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use glory_hole_infrastructure::ServerMetrics;
use serde::Serialize;

/// Liveness: 200 for as long as the process is up.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness: 200 only after the initial blocklist load has completed and
/// one upstream probe has succeeded; 503 otherwise.
pub async fn ready_check(State(state): State<ApiState>) -> (StatusCode, &'static str) {
    if state.readiness.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    version: &'static str,
    hostname: String,
    uptime_secs: u64,
    ready: bool,
    kill_switch_active: bool,
    subsystems: SubsystemStatus,
    metrics: MetricsSnapshot,
}

#[derive(Serialize)]
struct SubsystemStatus {
    blocklist_loaded: bool,
    blocklist_domains: usize,
    upstream_probed: bool,
    cache_entries: Option<usize>,
    cache_hit_rate: Option<f64>,
    query_log_dropped: u64,
}

#[derive(Serialize)]
struct MetricsSnapshot {
    queries_total: u64,
    queries_blocked: u64,
    queries_cached: u64,
    queries_forwarded: u64,
    rate_limit_dropped: u64,
    block_rate: f64,
}

/// Richer health document for dashboards.
pub async fn api_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let cache_stats = state.cache.as_ref().map(|c| c.stats());
    let metrics = &state.metrics;

    Json(HealthResponse {
        version: state.version,
        hostname: hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string()),
        uptime_secs: state.started_at.elapsed().as_secs(),
        ready: state.readiness.is_ready(),
        kill_switch_active: state.kill_switch.is_active(),
        subsystems: SubsystemStatus {
            blocklist_loaded: state.blocklist.loaded(),
            blocklist_domains: state.blocklist.stats().total_domains,
            upstream_probed: state.readiness.upstream_probed(),
            cache_entries: cache_stats.map(|s| s.entries),
            cache_hit_rate: cache_stats.map(|s| s.hit_rate()),
            query_log_dropped: state.sink.dropped(),
        },
        metrics: MetricsSnapshot {
            queries_total: ServerMetrics::get(&metrics.queries_total),
            queries_blocked: ServerMetrics::get(&metrics.queries_blocked),
            queries_cached: ServerMetrics::get(&metrics.queries_cached),
            queries_forwarded: ServerMetrics::get(&metrics.queries_forwarded),
            rate_limit_dropped: ServerMetrics::get(&metrics.rate_limit_dropped),
            block_rate: metrics.block_rate(),
        },
    })
}
