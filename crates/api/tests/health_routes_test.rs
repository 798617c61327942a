use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use glory_hole_api::{create_router, ApiState};
use glory_hole_application::ports::{BlocklistPort, BlocklistStats, QueryLogEntry, QueryLogSink};
use glory_hole_application::{KillSwitch, ReadinessState};
use glory_hole_domain::DomainError;
use glory_hole_infrastructure::ServerMetrics;
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceExt;

struct EmptyBlocklist;

#[async_trait]
impl BlocklistPort for EmptyBlocklist {
    fn contains(&self, _domain: &str) -> bool {
        false
    }
    async fn refresh(&self) -> Result<(), DomainError> {
        Ok(())
    }
    fn loaded(&self) -> bool {
        true
    }
    fn stats(&self) -> BlocklistStats {
        BlocklistStats::default()
    }
}

struct NullSink;

impl QueryLogSink for NullSink {
    fn record(&self, _entry: QueryLogEntry) {}
    fn dropped(&self) -> u64 {
        0
    }
}

fn state() -> ApiState {
    ApiState {
        readiness: Arc::new(ReadinessState::new()),
        kill_switch: Arc::new(KillSwitch::new()),
        metrics: Arc::new(ServerMetrics::new()),
        blocklist: Arc::new(EmptyBlocklist),
        cache: None,
        sink: Arc::new(NullSink),
        rate_limiter: None,
        started_at: Instant::now(),
        version: "test",
    }
}

#[tokio::test]
async fn health_is_always_ok() {
    let app = create_router(state());
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn ready_flips_with_the_gates() {
    let state = state();
    let readiness = Arc::clone(&state.readiness);
    let app = create_router(state);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    readiness.mark_blocklist_loaded();
    readiness.mark_upstream_probed();

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn api_health_reports_subsystems() {
    let app = create_router(state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["version"], "test");
    assert_eq!(json["ready"], false);
    assert_eq!(json["subsystems"]["blocklist_loaded"], true);
    assert_eq!(json["metrics"]["queries_total"], 0);
}
