use crate::handlers;
use crate::state::ApiState;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Router};
use glory_hole_infrastructure::dns::rate_limit::client_key;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;

/// Health and readiness routes with state.
///
/// Serve with `into_make_service_with_connect_info::<SocketAddr>()` so the
/// rate-limit middleware can see the client address.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::ready_check))
        .route("/api/health", get(handlers::api_health))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn rate_limit(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    if let Some(limiter) = &state.rate_limiter {
        let client = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        if let Some(ip) = client {
            if !limiter.allow(&client_key(ip)) {
                return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
            }
        }
    }
    next.run(request).await
}
