use crate::di::CoreServices;
use glory_hole_api::{create_router, ApiState};
use glory_hole_application::ports::BlocklistPort;
use glory_hole_domain::config::ServerConfig;
use glory_hole_infrastructure::dns::DnsServer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Bind and serve the DNS edge. Bind failures propagate so startup exits
/// non-zero before any query is accepted.
pub async fn start_dns_server(
    services: &Arc<CoreServices>,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let server = DnsServer::bind(Arc::clone(&services.handler), config, shutdown).await?;
    info!(addr = %server.local_addr(), "DNS server ready");
    Ok(tokio::spawn(server.serve()))
}

/// Bind and serve the management HTTP surface.
pub async fn start_web_server(
    services: &Arc<CoreServices>,
    config: &ServerConfig,
    rate_limit_enabled: bool,
    shutdown: CancellationToken,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let state = ApiState {
        readiness: Arc::clone(&services.readiness),
        kill_switch: Arc::clone(&services.kill_switch),
        metrics: Arc::clone(&services.metrics),
        blocklist: Arc::clone(&services.blocklist) as Arc<dyn BlocklistPort>,
        cache: services.cache.clone(),
        sink: Arc::clone(&services.sink),
        rate_limiter: rate_limit_enabled.then(|| Arc::clone(&services.http_limiter)),
        started_at: Instant::now(),
        version: env!("CARGO_PKG_VERSION"),
    };

    let addr: SocketAddr = config.web_ui_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Management API ready");

    let app = create_router(state);
    let handle = tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;
    });
    Ok(handle)
}
