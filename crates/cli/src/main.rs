//! # Glory-Hole
//!
//! Recursive DNS filtering server: answers queries from the local network,
//! forwards what it cannot answer itself, and blocks or rewrites queries
//! whose domains match blocklists or user-defined policies.

mod bootstrap;
mod di;
mod server;

use clap::Parser;
use glory_hole_domain::CliOverrides;
use glory_hole_jobs::rate_limit_sweep::SweepTarget;
use glory_hole_jobs::{
    BlocklistSyncJob, CacheMaintenanceJob, ConfigWatchJob, JobRunner, RateLimitSweepJob,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "glory-hole")]
#[command(version)]
#[command(about = "A recursive DNS filtering server")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// DNS bind address override (e.g. "0.0.0.0:53")
    #[arg(short, long)]
    listen: Option<String>,

    /// Management API bind address override
    #[arg(short, long)]
    web: Option<String>,

    /// Log level override
    #[arg(long)]
    log_level: Option<String>,
}

/// Adapter so the sweep job can clean a rate limiter without the jobs
/// crate depending on the infrastructure crate.
struct LimiterSweep(Arc<glory_hole_infrastructure::dns::RateLimiter>);

impl SweepTarget for LimiterSweep {
    fn sweep(&self, idle: Duration) -> usize {
        self.0.sweep(idle)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = bootstrap::load_config(
        cli.config.as_deref(),
        CliOverrides {
            listen_address: cli.listen,
            web_ui_address: cli.web,
            log_level: cli.log_level,
        },
    )?;
    let log_handle = bootstrap::init_logging(&config.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Glory-Hole starting");

    let shutdown = CancellationToken::new();
    let config_path = cli.config.as_ref().map(PathBuf::from);
    let services = di::CoreServices::new(
        config.clone(),
        config_path.clone(),
        log_handle,
        shutdown.clone(),
    )
    .await?;

    // Listeners bind before the jobs start so a bad address exits early.
    let dns_task = server::start_dns_server(&services, &config.server, shutdown.clone()).await?;
    let web_task = server::start_web_server(
        &services,
        &config.server,
        config.rate_limit.enabled,
        shutdown.clone(),
    )
    .await?;

    let mut jobs = JobRunner::new().with_blocklist_sync(
        BlocklistSyncJob::new(services.blocklist.clone(), services.readiness.clone())
            .with_interval(config.blocklist_update_interval_secs)
            .with_auto_update(config.auto_update_blocklists)
            .with_cancellation(shutdown.clone()),
    );
    if let Some(cache) = &services.cache {
        jobs = jobs.with_cache_maintenance(
            CacheMaintenanceJob::new(Arc::clone(cache)).with_cancellation(shutdown.clone()),
        );
    }
    if config.rate_limit.enabled {
        jobs = jobs.with_rate_limit_sweep(
            RateLimitSweepJob::new(
                Arc::new(LimiterSweep(services.dns_limiter.clone())),
                Duration::from_secs(config.rate_limit.cleanup_interval_secs),
            )
            .with_cancellation(shutdown.clone()),
        );
    }
    if let Some(path) = config_path {
        let reload_services = Arc::clone(&services);
        jobs = jobs.with_config_watch(
            ConfigWatchJob::new(path, Arc::new(move || reload_services.reload()))
                .with_cancellation(shutdown.clone()),
        );
    }
    jobs.start().await;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    shutdown.cancel();

    let grace = Duration::from_secs(config.server.shutdown_timeout_secs);
    let drained = tokio::time::timeout(grace, async {
        let _ = dns_task.await;
        let _ = web_task.await;
    })
    .await;
    if drained.is_err() {
        warn!(timeout_secs = grace.as_secs(), "Graceful shutdown timed out");
    }

    info!("Glory-Hole stopped");
    Ok(())
}
