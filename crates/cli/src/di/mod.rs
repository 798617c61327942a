//! Wire-up of the query pipeline.
//!
//! The cache, blocklist manager, and handler reference each other; this
//! module owns all of them and injects references at construction instead
//! of through globals. It also owns the hot-reload diff: a changed
//! configuration mutates only the subsystems whose sections changed.

use crate::bootstrap::{logging, LogReloadHandle};
use chrono::DateTime;
use glory_hole_application::ports::{
    BlocklistPort, CachePort, ForwarderPort, ForwardingRulesPort, PolicyEnginePort, QueryLogSink,
    RoutePlan,
};
use glory_hole_application::{KillSwitch, ReadinessState};
use glory_hole_domain::{parse_upstream_addr, Config, ViolationAction};
use glory_hole_infrastructure::dns::handler::{PipelineState, QueryHandler, RateLimitSettings};
use glory_hole_infrastructure::dns::{
    BlocklistManager, ChannelLogSink, Forwarder, ForwardingRuleSet, LocalRecordTable, NullLogSink,
    PolicyEngine, RateLimiter, ShardedCache, TracingLogWriter, UpstreamResolver, Whitelist,
};
use glory_hole_infrastructure::ServerMetrics;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct CoreServices {
    pub handler: Arc<QueryHandler>,
    pub cache: Option<Arc<dyn CachePort>>,
    pub blocklist: Arc<BlocklistManager>,
    pub whitelist: Arc<Whitelist>,
    pub local_records: Arc<LocalRecordTable>,
    pub forwarder: Arc<dyn ForwarderPort>,
    pub dns_limiter: Arc<RateLimiter>,
    pub http_limiter: Arc<RateLimiter>,
    pub kill_switch: Arc<KillSwitch>,
    pub readiness: Arc<ReadinessState>,
    pub metrics: Arc<ServerMetrics>,
    pub sink: Arc<dyn QueryLogSink>,
    config_path: Option<PathBuf>,
    current: Mutex<Config>,
    log_handle: LogReloadHandle,
}

impl CoreServices {
    pub async fn new(
        config: Config,
        config_path: Option<PathBuf>,
        log_handle: LogReloadHandle,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Arc<Self>> {
        info!("Initializing query pipeline");

        let metrics = Arc::new(ServerMetrics::new());
        let readiness = Arc::new(ReadinessState::new());

        let cache: Option<Arc<dyn CachePort>> = if config.cache.enabled {
            Some(Arc::new(ShardedCache::new(&config.cache)))
        } else {
            None
        };

        let forwarder: Arc<dyn ForwarderPort> = Arc::new(Forwarder::new(&config.forwarder));
        let global_plan = build_global_plan(&config)?;

        // Blocklist downloads resolve through the upstreams, never the host
        // resolver (which is frequently this very process).
        let http_resolver = Arc::new(UpstreamResolver::new(
            Arc::clone(&forwarder),
            global_plan.clone(),
            config.forwarder.strict_resolution,
        ));
        let http_client = http_resolver.new_http_client(Duration::from_secs(30))?;
        let blocklist = Arc::new(BlocklistManager::new(
            config.blocklists.clone(),
            http_client,
            cache.clone(),
        ));

        let whitelist = Arc::new(Whitelist::new(&config.whitelist)?);
        let local_records = Arc::new(LocalRecordTable::new(
            config.local_records.parse_records()?,
        ));

        let dns_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
            config.rate_limit.max_tracked_clients,
        ));
        let http_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
            config.rate_limit.max_tracked_clients,
        ));

        let kill_switch = Arc::new(KillSwitch::new());
        apply_kill_switch_config(&kill_switch, &config);

        let sink: Arc<dyn QueryLogSink> = if config.database.enabled {
            Arc::new(ChannelLogSink::spawn(
                config.database.buffer_size,
                Arc::new(TracingLogWriter),
            ))
        } else {
            Arc::new(NullLogSink)
        };

        let handler = Arc::new(QueryHandler::new(
            cache.clone(),
            Arc::clone(&blocklist) as Arc<dyn BlocklistPort>,
            Arc::clone(&whitelist),
            Arc::clone(&local_records),
            Arc::clone(&forwarder),
            Arc::clone(&dns_limiter),
            Arc::clone(&kill_switch),
            Arc::clone(&sink),
            Arc::clone(&metrics),
            build_pipeline_state(&config)?,
        ));

        spawn_upstream_probe(
            Arc::clone(&forwarder),
            global_plan,
            Arc::clone(&readiness),
            shutdown,
        );

        info!("Query pipeline initialized");

        Ok(Arc::new(Self {
            handler,
            cache,
            blocklist,
            whitelist,
            local_records,
            forwarder,
            dns_limiter,
            http_limiter,
            kill_switch,
            readiness,
            metrics,
            sink,
            config_path,
            current: Mutex::new(config),
            log_handle,
        }))
    }

    /// Reload the configuration file and apply the diff. Called from the
    /// config watcher; a failure leaves everything as it was.
    pub fn reload(&self) {
        let Some(path) = self.config_path.as_deref().and_then(|p| p.to_str()) else {
            return;
        };
        let new = match Config::from_file(path).and_then(|c| c.validate().map(|_| c)) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "Configuration reload failed; keeping previous configuration");
                return;
            }
        };

        let old = self.current.lock().unwrap().clone();

        if new.whitelist != old.whitelist {
            if let Err(e) = self.whitelist.replace(&new.whitelist) {
                error!(error = %e, "Whitelist reload failed; keeping previous entries");
            }
        }

        if new.local_records != old.local_records {
            match new.local_records.parse_records() {
                Ok(records) => self.local_records.replace(records),
                Err(e) => error!(error = %e, "Local records reload failed; keeping previous table"),
            }
        }

        if new.blocklists != old.blocklists {
            self.blocklist.set_sources(new.blocklists.clone());
            let blocklist = Arc::clone(&self.blocklist);
            tokio::spawn(async move {
                if let Err(e) = blocklist.refresh().await {
                    error!(error = %e, "Blocklist refresh after source change failed");
                }
            });
            info!("Blocklist sources changed; refresh started");
        }

        if new.kill_switch != old.kill_switch {
            apply_kill_switch_config(&self.kill_switch, &new);
        }

        if new.logging.level != old.logging.level {
            logging::set_level(&self.log_handle, &new.logging.level);
        }

        // Pipeline-wide settings (policy, conditional forwarding, cache
        // policy, rate limit, trace flag, global upstreams) swap as one
        // consistent state.
        let pipeline_dirty = new.policy != old.policy
            || new.conditional_forwarding != old.conditional_forwarding
            || new.cache != old.cache
            || new.rate_limit != old.rate_limit
            || new.server.decision_trace != old.server.decision_trace
            || new.upstream_dns_servers != old.upstream_dns_servers
            || new.forwarder != old.forwarder;
        if pipeline_dirty {
            match build_pipeline_state(&new) {
                Ok(state) => {
                    self.handler.update_state(state);
                    info!("Pipeline state reloaded");
                }
                Err(e) => error!(error = %e, "Pipeline state reload failed; keeping previous state"),
            }
        }

        if new.server.listen_address != old.server.listen_address
            || new.server.web_ui_address != old.server.web_ui_address
            || new.database != old.database
        {
            warn!("Listener or database configuration changed; restart required to apply");
        }

        *self.current.lock().unwrap() = new;
        info!("Configuration reloaded");
    }

    pub fn config(&self) -> Config {
        self.current.lock().unwrap().clone()
    }
}

fn build_global_plan(config: &Config) -> anyhow::Result<RoutePlan> {
    let upstreams: Vec<SocketAddr> = config
        .upstream_dns_servers
        .iter()
        .map(|s| {
            parse_upstream_addr(s)
                .ok_or_else(|| anyhow::anyhow!("bad upstream address: {}", s))
        })
        .collect::<Result<_, _>>()?;
    Ok(RoutePlan {
        rule_name: None,
        upstreams: Arc::from(upstreams.into_boxed_slice()),
        timeout: Duration::from_millis(config.forwarder.query_timeout_ms),
        max_retries: config.forwarder.max_retries,
        failover: true,
    })
}

fn build_pipeline_state(config: &Config) -> anyhow::Result<PipelineState> {
    let policy: Option<Arc<dyn PolicyEnginePort>> = if config.policy.enabled {
        Some(Arc::new(PolicyEngine::from_config(&config.policy.rules)?))
    } else {
        None
    };

    let global_plan = build_global_plan(config)?;
    let forwarding_rules: Option<Arc<dyn ForwardingRulesPort>> =
        if config.conditional_forwarding.enabled {
            Some(Arc::new(ForwardingRuleSet::from_config(
                &config.conditional_forwarding,
                global_plan.clone(),
            )?))
        } else {
            None
        };

    let rate_limit = if config.rate_limit.enabled {
        Some(RateLimitSettings {
            rps: config.rate_limit.requests_per_second,
            burst: config.rate_limit.burst,
            action: config.rate_limit.action.parse::<ViolationAction>()?,
            log_violations: config.rate_limit.log_violations,
        })
    } else {
        None
    };

    Ok(PipelineState {
        decision_trace: config.server.decision_trace,
        cache_enabled: config.cache.enabled,
        cache_config: config.cache.clone(),
        rate_limit,
        policy,
        forwarding_rules,
        global_plan,
    })
}

/// Arm the kill switch from its persisted configuration, honoring a stored
/// expiry that has not yet passed.
fn apply_kill_switch_config(kill_switch: &KillSwitch, config: &Config) {
    if !config.kill_switch.enabled {
        kill_switch.disable();
        return;
    }
    match &config.kill_switch.expires_at {
        None => kill_switch.enable(None),
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(deadline) => {
                let remaining = deadline.signed_duration_since(chrono::Utc::now());
                match remaining.to_std() {
                    Ok(duration) => kill_switch.enable(Some(duration)),
                    // already expired
                    Err(_) => kill_switch.disable(),
                }
            }
            Err(e) => {
                warn!(error = %e, "Bad kill_switch.expires_at; enabling without expiry");
                kill_switch.enable(None);
            }
        },
    }
}

/// Retry the upstream probe until it succeeds; `/ready` stays 503 until
/// then.
fn spawn_upstream_probe(
    forwarder: Arc<dyn ForwarderPort>,
    plan: RoutePlan,
    readiness: Arc<ReadinessState>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            if shutdown.is_cancelled() {
                return;
            }
            if forwarder.probe(&plan).await {
                readiness.mark_upstream_probed();
                info!("Upstream probe succeeded");
                return;
            }
            warn!("Upstream probe failed; retrying in 10s");
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_secs(10)) => {}
            }
        }
    });
}
