//! Blocklist manager.
//!
//! Downloads source lists, parses and deduplicates them, and publishes the
//! union as an immutable snapshot behind a single `ArcSwap`. Query-path
//! reads (`contains`) take no lock; the publisher assembles the new
//! snapshot fully in isolation and stores it once.

pub mod parser;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use glory_hole_application::ports::{BlocklistPort, BlocklistStats, CachePort, SourceStatus};
use glory_hole_domain::DomainError;
use parser::parse_blocklist;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

/// Point-in-time view of the blocked set. Never mutated after publication.
#[derive(Default)]
pub struct BlocklistSnapshot {
    domains: FxHashSet<String>,
    stats: BlocklistStats,
}

impl BlocklistSnapshot {
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

struct SourceState {
    /// Last successfully parsed contribution; retained when a later fetch
    /// fails (sticky best-effort).
    domains: FxHashSet<String>,
    last_success_unix: Option<u64>,
    last_error: Option<Arc<str>>,
}

pub struct BlocklistManager {
    sources: RwLock<Vec<Arc<str>>>,
    snapshot: ArcSwap<BlocklistSnapshot>,
    source_states: Mutex<FxHashMap<Arc<str>, SourceState>>,
    http_client: reqwest::Client,
    /// Invalidated after every successful snapshot publication.
    cache: Option<Arc<dyn CachePort>>,
    loaded: AtomicBool,
}

impl BlocklistManager {
    /// `http_client` must resolve DNS through the upstream resolver, never
    /// the host resolver; see `forwarder::http_resolver`.
    pub fn new(
        sources: Vec<String>,
        http_client: reqwest::Client,
        cache: Option<Arc<dyn CachePort>>,
    ) -> Self {
        Self {
            sources: RwLock::new(sources.into_iter().map(Arc::from).collect()),
            snapshot: ArcSwap::from_pointee(BlocklistSnapshot::default()),
            source_states: Mutex::new(FxHashMap::default()),
            http_client,
            cache,
            loaded: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> Arc<BlocklistSnapshot> {
        self.snapshot.load_full()
    }

    /// Replace the source URL list (hot reload). Contributions from removed
    /// sources are dropped on the next `refresh`.
    pub fn set_sources(&self, sources: Vec<String>) {
        let sources: Vec<Arc<str>> = sources.into_iter().map(Arc::from).collect();
        let mut states = self.source_states.lock().unwrap();
        states.retain(|url, _| sources.contains(url));
        *self.sources.write().unwrap() = sources;
    }

    fn current_sources(&self) -> Vec<Arc<str>> {
        self.sources.read().unwrap().clone()
    }

    async fn fetch_source(&self, url: &str) -> Result<FxHashSet<String>, DomainError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| DomainError::BlocklistSourceError(format!("{}: {}", url, e)))?
            .error_for_status()
            .map_err(|e| DomainError::BlocklistSourceError(format!("{}: {}", url, e)))?;

        let body = response
            .text()
            .await
            .map_err(|e| DomainError::BlocklistSourceError(format!("{}: {}", url, e)))?;

        Ok(parse_blocklist(&body))
    }

    /// Union all per-source contributions and publish the result.
    fn publish(&self) {
        let current = self.current_sources();
        let states = self.source_states.lock().unwrap();
        let mut domains = FxHashSet::default();
        let mut sources = Vec::with_capacity(current.len());

        for url in &current {
            if let Some(state) = states.get(url) {
                domains.extend(state.domains.iter().cloned());
                sources.push(SourceStatus {
                    url: Arc::clone(url),
                    domains: state.domains.len(),
                    last_success_unix: state.last_success_unix,
                    last_error: state.last_error.clone(),
                });
            }
        }
        drop(states);

        let total = domains.len();
        let snapshot = BlocklistSnapshot {
            domains,
            stats: BlocklistStats {
                total_domains: total,
                sources,
                last_refresh_unix: Some(unix_now()),
            },
        };
        self.snapshot.store(Arc::new(snapshot));

        if let Some(cache) = &self.cache {
            cache.clear_blocklist_decisions();
        }

        info!(domains = total, "Blocklist snapshot published");
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl BlocklistPort for BlocklistManager {
    fn contains(&self, domain: &str) -> bool {
        self.snapshot.load().domains.contains(domain)
    }

    async fn refresh(&self) -> Result<(), DomainError> {
        let sources = self.current_sources();
        let mut failures = 0usize;

        for url in &sources {
            match self.fetch_source(url).await {
                Ok(domains) => {
                    info!(source = %url, domains = domains.len(), "Blocklist source fetched");
                    let mut states = self.source_states.lock().unwrap();
                    states.insert(
                        Arc::clone(url),
                        SourceState {
                            domains,
                            last_success_unix: Some(unix_now()),
                            last_error: None,
                        },
                    );
                }
                Err(e) => {
                    failures += 1;
                    warn!(source = %url, error = %e, "Blocklist source fetch failed; keeping previous contribution");
                    let mut states = self.source_states.lock().unwrap();
                    states
                        .entry(Arc::clone(url))
                        .and_modify(|s| s.last_error = Some(Arc::from(e.to_string().as_str())))
                        .or_insert_with(|| SourceState {
                            domains: FxHashSet::default(),
                            last_success_unix: None,
                            last_error: Some(Arc::from(e.to_string().as_str())),
                        });
                }
            }
        }

        self.publish();
        self.loaded.store(true, Ordering::Release);

        if failures == sources.len() && !sources.is_empty() {
            error!(failures, "Every blocklist source failed");
            return Err(DomainError::BlocklistSourceError(
                "all sources failed".to_string(),
            ));
        }
        Ok(())
    }

    fn loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    fn stats(&self) -> BlocklistStats {
        self.snapshot.load().stats.clone()
    }
}
