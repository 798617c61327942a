//! Sharded DNS response cache.
//!
//! A fixed array of shards, each an independently locked map from cache
//! fingerprint to stored response. Shard selection is FNV-1a over the key
//! modulo the shard count, so no operation ever holds more than one lock.

pub mod key;
pub mod shard;
pub mod ttl;

use bytes::Bytes;
use glory_hole_application::ports::{CacheHit, CachePort, CacheStats};
use glory_hole_domain::config::CacheConfig;
use glory_hole_domain::DecisionTrace;
use key::{cache_key, fnv1a};
use shard::{CacheEntry, Shard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub use ttl::response_ttl;

/// Minimum per-shard capacity regardless of configuration.
const MIN_SHARD_CAPACITY: usize = 10;

pub struct ShardedCache {
    shards: Box<[Shard]>,
    blocked_ttl: Duration,
    /// Entries across all shards, maintained on insert/remove so `stats`
    /// never has to walk the maps.
    size: AtomicU64,
}

impl ShardedCache {
    pub fn new(config: &CacheConfig) -> Self {
        let shard_count = config.shard_count.max(1);
        let capacity = (config.max_entries / shard_count).max(MIN_SHARD_CAPACITY);
        let shards: Vec<Shard> = (0..shard_count).map(|_| Shard::new(capacity)).collect();

        info!(
            shards = shard_count,
            per_shard_capacity = capacity,
            blocked_ttl = config.blocked_ttl,
            "DNS cache initialized"
        );

        Self {
            shards: shards.into_boxed_slice(),
            blocked_ttl: Duration::from_secs(u64::from(config.blocked_ttl.max(1))),
            size: AtomicU64::new(0),
        }
    }

    fn shard_for(&self, key: &str) -> &Shard {
        let index = (fnv1a(key) % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn store(&self, key: String, entry: CacheEntry) {
        let shard = self.shard_for(&key);
        let mut entries = shard.entries.write().unwrap();

        if !entries.contains_key(&key) && entries.len() >= shard.capacity {
            if let Some(victim) = Shard::lru_key(&entries) {
                entries.remove(&victim);
                shard.evictions.fetch_add(1, Ordering::Relaxed);
                self.size.fetch_sub(1, Ordering::Relaxed);
            }
        }

        let replaced = entries.insert(key, entry).is_some();
        shard.sets.fetch_add(1, Ordering::Relaxed);
        if !replaced {
            self.size.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl CachePort for ShardedCache {
    fn get(&self, domain: &str, qtype: u16) -> Option<CacheHit> {
        let key = cache_key(domain, qtype);
        let shard = self.shard_for(&key);
        let now = Instant::now();

        {
            let entries = shard.entries.read().unwrap();
            match entries.get(&key) {
                None => {
                    shard.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                Some(entry) if !entry.is_expired(now) => {
                    entry.touch();
                    shard.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(CacheHit {
                        wire: entry.wire.clone(),
                        trace: entry.trace.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        // Expired: upgrade to a write lock and delete. Re-check under the
        // write lock; another thread may have replaced the entry meanwhile.
        let mut entries = shard.entries.write().unwrap();
        if entries.get(&key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(&key);
            self.size.fetch_sub(1, Ordering::Relaxed);
        }
        shard.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn insert(&self, domain: &str, qtype: u16, wire: Bytes, ttl: Duration) {
        debug_assert!(!ttl.is_zero(), "zero TTLs must be refused by the caller");
        if ttl.is_zero() {
            return;
        }
        self.store(cache_key(domain, qtype), CacheEntry::new(wire, ttl, None));
    }

    fn insert_blocked(&self, domain: &str, qtype: u16, wire: Bytes, trace: Arc<DecisionTrace>) {
        self.store(
            cache_key(domain, qtype),
            CacheEntry::new(wire, self.blocked_ttl, Some(trace)),
        );
    }

    fn clear_blocklist_decisions(&self) -> usize {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut entries = shard.entries.write().unwrap();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_blocklist_decision());
            removed += before - entries.len();
        }
        if removed > 0 {
            self.size.fetch_sub(removed as u64, Ordering::Relaxed);
            info!(removed, "Dropped cached blocklist decisions");
        }
        removed
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut entries = shard.entries.write().unwrap();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            removed += before - entries.len();
        }
        if removed > 0 {
            self.size.fetch_sub(removed as u64, Ordering::Relaxed);
            debug!(removed, "Swept expired cache entries");
        }
        removed
    }

    fn clear(&self) {
        for shard in self.shards.iter() {
            shard.entries.write().unwrap().clear();
        }
        self.size.store(0, Ordering::Relaxed);
    }

    fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            entries: self.size.load(Ordering::Relaxed) as usize,
            ..CacheStats::default()
        };
        for shard in self.shards.iter() {
            stats.hits += shard.hits.load(Ordering::Relaxed);
            stats.misses += shard.misses.load(Ordering::Relaxed);
            stats.sets += shard.sets.load(Ordering::Relaxed);
            stats.evictions += shard.evictions.load(Ordering::Relaxed);
        }
        stats
    }
}
