//! Token-bucket rate limiting.
//!
//! Buckets live in a sharded LRU table: FNV-1a picks the shard, each shard
//! is an independently locked `LruCache` whose capacity is its slice of
//! `max_tracked`, and each bucket refills lazily behind its own mutex.
//! The `MaxTrackedClients` bound is enforced by the per-shard LRU eviction
//! at insert time; the sweeper only removes idle buckets.
//!
//! Two instances exist in the process: one for the DNS path (global limit
//! plus RATE_LIMIT policy buckets) and one for the HTTP API.

use crate::dns::cache::key::fnv1a;
use glory_hole_domain::BucketStrategy;
use lru::LruCache;
use rustc_hash::FxBuildHasher;
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

const SHARD_COUNT: usize = 16;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_used: Instant,
}

impl Bucket {
    fn new(burst: u32) -> Self {
        let now = Instant::now();
        Self {
            tokens: f64::from(burst),
            last_refill: now,
            last_used: now,
        }
    }

    /// Refill at `rps` capped by `burst`, then try to take one token.
    fn try_consume(&mut self, rps: f64, burst: u32) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rps).min(f64::from(burst));
        self.last_refill = now;
        self.last_used = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// One partition of the bucket table. `get` promotes to MRU; `push` at
/// capacity evicts the shard's least recently used bucket.
type BucketShard = Mutex<LruCache<String, Arc<Mutex<Bucket>>, FxBuildHasher>>;

pub struct RateLimiter {
    shards: Box<[BucketShard]>,
    default_rps: f64,
    default_burst: u32,
}

impl RateLimiter {
    pub fn new(default_rps: f64, default_burst: u32, max_tracked: usize) -> Self {
        // Per-shard slice of the table bound, clamped to one entry.
        let per_shard = NonZeroUsize::new((max_tracked / SHARD_COUNT).max(1)).unwrap();
        let shards: Vec<BucketShard> = (0..SHARD_COUNT)
            .map(|_| Mutex::new(LruCache::with_hasher(per_shard, FxBuildHasher)))
            .collect();
        Self {
            shards: shards.into_boxed_slice(),
            default_rps,
            default_burst,
        }
    }

    fn shard_for(&self, key: &str) -> &BucketShard {
        let index = (fnv1a(key) % SHARD_COUNT as u64) as usize;
        &self.shards[index]
    }

    /// Consume one token from `key`'s bucket at the limiter's default rate.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_with(key, self.default_rps, self.default_burst)
    }

    /// Consume one token from `key`'s bucket at an explicit rate (used by
    /// RATE_LIMIT policy rules, which carry their own descriptors).
    pub fn allow_with(&self, key: &str, rps: f64, burst: u32) -> bool {
        let bucket = {
            let mut shard = self.shard_for(key).lock().unwrap();
            match shard.get(key) {
                Some(bucket) => Arc::clone(bucket),
                None => {
                    let bucket = Arc::new(Mutex::new(Bucket::new(burst)));
                    shard.push(key.to_string(), Arc::clone(&bucket));
                    bucket
                }
            }
        };
        let allowed = bucket.lock().unwrap().try_consume(rps, burst);
        allowed
    }

    pub fn tracked(&self) -> usize {
        self.shards.iter().map(|s| s.lock().unwrap().len()).sum()
    }

    /// Remove buckets idle longer than `idle`. The table bound needs no
    /// work here: the per-shard LRU caches enforce it on insert.
    pub fn sweep(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        for shard in self.shards.iter() {
            let mut guard = shard.lock().unwrap();
            let stale: Vec<String> = guard
                .iter()
                .filter(|(_, bucket)| {
                    now.duration_since(bucket.lock().unwrap().last_used) >= idle
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in &stale {
                guard.pop(key);
            }
            removed += stale.len();
        }

        if removed > 0 {
            debug!(removed, tracked = self.tracked(), "Rate-limit buckets swept");
        }
        removed
    }
}

/// Bucket key for a RATE_LIMIT policy rule per its strategy.
pub fn bucket_key(
    strategy: BucketStrategy,
    rule: &str,
    client_ip: IpAddr,
    domain: &str,
) -> String {
    match strategy {
        BucketStrategy::Client => format!("rule:{}|client:{}", rule, client_ip),
        BucketStrategy::Rule => format!("rule:{}", rule),
        BucketStrategy::Domain => format!("rule:{}|domain:{}", rule, domain),
        BucketStrategy::ClientDomain => {
            format!("rule:{}|client:{}|domain:{}", rule, client_ip, domain)
        }
    }
}

/// Bucket key for the global per-client DNS limit.
pub fn client_key(client_ip: IpAddr) -> String {
    format!("client:{}", client_ip)
}
