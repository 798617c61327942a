use bytes::Bytes;
use glory_hole_domain::DecisionTrace;
use std::sync::Arc;
use std::time::Duration;

/// A served cache entry: the stored wire image plus any attached trace.
///
/// The caller patches the message id before replying; the stored bytes are
/// never mutated in place.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub wire: Bytes,
    pub trace: Option<Arc<DecisionTrace>>,
}

/// Aggregate counters across all shards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64 * 100.0
        } else {
            0.0
        }
    }
}

/// Response memoization keyed by `(lowercased domain, qtype code)`.
///
/// Implementations must be safe for concurrent use; every method is called
/// from the query hot path except `clear_blocklist_decisions` and
/// `purge_expired`, which run from background jobs.
pub trait CachePort: Send + Sync {
    fn get(&self, domain: &str, qtype: u16) -> Option<CacheHit>;

    /// Store a response for `ttl`. A zero `ttl` must be refused by the
    /// caller; implementations may debug-assert it.
    fn insert(&self, domain: &str, qtype: u16, wire: Bytes, ttl: Duration);

    /// Store a sinkholed response under the blocked TTL with its trace.
    fn insert_blocked(&self, domain: &str, qtype: u16, wire: Bytes, trace: Arc<DecisionTrace>);

    /// Drop every entry whose trace records a blocklist decision. Returns
    /// the number of entries removed. Invoked when a new blocklist snapshot
    /// is published.
    fn clear_blocklist_decisions(&self) -> usize;

    /// Sweep expired entries; returns the number removed.
    fn purge_expired(&self) -> usize;

    fn clear(&self);

    fn stats(&self) -> CacheStats;
}
