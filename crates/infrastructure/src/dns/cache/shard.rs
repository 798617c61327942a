use bytes::Bytes;
use glory_hole_domain::{DecisionTrace, Stage};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, RwLock};
use std::time::{Duration, Instant};

static CLOCK_EPOCH: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Monotonic nanoseconds since process start. Feeds the per-entry
/// last-access field so eviction never depends on wall-clock adjustments.
pub fn mono_nanos() -> u64 {
    CLOCK_EPOCH.elapsed().as_nanos() as u64
}

/// One stored response. Immutable after insertion except for the atomic
/// last-access stamp; replacement is by full swap.
pub struct CacheEntry {
    pub wire: Bytes,
    pub expires_at: Instant,
    pub last_access: AtomicU64,
    pub trace: Option<Arc<DecisionTrace>>,
}

impl CacheEntry {
    pub fn new(wire: Bytes, ttl: Duration, trace: Option<Arc<DecisionTrace>>) -> Self {
        Self {
            wire,
            expires_at: Instant::now() + ttl,
            last_access: AtomicU64::new(mono_nanos()),
            trace,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn touch(&self) {
        self.last_access.store(mono_nanos(), Ordering::Relaxed);
    }

    pub fn is_blocklist_decision(&self) -> bool {
        self.trace
            .as_ref()
            .is_some_and(|t| t.has_stage(Stage::Blocklist))
    }
}

/// One cache partition with its own lock and counters.
pub struct Shard {
    pub entries: RwLock<FxHashMap<String, CacheEntry>>,
    pub capacity: usize,
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub sets: AtomicU64,
    pub evictions: AtomicU64,
}

impl Shard {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Key of the least-recently-accessed entry. Linear scan: the shard is
    /// small (capacity is `max_entries / shard_count`).
    pub fn lru_key(entries: &FxHashMap<String, CacheEntry>) -> Option<String> {
        entries
            .iter()
            .min_by_key(|(_, e)| e.last_access.load(Ordering::Relaxed))
            .map(|(k, _)| k.clone())
    }
}
