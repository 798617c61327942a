use serde::{Deserialize, Serialize};

/// Sharded response cache policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Lower clamp on positive TTLs, seconds.
    #[serde(default = "default_min_ttl")]
    pub min_ttl: u32,

    /// Upper clamp on positive TTLs, seconds.
    #[serde(default = "default_max_ttl")]
    pub max_ttl: u32,

    /// TTL for NXDOMAIN and empty-answer responses, seconds.
    #[serde(default = "default_negative_ttl")]
    pub negative_ttl: u32,

    /// TTL for sinkholed responses, seconds.
    #[serde(default = "default_blocked_ttl")]
    pub blocked_ttl: u32,

    /// Number of independent shards; a power of two keeps the FNV-1a
    /// distribution even.
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_max_entries(),
            min_ttl: default_min_ttl(),
            max_ttl: default_max_ttl(),
            negative_ttl: default_negative_ttl(),
            blocked_ttl: default_blocked_ttl(),
            shard_count: default_shard_count(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_entries() -> usize {
    100_000
}

fn default_min_ttl() -> u32 {
    60
}

fn default_max_ttl() -> u32 {
    86_400
}

fn default_negative_ttl() -> u32 {
    300
}

fn default_blocked_ttl() -> u32 {
    300
}

fn default_shard_count() -> usize {
    64
}
