use serde::{Deserialize, Serialize};

/// Global per-client DNS rate limit.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_rps")]
    pub requests_per_second: f64,

    #[serde(default = "default_burst")]
    pub burst: u32,

    /// "drop" or "nxdomain".
    #[serde(default = "default_action")]
    pub action: String,

    /// Log each violation at WARN. Off by default; violations are always
    /// counted in metrics.
    #[serde(default)]
    pub log_violations: bool,

    /// Idle buckets older than this are swept, seconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Upper bound on tracked buckets; least-recently-used beyond this are
    /// evicted.
    #[serde(default = "default_max_tracked")]
    pub max_tracked_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: default_rps(),
            burst: default_burst(),
            action: default_action(),
            log_violations: false,
            cleanup_interval_secs: default_cleanup_interval(),
            max_tracked_clients: default_max_tracked(),
        }
    }
}

fn default_rps() -> f64 {
    50.0
}

fn default_burst() -> u32 {
    100
}

fn default_action() -> String {
    "drop".to_string()
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_max_tracked() -> usize {
    10_000
}
