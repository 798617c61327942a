use serde::{Deserialize, Serialize};

/// Forwarder tuning. The upstream list itself lives at the document root
/// as `upstream_dns_servers`; per-query overrides come from
/// conditional-forwarding rules and FORWARD policy actions.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ForwarderConfig {
    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Whole-query deadline in milliseconds, across all retries and upstreams.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Retries per upstream before failing over to the next one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Shuffle the upstream order per query instead of always starting at
    /// the first entry.
    #[serde(default)]
    pub randomize: bool,

    /// Force TCP for upstream queries.
    #[serde(default)]
    pub tcp_only: bool,

    /// When set, blocklist downloads never fall back to the host resolver.
    #[serde(default = "default_true")]
    pub strict_resolution: bool,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: default_attempt_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
            max_retries: default_max_retries(),
            randomize: false,
            tcp_only: false,
            strict_resolution: true,
        }
    }
}

fn default_attempt_timeout_ms() -> u64 {
    1000
}

fn default_query_timeout_ms() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    2
}

fn default_true() -> bool {
    true
}
