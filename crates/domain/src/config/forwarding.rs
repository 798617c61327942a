use serde::{Deserialize, Serialize};

/// One conditional-forwarding rule.
///
/// At least one of `domains`, `client_cidrs`, `query_types` must be present;
/// all configured matcher sets must hold for the rule to fire.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ForwardingRuleConfig {
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 1–100; higher priority rules are evaluated first. Ties are broken by
    /// insertion order.
    #[serde(default = "default_priority")]
    pub priority: u8,

    /// Domain patterns: exact, `*.` wildcard, or regex.
    #[serde(default)]
    pub domains: Vec<String>,

    /// Client subnets in CIDR notation.
    #[serde(default)]
    pub client_cidrs: Vec<String>,

    /// Query type names ("A", "AAAA", ...).
    #[serde(default)]
    pub query_types: Vec<String>,

    /// Upstreams used when this rule fires.
    pub upstreams: Vec<String>,

    /// Per-query deadline override, milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Per-upstream retry override.
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// When false, only the first upstream is tried.
    #[serde(default = "default_true")]
    pub failover: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ConditionalForwardingConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub rules: Vec<ForwardingRuleConfig>,
}

fn default_true() -> bool {
    true
}

fn default_priority() -> u8 {
    50
}
