use super::cache::CacheConfig;
use super::database::DatabaseConfig;
use super::errors::ConfigError;
use super::forwarder::ForwarderConfig;
use super::forwarding::ConditionalForwardingConfig;
use super::kill_switch::KillSwitchConfig;
use super::local_records::LocalRecordsConfig;
use super::logging::LoggingConfig;
use super::policy::PolicyConfig;
use super::rate_limit::RateLimitConfig;
use super::server::ServerConfig;
use super::telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

/// Command-line overrides applied on top of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub listen_address: Option<String>,
    pub web_ui_address: Option<String>,
    pub log_level: Option<String>,
}

/// Top-level configuration document.
///
/// Scalar and array keys come before the section tables so the document
/// serializes back to valid TOML when kill-switch state is persisted.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Global upstream resolvers as `ip:port` (port 53 when omitted).
    #[serde(default = "default_upstreams")]
    pub upstream_dns_servers: Vec<String>,

    /// Blocklist source URLs. Hosts-file, domain-per-line, and adblock
    /// formats are detected per line during parsing.
    #[serde(default)]
    pub blocklists: Vec<String>,

    /// Refresh sources periodically in addition to the initial load.
    #[serde(default = "default_true")]
    pub auto_update_blocklists: bool,

    #[serde(default = "default_blocklist_interval")]
    pub blocklist_update_interval_secs: u64,

    /// Exact domains and patterns (`*.` wildcards, regexes) exempt from
    /// blocklist and policy decisions.
    #[serde(default)]
    pub whitelist: Vec<String>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub forwarder: ForwarderConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub conditional_forwarding: ConditionalForwardingConfig,

    #[serde(default)]
    pub local_records: LocalRecordsConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub kill_switch: KillSwitchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_dns_servers: default_upstreams(),
            blocklists: Vec::new(),
            auto_update_blocklists: true,
            blocklist_update_interval_secs: default_blocklist_interval(),
            whitelist: Vec::new(),
            server: ServerConfig::default(),
            forwarder: ForwarderConfig::default(),
            cache: CacheConfig::default(),
            policy: PolicyConfig::default(),
            conditional_forwarding: ConditionalForwardingConfig::default(),
            local_records: LocalRecordsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
            telemetry: TelemetryConfig::default(),
            database: DatabaseConfig::default(),
            kill_switch: KillSwitchConfig::default(),
        }
    }
}

fn default_upstreams() -> Vec<String> {
    vec!["1.1.1.1:53".to_string(), "8.8.8.8:53".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_blocklist_interval() -> u64 {
    86_400
}

impl Config {
    /// Load from `path` (or defaults when `None`), then apply CLI overrides.
    pub fn load(path: Option<&str>, overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Config::default(),
        };
        config.apply_overrides(overrides);
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Persist to `path`. Used to write back kill-switch toggles.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, raw).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    fn apply_overrides(&mut self, overrides: CliOverrides) {
        if let Some(addr) = overrides.listen_address {
            self.server.listen_address = addr;
        }
        if let Some(addr) = overrides.web_ui_address {
            self.server.web_ui_address = addr;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    /// Structural validation beyond what serde enforces. Policy expressions
    /// and forwarding matchers are compiled by their engines; this catches
    /// everything that should fail before any subsystem is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        SocketAddr::from_str(&self.server.listen_address).map_err(|_| ConfigError::Invalid {
            key: "server.listen_address".to_string(),
            reason: format!("not a socket address: {}", self.server.listen_address),
        })?;
        SocketAddr::from_str(&self.server.web_ui_address).map_err(|_| ConfigError::Invalid {
            key: "server.web_ui_address".to_string(),
            reason: format!("not a socket address: {}", self.server.web_ui_address),
        })?;

        if !self.server.udp_enabled && !self.server.tcp_enabled {
            return Err(ConfigError::Invalid {
                key: "server".to_string(),
                reason: "at least one of udp_enabled/tcp_enabled must be set".to_string(),
            });
        }

        if self.upstream_dns_servers.is_empty() {
            return Err(ConfigError::Invalid {
                key: "upstream_dns_servers".to_string(),
                reason: "at least one upstream server is required".to_string(),
            });
        }
        for server in &self.upstream_dns_servers {
            parse_upstream_addr(server).ok_or_else(|| ConfigError::Invalid {
                key: "upstream_dns_servers".to_string(),
                reason: format!("not an ip or ip:port: {}", server),
            })?;
        }

        if self.cache.shard_count == 0 {
            return Err(ConfigError::Invalid {
                key: "cache.shard_count".to_string(),
                reason: "shard count must be at least 1".to_string(),
            });
        }
        if self.cache.min_ttl > self.cache.max_ttl {
            return Err(ConfigError::Invalid {
                key: "cache.min_ttl".to_string(),
                reason: "min_ttl exceeds max_ttl".to_string(),
            });
        }

        if self.rate_limit.enabled {
            if self.rate_limit.requests_per_second <= 0.0 {
                return Err(ConfigError::Invalid {
                    key: "rate_limit.requests_per_second".to_string(),
                    reason: "must be positive".to_string(),
                });
            }
            match self.rate_limit.action.as_str() {
                "drop" | "nxdomain" => {}
                other => {
                    return Err(ConfigError::Invalid {
                        key: "rate_limit.action".to_string(),
                        reason: format!("expected drop or nxdomain, got {}", other),
                    })
                }
            }
        }

        for rule in &self.conditional_forwarding.rules {
            if rule.priority == 0 || rule.priority > 100 {
                return Err(ConfigError::Invalid {
                    key: "conditional_forwarding.rules".to_string(),
                    reason: format!("rule '{}': priority must be 1-100", rule.name),
                });
            }
            if rule.domains.is_empty() && rule.client_cidrs.is_empty() && rule.query_types.is_empty()
            {
                return Err(ConfigError::Invalid {
                    key: "conditional_forwarding.rules".to_string(),
                    reason: format!(
                        "rule '{}': at least one of domains/client_cidrs/query_types is required",
                        rule.name
                    ),
                });
            }
            if rule.upstreams.is_empty() {
                return Err(ConfigError::Invalid {
                    key: "conditional_forwarding.rules".to_string(),
                    reason: format!("rule '{}': upstream list is empty", rule.name),
                });
            }
        }

        self.local_records
            .parse_records()
            .map_err(|e| ConfigError::Invalid {
                key: "local_records.records".to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }
}

/// Accept `ip:port` or bare `ip` (port 53).
pub fn parse_upstream_addr(s: &str) -> Option<SocketAddr> {
    if let Ok(addr) = SocketAddr::from_str(s) {
        return Some(addr);
    }
    s.parse::<std::net::IpAddr>()
        .ok()
        .map(|ip| SocketAddr::new(ip, 53))
}
