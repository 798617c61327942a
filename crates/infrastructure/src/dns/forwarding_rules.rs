//! Conditional-forwarding rule evaluation.
//!
//! Rules are compiled and sorted once at load time: descending priority
//! with a stable tie-break on insertion order. A rule fires when every
//! matcher set it configures (domains, client CIDRs, query types) holds.

use crate::dns::matcher::Matcher;
use glory_hole_application::ports::{ForwardingRulesPort, RoutePlan};
use glory_hole_domain::config::{ConditionalForwardingConfig, ForwardingRuleConfig};
use glory_hole_domain::{parse_upstream_addr, DomainError, RecordType};
use ipnetwork::IpNetwork;
use rustc_hash::FxHashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

struct CompiledForwardingRule {
    name: Arc<str>,
    enabled: bool,
    priority: u8,
    domains: Option<Matcher>,
    client_cidrs: Vec<IpNetwork>,
    query_types: Option<FxHashSet<u16>>,
    upstreams: Arc<[SocketAddr]>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    failover: bool,
}

impl CompiledForwardingRule {
    fn matches(&self, domain: &str, client_ip: IpAddr, qtype: RecordType) -> bool {
        if let Some(matcher) = &self.domains {
            if !matcher.matches(domain) {
                return false;
            }
        }
        if !self.client_cidrs.is_empty() && !self.client_cidrs.iter().any(|n| n.contains(client_ip))
        {
            return false;
        }
        if let Some(types) = &self.query_types {
            if !types.contains(&qtype.code()) {
                return false;
            }
        }
        true
    }
}

/// The full rule table plus the global fallback route.
pub struct ForwardingRuleSet {
    rules: Vec<CompiledForwardingRule>,
    global: RoutePlan,
}

impl ForwardingRuleSet {
    pub fn from_config(
        config: &ConditionalForwardingConfig,
        global: RoutePlan,
    ) -> Result<Self, DomainError> {
        let mut rules = Vec::with_capacity(config.rules.len());
        if config.enabled {
            for rule in &config.rules {
                rules.push(Self::compile(rule)?);
            }
        }

        // Descending priority; equal priorities keep insertion order.
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        info!(rules = rules.len(), "Conditional forwarding rules loaded");
        Ok(Self { rules, global })
    }

    fn compile(config: &ForwardingRuleConfig) -> Result<CompiledForwardingRule, DomainError> {
        let invalid = |reason: String| DomainError::InvalidForwardingRule {
            rule: config.name.clone(),
            reason,
        };

        if config.domains.is_empty()
            && config.client_cidrs.is_empty()
            && config.query_types.is_empty()
        {
            return Err(invalid(
                "at least one of domains/client_cidrs/query_types is required".to_string(),
            ));
        }
        if config.priority == 0 || config.priority > 100 {
            return Err(invalid(format!("priority {} out of 1-100", config.priority)));
        }

        let domains = if config.domains.is_empty() {
            None
        } else {
            Some(Matcher::new(&config.domains).map_err(|e| invalid(e.to_string()))?)
        };

        let client_cidrs = config
            .client_cidrs
            .iter()
            .map(|c| {
                c.parse::<IpNetwork>()
                    .map_err(|e| invalid(format!("bad CIDR '{}': {}", c, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let query_types = if config.query_types.is_empty() {
            None
        } else {
            Some(
                config
                    .query_types
                    .iter()
                    .map(|t| {
                        t.parse::<RecordType>()
                            .map(|rt| rt.code())
                            .map_err(invalid)
                    })
                    .collect::<Result<FxHashSet<_>, _>>()?,
            )
        };

        let upstreams: Vec<SocketAddr> = config
            .upstreams
            .iter()
            .map(|u| {
                parse_upstream_addr(u)
                    .ok_or_else(|| invalid(format!("upstream is not an address: '{}'", u)))
            })
            .collect::<Result<_, _>>()?;
        if upstreams.is_empty() {
            return Err(invalid("upstream list is empty".to_string()));
        }

        Ok(CompiledForwardingRule {
            name: Arc::from(config.name.as_str()),
            enabled: config.enabled,
            priority: config.priority,
            domains,
            client_cidrs,
            query_types,
            upstreams: Arc::from(upstreams.into_boxed_slice()),
            timeout: config.timeout_ms.map(Duration::from_millis),
            max_retries: config.max_retries,
            failover: config.failover,
        })
    }

    pub fn global_plan(&self) -> RoutePlan {
        self.global.clone()
    }
}

impl ForwardingRulesPort for ForwardingRuleSet {
    fn evaluate(&self, domain: &str, client_ip: IpAddr, qtype: RecordType) -> Option<RoutePlan> {
        for rule in self.rules.iter().filter(|r| r.enabled) {
            if rule.matches(domain, client_ip, qtype) {
                return Some(RoutePlan {
                    rule_name: Some(Arc::clone(&rule.name)),
                    upstreams: rule.upstreams.clone(),
                    timeout: rule.timeout.unwrap_or(self.global.timeout),
                    max_retries: rule.max_retries.unwrap_or(self.global.max_retries),
                    failover: rule.failover,
                });
            }
        }
        None
    }

    fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global_plan() -> RoutePlan {
        RoutePlan {
            rule_name: None,
            upstreams: Arc::from(
                vec!["1.1.1.1:53".parse::<SocketAddr>().unwrap()].into_boxed_slice(),
            ),
            timeout: Duration::from_secs(5),
            max_retries: 2,
            failover: true,
        }
    }

    fn rule(name: &str, priority: u8, domains: &[&str], upstream: &str) -> ForwardingRuleConfig {
        ForwardingRuleConfig {
            name: name.to_string(),
            enabled: true,
            priority,
            domains: domains.iter().map(|d| d.to_string()).collect(),
            client_cidrs: vec![],
            query_types: vec![],
            upstreams: vec![upstream.to_string()],
            timeout_ms: None,
            max_retries: None,
            failover: true,
        }
    }

    fn rule_set(rules: Vec<ForwardingRuleConfig>) -> ForwardingRuleSet {
        ForwardingRuleSet::from_config(
            &ConditionalForwardingConfig {
                enabled: true,
                rules,
            },
            global_plan(),
        )
        .unwrap()
    }

    #[test]
    fn higher_priority_fires_first() {
        let set = rule_set(vec![
            rule("lan", 50, &["*.local"], "10.0.0.1:53"),
            rule("corp", 80, &["*.corp.local"], "10.0.0.53:53"),
        ]);

        let plan = set
            .evaluate("host.corp.local", "192.168.1.10".parse().unwrap(), RecordType::A)
            .unwrap();
        assert_eq!(plan.rule_name.as_deref(), Some("corp"));
        assert_eq!(plan.upstreams[0], "10.0.0.53:53".parse().unwrap());

        let plan = set
            .evaluate("host.other.local", "192.168.1.10".parse().unwrap(), RecordType::A)
            .unwrap();
        assert_eq!(plan.rule_name.as_deref(), Some("lan"));
        assert_eq!(plan.upstreams[0], "10.0.0.1:53".parse().unwrap());
    }

    #[test]
    fn ties_keep_insertion_order() {
        let set = rule_set(vec![
            rule("first", 50, &["*.local"], "10.0.0.1:53"),
            rule("second", 50, &["*.local"], "10.0.0.2:53"),
        ]);
        let plan = set
            .evaluate("nas.local", "192.168.1.10".parse().unwrap(), RecordType::A)
            .unwrap();
        assert_eq!(plan.rule_name.as_deref(), Some("first"));
    }

    #[test]
    fn matchers_are_a_conjunction() {
        let mut config = rule("strict", 60, &["*.corp.local"], "10.0.0.53:53");
        config.client_cidrs = vec!["192.168.0.0/16".to_string()];
        config.query_types = vec!["A".to_string()];
        let set = rule_set(vec![config]);

        assert!(set
            .evaluate("git.corp.local", "192.168.1.10".parse().unwrap(), RecordType::A)
            .is_some());
        // wrong client subnet
        assert!(set
            .evaluate("git.corp.local", "10.1.1.10".parse().unwrap(), RecordType::A)
            .is_none());
        // wrong query type
        assert!(set
            .evaluate("git.corp.local", "192.168.1.10".parse().unwrap(), RecordType::MX)
            .is_none());
    }

    #[test]
    fn no_match_returns_none() {
        let set = rule_set(vec![rule("lan", 50, &["*.local"], "10.0.0.1:53")]);
        assert!(set
            .evaluate("example.com", "192.168.1.10".parse().unwrap(), RecordType::A)
            .is_none());
    }

    #[test]
    fn per_rule_overrides_apply() {
        let mut config = rule("slow", 50, &["*.slow.local"], "10.0.0.9:53");
        config.timeout_ms = Some(12_000);
        config.max_retries = Some(7);
        let set = rule_set(vec![config]);
        let plan = set
            .evaluate("db.slow.local", "192.168.1.10".parse().unwrap(), RecordType::A)
            .unwrap();
        assert_eq!(plan.timeout, Duration::from_secs(12));
        assert_eq!(plan.max_retries, 7);
    }

    #[test]
    fn invalid_cidr_rejects_rule_set() {
        let mut config = rule("bad", 50, &[], "10.0.0.1:53");
        config.client_cidrs = vec!["300.0.0.0/8".to_string()];
        assert!(ForwardingRuleSet::from_config(
            &ConditionalForwardingConfig {
                enabled: true,
                rules: vec![config],
            },
            global_plan(),
        )
        .is_err());
    }
}
