//! Expression-based policy engine.
//!
//! Rules are compiled when added and evaluated in configuration order
//! against each query's context; the first truthy rule wins. Runtime
//! evaluation errors skip the failing rule and keep scanning.

pub mod expr;

use expr::Program;
use glory_hole_application::ports::{PolicyDecision, PolicyEnginePort};
use glory_hole_domain::config::PolicyRuleConfig;
use glory_hole_domain::{
    parse_upstream_addr, DomainError, PolicyAction, PolicyContext, RateLimitSpec,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

struct CompiledRule {
    name: Arc<str>,
    enabled: bool,
    program: Program,
    action: PolicyAction,
    redirect_ip: Option<IpAddr>,
    forward_upstreams: Option<Arc<[SocketAddr]>>,
    rate_limit: Option<RateLimitSpec>,
}

impl CompiledRule {
    fn decision(&self) -> PolicyDecision {
        PolicyDecision {
            rule_name: Arc::clone(&self.name),
            action: self.action,
            redirect_ip: self.redirect_ip,
            forward_upstreams: self.forward_upstreams.clone(),
            rate_limit: self.rate_limit,
        }
    }
}

/// Rule summary for the management surface.
#[derive(Debug, Clone)]
pub struct RuleInfo {
    pub name: Arc<str>,
    pub enabled: bool,
    pub logic: String,
    pub action: PolicyAction,
}

#[derive(Default)]
pub struct PolicyEngine {
    rules: RwLock<Vec<CompiledRule>>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an engine from configuration, rejecting the whole set on the
    /// first invalid rule.
    pub fn from_config(rules: &[PolicyRuleConfig]) -> Result<Self, DomainError> {
        let engine = Self::new();
        for rule in rules {
            engine.add_rule(rule)?;
        }
        Ok(engine)
    }

    /// Compile and append one rule. The expression and the action data are
    /// both validated here so a bad rule can never reach evaluation.
    pub fn add_rule(&self, config: &PolicyRuleConfig) -> Result<(), DomainError> {
        let action: PolicyAction = config.action.parse().map_err(|_| {
            DomainError::InvalidRule {
                rule: config.name.clone(),
                reason: format!("unknown action: {}", config.action),
            }
        })?;

        let program = Program::compile(&config.logic).map_err(|e| DomainError::InvalidRule {
            rule: config.name.clone(),
            reason: e.to_string(),
        })?;

        let mut redirect_ip = None;
        let mut forward_upstreams = None;
        let mut rate_limit = None;

        match action {
            PolicyAction::Block | PolicyAction::Allow => {}
            PolicyAction::Redirect => {
                redirect_ip =
                    Some(config.action_data.trim().parse::<IpAddr>().map_err(|_| {
                        DomainError::InvalidRule {
                            rule: config.name.clone(),
                            reason: format!(
                                "REDIRECT needs a parseable IP, found '{}'",
                                config.action_data
                            ),
                        }
                    })?);
            }
            PolicyAction::Forward => {
                let upstreams: Vec<SocketAddr> = config
                    .action_data
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        parse_upstream_addr(s).ok_or_else(|| DomainError::InvalidRule {
                            rule: config.name.clone(),
                            reason: format!("FORWARD upstream is not an address: '{}'", s),
                        })
                    })
                    .collect::<Result<_, _>>()?;
                if upstreams.is_empty() {
                    return Err(DomainError::InvalidRule {
                        rule: config.name.clone(),
                        reason: "FORWARD needs a non-empty upstream list".to_string(),
                    });
                }
                forward_upstreams = Some(Arc::from(upstreams.into_boxed_slice()));
            }
            PolicyAction::RateLimit => {
                rate_limit = Some(config.action_data.parse::<RateLimitSpec>().map_err(|e| {
                    DomainError::InvalidRule {
                        rule: config.name.clone(),
                        reason: e.to_string(),
                    }
                })?);
            }
        }

        let mut rules = self.rules.write().unwrap();
        rules.push(CompiledRule {
            name: Arc::from(config.name.as_str()),
            enabled: config.enabled,
            program,
            action,
            redirect_ip,
            forward_upstreams,
            rate_limit,
        });

        info!(rule = %config.name, action = %action, "Policy rule added");
        Ok(())
    }

    pub fn remove_rule(&self, name: &str) -> bool {
        let mut rules = self.rules.write().unwrap();
        let before = rules.len();
        rules.retain(|r| &*r.name != name);
        before != rules.len()
    }

    pub fn clear(&self) {
        self.rules.write().unwrap().clear();
    }

    pub fn get_rules(&self) -> Vec<RuleInfo> {
        self.rules
            .read()
            .unwrap()
            .iter()
            .map(|r| RuleInfo {
                name: Arc::clone(&r.name),
                enabled: r.enabled,
                logic: r.program.source().to_string(),
                action: r.action,
            })
            .collect()
    }
}

impl PolicyEnginePort for PolicyEngine {
    fn evaluate(&self, ctx: &PolicyContext) -> Option<PolicyDecision> {
        let rules = self.rules.read().unwrap();
        for rule in rules.iter().filter(|r| r.enabled) {
            match rule.program.matches(ctx) {
                Ok(true) => return Some(rule.decision()),
                Ok(false) => {}
                Err(e) => {
                    warn!(rule = %rule.name, error = %e, "Policy rule evaluation failed; skipping rule");
                }
            }
        }
        None
    }

    fn rule_count(&self) -> usize {
        self.rules.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glory_hole_domain::{BucketStrategy, RecordType, ViolationAction};

    fn rule(name: &str, logic: &str, action: &str, data: &str) -> PolicyRuleConfig {
        PolicyRuleConfig {
            name: name.to_string(),
            enabled: true,
            logic: logic.to_string(),
            action: action.to_string(),
            action_data: data.to_string(),
        }
    }

    fn ctx(domain: &str) -> PolicyContext {
        PolicyContext::new(Arc::from(domain), "10.0.0.1".parse().unwrap(), RecordType::A)
    }

    #[test]
    fn first_match_wins() {
        let engine = PolicyEngine::new();
        engine
            .add_rule(&rule("r1", r#"DomainEndsWith(".example.com")"#, "BLOCK", ""))
            .unwrap();
        engine
            .add_rule(&rule(
                "r2",
                r#"Domain == "ads.example.com""#,
                "REDIRECT",
                "10.0.0.1",
            ))
            .unwrap();

        let decision = engine.evaluate(&ctx("ads.example.com")).unwrap();
        assert_eq!(&*decision.rule_name, "r1");
        assert_eq!(decision.action, PolicyAction::Block);
    }

    #[test]
    fn disabled_rules_are_skipped() {
        let engine = PolicyEngine::new();
        let mut disabled = rule("off", "true", "BLOCK", "");
        disabled.enabled = false;
        engine.add_rule(&disabled).unwrap();
        assert!(engine.evaluate(&ctx("x.example")).is_none());
    }

    #[test]
    fn redirect_requires_parseable_ip() {
        let engine = PolicyEngine::new();
        assert!(engine
            .add_rule(&rule("bad", "true", "REDIRECT", "not-an-ip"))
            .is_err());
        engine
            .add_rule(&rule("good", "true", "REDIRECT", "10.1.2.3"))
            .unwrap();
        let decision = engine.evaluate(&ctx("x.example")).unwrap();
        assert_eq!(decision.redirect_ip, Some("10.1.2.3".parse().unwrap()));
    }

    #[test]
    fn forward_parses_upstream_list() {
        let engine = PolicyEngine::new();
        assert!(engine.add_rule(&rule("bad", "true", "FORWARD", "")).is_err());
        engine
            .add_rule(&rule("good", "true", "FORWARD", "10.0.0.53:53, 10.0.0.54"))
            .unwrap();
        let decision = engine.evaluate(&ctx("x.example")).unwrap();
        let upstreams = decision.forward_upstreams.unwrap();
        assert_eq!(upstreams.len(), 2);
        assert_eq!(upstreams[1], "10.0.0.54:53".parse().unwrap());
    }

    #[test]
    fn rate_limit_descriptor_is_validated_at_add_time() {
        let engine = PolicyEngine::new();
        assert!(engine
            .add_rule(&rule("bad", "true", "RATE_LIMIT", "rps=zero"))
            .is_err());
        engine
            .add_rule(&rule(
                "good",
                "true",
                "RATE_LIMIT",
                "rps=2,burst=4,action=nxdomain,bucket=rule",
            ))
            .unwrap();
        let spec = engine.evaluate(&ctx("x.example")).unwrap().rate_limit.unwrap();
        assert_eq!(spec.burst, 4);
        assert_eq!(spec.action, ViolationAction::Nxdomain);
        assert_eq!(spec.bucket, BucketStrategy::Rule);
    }

    #[test]
    fn bad_expression_rejects_rule() {
        let engine = PolicyEngine::new();
        assert!(engine
            .add_rule(&rule("bad", r#"Domain =="#, "BLOCK", ""))
            .is_err());
        assert_eq!(engine.rule_count(), 0);
    }

    #[test]
    fn remove_and_clear() {
        let engine = PolicyEngine::new();
        engine.add_rule(&rule("r1", "true", "BLOCK", "")).unwrap();
        engine.add_rule(&rule("r2", "true", "BLOCK", "")).unwrap();
        assert!(engine.remove_rule("r1"));
        assert!(!engine.remove_rule("r1"));
        assert_eq!(engine.rule_count(), 1);
        engine.clear();
        assert_eq!(engine.rule_count(), 0);
    }
}
