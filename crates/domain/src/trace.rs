use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Pipeline stage identifiers, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    RateLimit,
    LocalRecords,
    Cache,
    KillSwitch,
    Whitelist,
    Blocklist,
    Policy,
    ConditionalForwarding,
    Forwarder,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::RateLimit => "rate_limit",
            Stage::LocalRecords => "local_records",
            Stage::Cache => "cache",
            Stage::KillSwitch => "kill_switch",
            Stage::Whitelist => "whitelist",
            Stage::Blocklist => "blocklist",
            Stage::Policy => "policy",
            Stage::ConditionalForwarding => "conditional_forwarding",
            Stage::Forwarder => "forwarder",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One per-stage breadcrumb: which stage decided, what it did, and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub stage: Stage,
    /// Short verb: "blocked", "allowed", "redirected", "forwarded", "hit", ...
    pub action: Arc<str>,
    /// Rule name when a named rule made the decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<Arc<str>>,
    /// Source identifier (blocklist URL, upstream address, record origin).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Arc<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Arc<str>>,
}

/// Ordered list of stage decisions for one query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub steps: Vec<TraceStep>,
}

impl DecisionTrace {
    /// True when any step was recorded by the given stage.
    pub fn has_stage(&self, stage: Stage) -> bool {
        self.steps.iter().any(|s| s.stage == stage)
    }
}

/// Accumulates stage decisions while a query traverses the pipeline.
///
/// A disabled builder (`decision_trace = false`) still records blocklist
/// steps: the cache needs them to find sinkholed entries when a new
/// blocklist snapshot is published.
#[derive(Debug)]
pub struct TraceBuilder {
    enabled: bool,
    steps: Vec<TraceStep>,
}

impl TraceBuilder {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            steps: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, step: TraceStep) {
        if self.enabled || step.stage == Stage::Blocklist {
            self.steps.push(step);
        }
    }

    pub fn step(&mut self, stage: Stage, action: &str) {
        self.record(TraceStep {
            stage,
            action: Arc::from(action),
            rule: None,
            source: None,
            detail: None,
        });
    }

    pub fn step_with_rule(&mut self, stage: Stage, action: &str, rule: &str) {
        self.record(TraceStep {
            stage,
            action: Arc::from(action),
            rule: Some(Arc::from(rule)),
            source: None,
            detail: None,
        });
    }

    pub fn step_with_detail(&mut self, stage: Stage, action: &str, detail: &str) {
        self.record(TraceStep {
            stage,
            action: Arc::from(action),
            rule: None,
            source: None,
            detail: Some(Arc::from(detail)),
        });
    }

    pub fn step_with_source(&mut self, stage: Stage, action: &str, source: &str) {
        self.record(TraceStep {
            stage,
            action: Arc::from(action),
            rule: None,
            source: Some(Arc::from(source)),
            detail: None,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn build(self) -> DecisionTrace {
        DecisionTrace { steps: self.steps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_builder_keeps_blocklist_steps_only() {
        let mut b = TraceBuilder::new(false);
        b.step(Stage::Cache, "miss");
        b.step_with_source(Stage::Blocklist, "blocked", "https://list.example/hosts");
        let trace = b.build();
        assert_eq!(trace.steps.len(), 1);
        assert!(trace.has_stage(Stage::Blocklist));
    }

    #[test]
    fn enabled_builder_records_in_order() {
        let mut b = TraceBuilder::new(true);
        b.step(Stage::Cache, "miss");
        b.step_with_rule(Stage::Policy, "redirected", "lan-redirect");
        let trace = b.build();
        assert_eq!(trace.steps.len(), 2);
        assert_eq!(trace.steps[0].stage, Stage::Cache);
        assert_eq!(trace.steps[1].rule.as_deref(), Some("lan-redirect"));
    }
}
