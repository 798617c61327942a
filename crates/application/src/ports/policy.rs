use glory_hole_domain::{PolicyAction, PolicyContext, RateLimitSpec};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Outcome of the first matching policy rule.
///
/// Exactly one of the payload fields is populated, according to `action`;
/// the engine validated the pairing when the rule was added.
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub rule_name: Arc<str>,
    pub action: PolicyAction,
    pub redirect_ip: Option<IpAddr>,
    pub forward_upstreams: Option<Arc<[SocketAddr]>>,
    pub rate_limit: Option<RateLimitSpec>,
}

/// Ordered first-match-wins rule evaluation.
pub trait PolicyEnginePort: Send + Sync {
    /// Returns the decision of the first enabled rule whose expression is
    /// truthy, or `None`. Runtime evaluation errors are logged by the
    /// implementation and treated as non-matches.
    fn evaluate(&self, ctx: &PolicyContext) -> Option<PolicyDecision>;

    fn rule_count(&self) -> usize;
}
