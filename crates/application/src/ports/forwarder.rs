use super::forwarding_rules::RoutePlan;
use async_trait::async_trait;
use bytes::Bytes;
use glory_hole_domain::DomainError;

/// Upstream query execution with retry and failover.
#[async_trait]
pub trait ForwarderPort: Send + Sync {
    /// Send `query` (wire format) per `plan` and return the first
    /// well-formed response, id already rewritten to match the query.
    async fn forward(&self, query: &[u8], plan: &RoutePlan) -> Result<Bytes, DomainError>;

    /// Lightweight reachability probe against the plan's upstreams. Used to
    /// flip the readiness endpoint after startup.
    async fn probe(&self, plan: &RoutePlan) -> bool;
}
