use async_trait::async_trait;
use glory_hole_domain::DomainError;
use std::sync::Arc;

/// Last-refresh outcome for one source URL.
#[derive(Debug, Clone)]
pub struct SourceStatus {
    pub url: Arc<str>,
    pub domains: usize,
    pub last_success_unix: Option<u64>,
    pub last_error: Option<Arc<str>>,
}

#[derive(Debug, Clone, Default)]
pub struct BlocklistStats {
    pub total_domains: usize,
    pub sources: Vec<SourceStatus>,
    pub last_refresh_unix: Option<u64>,
}

/// The atomically-published blocked-domain set.
#[async_trait]
pub trait BlocklistPort: Send + Sync {
    /// Membership test against the current snapshot. Lock-free; `domain`
    /// must already be lowercased.
    fn contains(&self, domain: &str) -> bool;

    /// Fetch all sources and publish a new snapshot. Failed sources keep
    /// their previous contribution.
    async fn refresh(&self) -> Result<(), DomainError>;

    /// True once the initial refresh attempt has completed (even if every
    /// source failed).
    fn loaded(&self) -> bool;

    fn stats(&self) -> BlocklistStats;
}
