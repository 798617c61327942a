use glory_hole_domain::{DecisionTrace, RecordType};
use std::net::IpAddr;
use std::sync::Arc;

/// How the pipeline disposed of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    Answered,
    CacheHit,
    LocalRecord,
    Blocked,
    Redirected,
    RateLimited,
    Dropped,
    ServFail,
    FormErr,
}

impl QueryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOutcome::Answered => "answered",
            QueryOutcome::CacheHit => "cache_hit",
            QueryOutcome::LocalRecord => "local_record",
            QueryOutcome::Blocked => "blocked",
            QueryOutcome::Redirected => "redirected",
            QueryOutcome::RateLimited => "rate_limited",
            QueryOutcome::Dropped => "dropped",
            QueryOutcome::ServFail => "servfail",
            QueryOutcome::FormErr => "formerr",
        }
    }
}

/// One record handed to the persistent query log.
#[derive(Debug, Clone)]
pub struct QueryLogEntry {
    pub timestamp_unix_ms: u64,
    pub domain: Arc<str>,
    pub record_type: RecordType,
    pub client_ip: IpAddr,
    pub outcome: QueryOutcome,
    pub rcode: &'static str,
    pub latency_us: u64,
    pub upstream: Option<Arc<str>>,
    pub rule: Option<Arc<str>>,
    pub trace: Option<Arc<DecisionTrace>>,
}

/// Opaque sink for query-log entries.
///
/// `record` must never block the hot path: implementations buffer and drain
/// in the background, counting overflow instead of applying backpressure.
pub trait QueryLogSink: Send + Sync {
    fn record(&self, entry: QueryLogEntry);

    /// Entries discarded because the buffer was full.
    fn dropped(&self) -> u64;
}
