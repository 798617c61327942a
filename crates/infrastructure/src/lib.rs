//! Glory-Hole Infrastructure Layer
//!
//! The query pipeline core: sharded cache, blocklist manager, pattern
//! matcher, policy engine, conditional forwarding, upstream forwarder,
//! local records, rate limiter, the handler that sequences them, and the
//! UDP/TCP edge.
pub mod dns;
pub mod metrics;

pub use metrics::ServerMetrics;
