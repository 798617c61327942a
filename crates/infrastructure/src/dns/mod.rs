pub mod blocklist;
pub mod cache;
pub mod forwarder;
pub mod forwarding_rules;
pub mod handler;
pub mod local_records;
pub mod matcher;
pub mod message;
pub mod policy;
pub mod rate_limit;
pub mod record_map;
pub mod server;
pub mod sink;
pub mod whitelist;

pub use blocklist::BlocklistManager;
pub use cache::ShardedCache;
pub use forwarder::http_resolver::UpstreamResolver;
pub use forwarder::Forwarder;
pub use forwarding_rules::ForwardingRuleSet;
pub use handler::{PipelineState, QueryHandler, RateLimitSettings, Reply};
pub use local_records::LocalRecordTable;
pub use matcher::{Matcher, Pattern};
pub use policy::PolicyEngine;
pub use rate_limit::RateLimiter;
pub use server::DnsServer;
pub use sink::{ChannelLogSink, NullLogSink, TracingLogWriter};
pub use whitelist::Whitelist;
