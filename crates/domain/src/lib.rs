//! Glory-Hole Domain Layer
pub mod config;
pub mod errors;
pub mod local_record;
pub mod policy;
pub mod query;
pub mod record_type;
pub mod trace;

pub use config::{parse_upstream_addr, CliOverrides, Config, ConfigError};
pub use errors::DomainError;
pub use local_record::{CaaTag, LocalRecord, RecordData, SoaData, SrvData};
pub use policy::{
    BucketStrategy, PolicyAction, PolicyContext, RateLimitSpec, ViolationAction,
};
pub use query::{normalize_domain, DnsQuery};
pub use record_type::RecordType;
pub use trace::{DecisionTrace, Stage, TraceBuilder, TraceStep};
