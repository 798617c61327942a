//! Background jobs: blocklist refresh, cache sweeping, rate-limit bucket
//! cleanup, and configuration watching. Every job runs on an interval, obeys
//! the shared cancellation token, and is restarted by the runner if it exits
//! unexpectedly.
pub mod blocklist_sync;
pub mod cache_maintenance;
pub mod config_watch;
pub mod rate_limit_sweep;
pub mod runner;

pub use blocklist_sync::BlocklistSyncJob;
pub use cache_maintenance::CacheMaintenanceJob;
pub use config_watch::ConfigWatchJob;
pub use rate_limit_sweep::RateLimitSweepJob;
pub use runner::JobRunner;
