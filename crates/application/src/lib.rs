//! Glory-Hole Application Layer
//!
//! Capability ports consumed by the handler pipeline, plus the small pieces
//! of process-wide state (kill switch, readiness) that sit between the core
//! and the management API.
pub mod health;
pub mod kill_switch;
pub mod ports;

pub use health::ReadinessState;
pub use kill_switch::KillSwitch;
