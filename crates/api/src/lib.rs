//! Management HTTP surface.
//!
//! Only the pieces the core publishes by reference: liveness, readiness,
//! and the richer `/api/health` JSON. Everything else (query browsing,
//! configuration editing, the web UI) lives outside this repository and
//! consumes the same handles.
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::ApiState;
