pub mod health;

pub use health::{api_health, health_check, ready_check};
