use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// DNS bind address. Not hot-reloadable; restart to apply.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Management API bind address. Not hot-reloadable; restart to apply.
    #[serde(default = "default_web_ui_address")]
    pub web_ui_address: String,

    #[serde(default = "default_true")]
    pub tcp_enabled: bool,

    #[serde(default = "default_true")]
    pub udp_enabled: bool,

    /// Attach per-stage decision traces to blocked responses and log entries.
    #[serde(default)]
    pub decision_trace: bool,

    /// Bound on graceful shutdown, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            web_ui_address: default_web_ui_address(),
            tcp_enabled: true,
            udp_enabled: true,
            decision_trace: false,
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_listen_address() -> String {
    "0.0.0.0:53".to_string()
}

fn default_web_ui_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_true() -> bool {
    true
}

fn default_shutdown_timeout() -> u64 {
    5
}
