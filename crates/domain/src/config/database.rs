use serde::{Deserialize, Serialize};

/// Query-log storage settings. The core only checks `enabled`; the backend
/// is owned by the external storage layer behind the `QueryLogSink` port.
/// Not hot-reloadable; restart to apply.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default)]
    pub path: Option<String>,

    /// Capacity of the in-memory sink buffer between the hot path and the
    /// drain task. Overflow increments `storage.queries.dropped`.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: default_backend(),
            path: None,
            buffer_size: default_buffer_size(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}

fn default_buffer_size() -> usize {
    8192
}
