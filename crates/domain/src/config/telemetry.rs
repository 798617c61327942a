use serde::{Deserialize, Serialize};

/// Telemetry exporter wiring. The exporters themselves live outside the
/// core; the pipeline only feeds the in-process counters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default)]
    pub prometheus_enabled: bool,

    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: default_service_name(),
            prometheus_enabled: false,
            prometheus_port: default_prometheus_port(),
        }
    }
}

fn default_service_name() -> String {
    "glory-hole".to_string()
}

fn default_prometheus_port() -> u16 {
    9090
}
