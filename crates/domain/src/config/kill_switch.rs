use serde::{Deserialize, Serialize};

/// Persisted kill-switch state.
///
/// While enabled, the handler skips the whitelist, blocklist, and policy
/// stages and forwards every query. API toggles are written back here so the
/// state survives a restart.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct KillSwitchConfig {
    #[serde(default)]
    pub enabled: bool,

    /// RFC 3339 timestamp after which the switch turns itself off.
    #[serde(default)]
    pub expires_at: Option<String>,
}
