use serde::{Deserialize, Serialize};

/// One policy rule as written in the configuration file.
///
/// The `logic` expression is compiled when the rule is added to the engine;
/// compile failures reject the rule at load time.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PolicyRuleConfig {
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Expression over the policy context, e.g.
    /// `Domain == "tracker.example.com" && Hour >= 22`.
    pub logic: String,

    /// One of BLOCK, ALLOW, REDIRECT, FORWARD, RATE_LIMIT.
    pub action: String,

    /// Action payload: redirect IP, upstream list, or rate-limit descriptor.
    #[serde(default)]
    pub action_data: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Evaluated in listed order; first match wins.
    #[serde(default)]
    pub rules: Vec<PolicyRuleConfig>,
}

fn default_true() -> bool {
    true
}
