use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid DNS message: {0}")]
    InvalidMessage(String),

    #[error("Invalid domain name: {0}")]
    InvalidDomainName(String),

    #[error("Invalid IP address: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid policy expression: {0}")]
    InvalidExpression(String),

    #[error("Policy evaluation failed: {0}")]
    PolicyEvalError(String),

    #[error("Invalid policy rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("Invalid forwarding rule '{rule}': {reason}")]
    InvalidForwardingRule { rule: String, reason: String },

    #[error("Upstream query timeout")]
    UpstreamTimeout,

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("All upstream servers exhausted")]
    AllUpstreamsFailed,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Blocklist source error: {0}")]
    BlocklistSourceError(String),

    #[error("Configuration reload failed: {0}")]
    ConfigReloadError(String),

    #[error("Query log sink overflow")]
    SinkOverflow,

    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for DomainError {
    fn from(e: std::io::Error) -> Self {
        DomainError::IoError(e.to_string())
    }
}
