use crate::errors::DomainError;
use crate::record_type::RecordType;
use chrono::{Datelike, Local, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

/// The fields a policy expression can see for one query.
///
/// Time fields are captured once when the context is built so every rule in
/// a single evaluation pass observes the same instant. `weekday` counts from
/// Monday = 0 through Sunday = 6.
#[derive(Debug, Clone)]
pub struct PolicyContext {
    pub domain: Arc<str>,
    pub client_ip: IpAddr,
    pub query_type: RecordType,
    pub hour: u32,
    pub minute: u32,
    pub day: u32,
    pub month: u32,
    pub weekday: u32,
}

impl PolicyContext {
    pub fn new(domain: Arc<str>, client_ip: IpAddr, query_type: RecordType) -> Self {
        let now = Local::now();
        Self {
            domain,
            client_ip,
            query_type,
            hour: now.hour(),
            minute: now.minute(),
            day: now.day(),
            month: now.month(),
            weekday: now.weekday().num_days_from_monday(),
        }
    }

    /// Saturday or Sunday.
    pub fn is_weekend(&self) -> bool {
        self.weekday >= 5
    }
}

/// What a matched policy rule does with the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyAction {
    Block,
    Allow,
    Redirect,
    Forward,
    RateLimit,
}

impl PolicyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyAction::Block => "BLOCK",
            PolicyAction::Allow => "ALLOW",
            PolicyAction::Redirect => "REDIRECT",
            PolicyAction::Forward => "FORWARD",
            PolicyAction::RateLimit => "RATE_LIMIT",
        }
    }
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BLOCK" => Ok(PolicyAction::Block),
            "ALLOW" => Ok(PolicyAction::Allow),
            "REDIRECT" => Ok(PolicyAction::Redirect),
            "FORWARD" => Ok(PolicyAction::Forward),
            "RATE_LIMIT" => Ok(PolicyAction::RateLimit),
            other => Err(DomainError::InvalidRule {
                rule: String::new(),
                reason: format!("Unknown action: {}", other),
            }),
        }
    }
}

/// How a rate-limited query is answered once its bucket is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationAction {
    /// No response at all on UDP; the TCP connection is closed.
    Drop,
    /// Synthetic NXDOMAIN, never forwarded.
    Nxdomain,
}

impl FromStr for ViolationAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Ok(ViolationAction::Drop),
            "nxdomain" => Ok(ViolationAction::Nxdomain),
            other => Err(DomainError::InvalidExpression(format!(
                "Unknown violation action: {}",
                other
            ))),
        }
    }
}

/// Which token bucket a rate-limited query consumes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketStrategy {
    Client,
    Rule,
    Domain,
    ClientDomain,
}

impl FromStr for BucketStrategy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "client" => Ok(BucketStrategy::Client),
            "rule" => Ok(BucketStrategy::Rule),
            "domain" => Ok(BucketStrategy::Domain),
            "client+domain" => Ok(BucketStrategy::ClientDomain),
            other => Err(DomainError::InvalidExpression(format!(
                "Unknown bucket strategy: {}",
                other
            ))),
        }
    }
}

/// Parsed RATE_LIMIT action data.
///
/// Grammar: `rps=<float>,burst=<int>,action=drop|nxdomain[,bucket=<strategy>]`.
/// Parsed once at rule-add time; the runtime dispatch reuses the descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitSpec {
    pub rps: f64,
    pub burst: u32,
    pub action: ViolationAction,
    pub bucket: BucketStrategy,
}

impl FromStr for RateLimitSpec {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rps = None;
        let mut burst = None;
        let mut action = None;
        let mut bucket = BucketStrategy::Client;

        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part.split_once('=').ok_or_else(|| {
                DomainError::InvalidExpression(format!("Malformed rate-limit field: {}", part))
            })?;
            match key.trim() {
                "rps" => {
                    let v: f64 = value.trim().parse().map_err(|_| {
                        DomainError::InvalidExpression(format!("Invalid rps: {}", value))
                    })?;
                    if v <= 0.0 {
                        return Err(DomainError::InvalidExpression(
                            "rps must be positive".to_string(),
                        ));
                    }
                    rps = Some(v);
                }
                "burst" => {
                    let v: u32 = value.trim().parse().map_err(|_| {
                        DomainError::InvalidExpression(format!("Invalid burst: {}", value))
                    })?;
                    if v == 0 {
                        return Err(DomainError::InvalidExpression(
                            "burst must be at least 1".to_string(),
                        ));
                    }
                    burst = Some(v);
                }
                "action" => action = Some(value.trim().parse()?),
                "bucket" => bucket = value.trim().parse()?,
                other => {
                    return Err(DomainError::InvalidExpression(format!(
                        "Unknown rate-limit field: {}",
                        other
                    )))
                }
            }
        }

        Ok(RateLimitSpec {
            rps: rps.ok_or_else(|| {
                DomainError::InvalidExpression("rate-limit descriptor missing rps".to_string())
            })?,
            burst: burst.ok_or_else(|| {
                DomainError::InvalidExpression("rate-limit descriptor missing burst".to_string())
            })?,
            action: action.ok_or_else(|| {
                DomainError::InvalidExpression("rate-limit descriptor missing action".to_string())
            })?,
            bucket,
        })
    }
}
