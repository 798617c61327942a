use crate::errors::DomainError;
use crate::record_type::RecordType;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// SRV record payload. Answers are sorted by ascending priority, then
/// descending weight, per RFC 2782.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrvData {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: String,
}

/// SOA record payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoaData {
    pub ns: String,
    pub mbox: String,
    pub serial: u32,
    pub refresh: i32,
    pub retry: i32,
    pub expire: i32,
    pub minttl: u32,
}

/// CAA property tags from RFC 8659.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaaTag {
    Issue,
    IssueWild,
    Iodef,
}

impl FromStr for CaaTag {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "issue" => Ok(CaaTag::Issue),
            "issuewild" => Ok(CaaTag::IssueWild),
            "iodef" => Ok(CaaTag::Iodef),
            other => Err(DomainError::InvalidDomainName(format!(
                "Unknown CAA tag: {}",
                other
            ))),
        }
    }
}

/// Typed payload of a static local record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordData {
    A(Vec<Ipv4Addr>),
    Aaaa(Vec<Ipv6Addr>),
    Cname(String),
    /// Each string is limited to 255 bytes on the wire; longer strings are
    /// rejected at config-load time.
    Txt(Vec<String>),
    Mx {
        preference: u16,
        target: String,
    },
    Ptr(String),
    Srv(SrvData),
    Ns(String),
    Soa(SoaData),
    Caa {
        flag: u8,
        tag: CaaTag,
        value: String,
    },
}

impl RecordData {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordData::A(_) => RecordType::A,
            RecordData::Aaaa(_) => RecordType::AAAA,
            RecordData::Cname(_) => RecordType::CNAME,
            RecordData::Txt(_) => RecordType::TXT,
            RecordData::Mx { .. } => RecordType::MX,
            RecordData::Ptr(_) => RecordType::PTR,
            RecordData::Srv(_) => RecordType::SRV,
            RecordData::Ns(_) => RecordType::NS,
            RecordData::Soa(_) => RecordType::SOA,
            RecordData::Caa { .. } => RecordType::CAA,
        }
    }
}

/// One entry of the static local-records table.
///
/// `name` is stored lowercased and without the `*.` prefix; `wildcard`
/// carries the distinction. A wildcard record matches any subdomain of its
/// base but never the base itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRecord {
    pub name: String,
    pub wildcard: bool,
    pub ttl: u32,
    pub data: RecordData,
}

impl LocalRecord {
    pub fn new(name: &str, ttl: u32, data: RecordData) -> Self {
        let lowered = name.to_ascii_lowercase();
        let (name, wildcard) = match lowered.strip_prefix("*.") {
            Some(base) => (base.to_string(), true),
            None => (lowered, false),
        };
        Self {
            name,
            wildcard,
            ttl,
            data,
        }
    }

    /// Whether this record answers queries for `domain` (already lowercased).
    pub fn matches(&self, domain: &str) -> bool {
        if self.wildcard {
            domain.len() > self.name.len() + 1
                && domain.ends_with(&self.name)
                && domain.as_bytes()[domain.len() - self.name.len() - 1] == b'.'
        } else {
            domain == self.name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_subdomains_not_base() {
        let rec = LocalRecord::new("*.example.com", 300, RecordData::A(vec![[10, 0, 0, 1].into()]));
        assert!(rec.wildcard);
        assert!(rec.matches("x.example.com"));
        assert!(rec.matches("y.x.example.com"));
        assert!(!rec.matches("example.com"));
        assert!(!rec.matches("notexample.com"));
    }

    #[test]
    fn exact_record_matches_only_itself() {
        let rec = LocalRecord::new("NAS.Home.lan", 300, RecordData::A(vec![[10, 0, 0, 2].into()]));
        assert!(!rec.wildcard);
        assert!(rec.matches("nas.home.lan"));
        assert!(!rec.matches("x.nas.home.lan"));
    }

    #[test]
    fn caa_tag_parses_known_values() {
        assert_eq!("issue".parse::<CaaTag>().unwrap(), CaaTag::Issue);
        assert_eq!("ISSUEWILD".parse::<CaaTag>().unwrap(), CaaTag::IssueWild);
        assert!("unknown".parse::<CaaTag>().is_err());
    }
}
