use crate::record_type::RecordType;
use std::net::IpAddr;
use std::sync::Arc;

/// A single inbound DNS question, normalized on ingress.
///
/// The domain is lowercased and stripped of its trailing dot so that every
/// downstream consumer (cache fingerprint, blocklist lookup, pattern
/// matching) sees one canonical spelling.
#[derive(Debug, Clone)]
pub struct DnsQuery {
    pub domain: Arc<str>,
    pub record_type: RecordType,
    pub client_ip: IpAddr,
}

impl DnsQuery {
    pub fn new(domain: &str, record_type: RecordType, client_ip: IpAddr) -> Self {
        Self {
            domain: Arc::from(normalize_domain(domain)),
            record_type,
            client_ip,
        }
    }
}

/// Lowercase and strip the trailing dot of a domain name.
pub fn normalize_domain(domain: &str) -> String {
    let trimmed = domain.strip_suffix('.').unwrap_or(domain);
    trimmed.to_ascii_lowercase()
}
