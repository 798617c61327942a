use crate::errors::DomainError;
use crate::local_record::{CaaTag, LocalRecord, RecordData, SoaData, SrvData};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};

/// One static record as written in the configuration file.
///
/// The flat shape keeps the TOML readable; `parse()` turns it into the typed
/// `LocalRecord` and rejects inconsistent combinations at load time.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LocalRecordEntry {
    /// Domain name; a `*.` prefix makes the record a wildcard.
    pub domain: String,

    /// Record type name: A, AAAA, CNAME, TXT, MX, PTR, SRV, NS, SOA, CAA.
    pub record_type: String,

    /// A/AAAA addresses, TXT strings, or the single CNAME/PTR/NS target.
    #[serde(default)]
    pub values: Vec<String>,

    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// MX preference or SRV priority.
    #[serde(default)]
    pub priority: Option<u16>,

    /// SRV weight.
    #[serde(default)]
    pub weight: Option<u16>,

    /// SRV port.
    #[serde(default)]
    pub port: Option<u16>,

    /// MX/SRV target.
    #[serde(default)]
    pub target: Option<String>,

    // SOA fields
    #[serde(default)]
    pub mbox: Option<String>,
    #[serde(default)]
    pub serial: Option<u32>,
    #[serde(default)]
    pub refresh: Option<i32>,
    #[serde(default)]
    pub retry: Option<i32>,
    #[serde(default)]
    pub expire: Option<i32>,
    #[serde(default)]
    pub minttl: Option<u32>,

    // CAA fields
    #[serde(default)]
    pub flag: Option<u8>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl LocalRecordEntry {
    pub fn parse(&self) -> Result<LocalRecord, DomainError> {
        let data = match self.record_type.to_ascii_uppercase().as_str() {
            "A" => {
                let addrs = self
                    .values
                    .iter()
                    .map(|v| {
                        v.parse::<Ipv4Addr>()
                            .map_err(|_| DomainError::InvalidIpAddress(v.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if addrs.is_empty() {
                    return Err(self.invalid("A record needs at least one address"));
                }
                RecordData::A(addrs)
            }
            "AAAA" => {
                let addrs = self
                    .values
                    .iter()
                    .map(|v| {
                        v.parse::<Ipv6Addr>()
                            .map_err(|_| DomainError::InvalidIpAddress(v.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if addrs.is_empty() {
                    return Err(self.invalid("AAAA record needs at least one address"));
                }
                RecordData::Aaaa(addrs)
            }
            "CNAME" => RecordData::Cname(self.single_value("CNAME")?),
            "TXT" => {
                if self.values.is_empty() {
                    return Err(self.invalid("TXT record needs at least one string"));
                }
                for s in &self.values {
                    if s.len() > 255 {
                        return Err(self.invalid("TXT string exceeds 255 bytes"));
                    }
                }
                RecordData::Txt(self.values.clone())
            }
            "MX" => RecordData::Mx {
                preference: self
                    .priority
                    .ok_or_else(|| self.invalid("MX record needs a priority"))?,
                target: self
                    .target
                    .clone()
                    .ok_or_else(|| self.invalid("MX record needs a target"))?,
            },
            "PTR" => RecordData::Ptr(self.single_value("PTR")?),
            "SRV" => RecordData::Srv(SrvData {
                priority: self
                    .priority
                    .ok_or_else(|| self.invalid("SRV record needs a priority"))?,
                weight: self.weight.unwrap_or(0),
                port: self
                    .port
                    .ok_or_else(|| self.invalid("SRV record needs a port"))?,
                target: self
                    .target
                    .clone()
                    .ok_or_else(|| self.invalid("SRV record needs a target"))?,
            }),
            "NS" => RecordData::Ns(self.single_value("NS")?),
            "SOA" => RecordData::Soa(SoaData {
                ns: self.single_value("SOA")?,
                mbox: self
                    .mbox
                    .clone()
                    .ok_or_else(|| self.invalid("SOA record needs an mbox"))?,
                serial: self.serial.unwrap_or(1),
                refresh: self.refresh.unwrap_or(7200),
                retry: self.retry.unwrap_or(900),
                expire: self.expire.unwrap_or(1_209_600),
                minttl: self.minttl.unwrap_or(300),
            }),
            "CAA" => RecordData::Caa {
                flag: self.flag.unwrap_or(0),
                tag: self
                    .tag
                    .as_deref()
                    .ok_or_else(|| self.invalid("CAA record needs a tag"))?
                    .parse::<CaaTag>()?,
                value: self
                    .value
                    .clone()
                    .ok_or_else(|| self.invalid("CAA record needs a value"))?,
            },
            other => {
                return Err(self.invalid(&format!("Unsupported local record type: {}", other)))
            }
        };

        Ok(LocalRecord::new(&self.domain, self.ttl, data))
    }

    fn single_value(&self, kind: &str) -> Result<String, DomainError> {
        match self.values.as_slice() {
            [one] => Ok(one.clone()),
            _ => Err(self.invalid(&format!("{} record needs exactly one value", kind))),
        }
    }

    fn invalid(&self, reason: &str) -> DomainError {
        DomainError::InvalidDomainName(format!("{}: {}", self.domain, reason))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct LocalRecordsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub records: Vec<LocalRecordEntry>,
}

impl LocalRecordsConfig {
    /// Parse every entry, failing on the first invalid one.
    pub fn parse_records(&self) -> Result<Vec<LocalRecord>, DomainError> {
        self.records.iter().map(|e| e.parse()).collect()
    }
}

fn default_ttl() -> u32 {
    300
}
