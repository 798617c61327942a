//! Static local-records table.
//!
//! Exact records live in a map keyed by lowercased name; wildcard records
//! are kept separately and matched by suffix. Lookups return every matching
//! record for the requested type, sorted per RFC where order matters
//! (MX by ascending preference, SRV by ascending priority then descending
//! weight). Writes only happen on hot reload, so a plain `RwLock` is enough.

use glory_hole_domain::{DomainError, LocalRecord, RecordData, RecordType};
use hickory_proto::rr::rdata;
use hickory_proto::rr::{Name, RData, Record};
use rustc_hash::FxHashMap;
use std::str::FromStr;
use std::sync::RwLock;
use tracing::info;

#[derive(Default)]
struct Table {
    exact: FxHashMap<String, Vec<LocalRecord>>,
    wildcards: Vec<LocalRecord>,
}

impl Table {
    fn build(records: Vec<LocalRecord>) -> Self {
        let mut table = Table::default();
        for record in records {
            if record.wildcard {
                table.wildcards.push(record);
            } else {
                table.exact.entry(record.name.clone()).or_default().push(record);
            }
        }
        table
    }
}

#[derive(Default)]
pub struct LocalRecordTable {
    table: RwLock<Table>,
}

impl LocalRecordTable {
    pub fn new(records: Vec<LocalRecord>) -> Self {
        let count = records.len();
        let table = Table::build(records);
        info!(
            records = count,
            wildcards = table.wildcards.len(),
            "Local records loaded"
        );
        Self {
            table: RwLock::new(table),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Swap in a new record set (hot reload).
    pub fn replace(&self, records: Vec<LocalRecord>) {
        let count = records.len();
        *self.table.write().unwrap() = Table::build(records);
        info!(records = count, "Local records replaced");
    }

    pub fn len(&self) -> usize {
        let table = self.table.read().unwrap();
        table.exact.values().map(Vec::len).sum::<usize>() + table.wildcards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records answering `(domain, qtype)`, RFC-sorted. `domain` must be
    /// lowercased. Exact entries shadow wildcards entirely.
    pub fn lookup(&self, domain: &str, qtype: RecordType) -> Vec<LocalRecord> {
        let table = self.table.read().unwrap();
        let mut out: Vec<LocalRecord> = match table.exact.get(domain) {
            Some(records) => records
                .iter()
                .filter(|r| r.data.record_type() == qtype)
                .cloned()
                .collect(),
            None => table
                .wildcards
                .iter()
                .filter(|r| r.matches(domain) && r.data.record_type() == qtype)
                .cloned()
                .collect(),
        };
        sort_records(&mut out);
        out
    }

    /// The CNAME record for `domain`, if any. Used by the pipeline's chain
    /// resolution regardless of the query type.
    pub fn cname(&self, domain: &str) -> Option<LocalRecord> {
        let table = self.table.read().unwrap();
        if let Some(records) = table.exact.get(domain) {
            return records
                .iter()
                .find(|r| matches!(r.data, RecordData::Cname(_)))
                .cloned();
        }
        table
            .wildcards
            .iter()
            .find(|r| r.matches(domain) && matches!(r.data, RecordData::Cname(_)))
            .cloned()
    }

    /// Whether `domain` has any record at all (used to answer NODATA vs
    /// falling through the pipeline).
    pub fn has_any(&self, domain: &str) -> bool {
        let table = self.table.read().unwrap();
        table.exact.contains_key(domain) || table.wildcards.iter().any(|r| r.matches(domain))
    }
}

fn sort_records(records: &mut [LocalRecord]) {
    records.sort_by(|a, b| match (&a.data, &b.data) {
        (
            RecordData::Mx { preference: pa, .. },
            RecordData::Mx { preference: pb, .. },
        ) => pa.cmp(pb),
        (RecordData::Srv(sa), RecordData::Srv(sb)) => sa
            .priority
            .cmp(&sb.priority)
            .then(sb.weight.cmp(&sa.weight)),
        _ => std::cmp::Ordering::Equal,
    });
}

/// Convert one local record to wire answer records, owned by `name` (the
/// queried name, so wildcard answers carry the query's spelling).
pub fn to_answer_records(record: &LocalRecord, name: &Name) -> Result<Vec<Record>, DomainError> {
    let ttl = record.ttl;
    let records = match &record.data {
        RecordData::A(addrs) => addrs
            .iter()
            .map(|ip| Record::from_rdata(name.clone(), ttl, RData::A(rdata::A(*ip))))
            .collect(),
        RecordData::Aaaa(addrs) => addrs
            .iter()
            .map(|ip| Record::from_rdata(name.clone(), ttl, RData::AAAA(rdata::AAAA(*ip))))
            .collect(),
        RecordData::Cname(target) => vec![Record::from_rdata(
            name.clone(),
            ttl,
            RData::CNAME(rdata::CNAME(parse_fqdn(target)?)),
        )],
        RecordData::Txt(strings) => vec![Record::from_rdata(
            name.clone(),
            ttl,
            RData::TXT(rdata::TXT::new(strings.clone())),
        )],
        RecordData::Mx { preference, target } => vec![Record::from_rdata(
            name.clone(),
            ttl,
            RData::MX(rdata::MX::new(*preference, parse_fqdn(target)?)),
        )],
        RecordData::Ptr(target) => vec![Record::from_rdata(
            name.clone(),
            ttl,
            RData::PTR(rdata::PTR(parse_fqdn(target)?)),
        )],
        RecordData::Srv(srv) => vec![Record::from_rdata(
            name.clone(),
            ttl,
            RData::SRV(rdata::SRV::new(
                srv.priority,
                srv.weight,
                srv.port,
                parse_fqdn(&srv.target)?,
            )),
        )],
        RecordData::Ns(target) => vec![Record::from_rdata(
            name.clone(),
            ttl,
            RData::NS(rdata::NS(parse_fqdn(target)?)),
        )],
        RecordData::Soa(soa) => vec![Record::from_rdata(
            name.clone(),
            ttl,
            RData::SOA(rdata::SOA::new(
                parse_fqdn(&soa.ns)?,
                parse_fqdn(&soa.mbox)?,
                soa.serial,
                soa.refresh,
                soa.retry,
                soa.expire,
                soa.minttl,
            )),
        )],
        RecordData::Caa { flag, tag, value } => {
            let issuer_critical = flag & 0x80 != 0;
            let caa = match tag {
                glory_hole_domain::CaaTag::Issue => rdata::CAA::new_issue(
                    issuer_critical,
                    Some(parse_fqdn(value)?),
                    Vec::new(),
                ),
                glory_hole_domain::CaaTag::IssueWild => rdata::CAA::new_issuewild(
                    issuer_critical,
                    Some(parse_fqdn(value)?),
                    Vec::new(),
                ),
                glory_hole_domain::CaaTag::Iodef => {
                    let url = url::Url::parse(value).map_err(|e| {
                        DomainError::InvalidDomainName(format!(
                            "CAA iodef value '{}': {}",
                            value, e
                        ))
                    })?;
                    rdata::CAA::new_iodef(issuer_critical, url)
                }
            };
            vec![Record::from_rdata(name.clone(), ttl, RData::CAA(caa))]
        }
    };
    Ok(records)
}

fn parse_fqdn(s: &str) -> Result<Name, DomainError> {
    let with_root = if s.ends_with('.') {
        s.to_string()
    } else {
        format!("{}.", s)
    };
    Name::from_str(&with_root)
        .map_err(|e| DomainError::InvalidDomainName(format!("'{}': {}", s, e)))
}
