//! DNS message construction and wire helpers.
//!
//! Builds outbound queries and synthetic responses in wire format using
//! `hickory-proto`. Sinkhole shapes follow the blocking convention:
//! A → 0.0.0.0, AAAA → ::, anything else → NXDOMAIN.

use crate::dns::record_map::RecordTypeMapper;
use glory_hole_domain::{DomainError, RecordType};
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata;
use hickory_proto::rr::{Name, RData, Record};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Builds outbound DNS query messages.
pub struct MessageBuilder;

impl MessageBuilder {
    /// Standard recursive query with a random id and RD set.
    pub fn build_query(domain: &str, record_type: RecordType) -> Result<Message, DomainError> {
        let name = Name::from_str(domain).map_err(|e| {
            DomainError::InvalidDomainName(format!("Invalid domain '{}': {}", domain, e))
        })?;

        let mut query = Query::new();
        query.set_name(name);
        query.set_query_type(RecordTypeMapper::to_hickory(record_type));
        query.set_query_class(hickory_proto::rr::DNSClass::IN);

        let mut message = Message::new(fastrand::u16(..), MessageType::Query, OpCode::Query);
        message.set_recursion_desired(true);
        message.add_query(query);
        Ok(message)
    }

    pub fn serialize(message: &Message) -> Result<Vec<u8>, DomainError> {
        message
            .to_vec()
            .map_err(|e| DomainError::InvalidMessage(format!("Failed to serialize: {}", e)))
    }
}

/// Builds synthetic responses for one inbound query.
pub struct ResponseBuilder;

impl ResponseBuilder {
    /// Response skeleton: id echoed, RA set, the question copied back.
    fn base(request: &Message, rcode: ResponseCode) -> Message {
        let mut response = Message::new(request.id(), MessageType::Response, OpCode::Query);
        response.set_recursion_desired(request.recursion_desired());
        response.set_recursion_available(true);
        response.set_response_code(rcode);
        if let Some(query) = request.queries().first() {
            response.add_query(query.clone());
        }
        response
    }

    pub fn error(request: &Message, rcode: ResponseCode) -> Message {
        Self::base(request, rcode)
    }

    pub fn nxdomain(request: &Message) -> Message {
        Self::base(request, ResponseCode::NXDomain)
    }

    pub fn servfail(request: &Message) -> Message {
        Self::base(request, ResponseCode::ServFail)
    }

    pub fn formerr(request: &Message) -> Message {
        Self::base(request, ResponseCode::FormErr)
    }

    pub fn refused(request: &Message) -> Message {
        Self::base(request, ResponseCode::Refused)
    }

    /// NOERROR response carrying prebuilt answer records.
    pub fn answer(request: &Message, answers: Vec<Record>) -> Message {
        let mut response = Self::base(request, ResponseCode::NoError);
        for record in answers {
            response.add_answer(record);
        }
        response
    }

    /// Sinkhole for a blocked domain: 0.0.0.0 / :: for address queries,
    /// NXDOMAIN for everything else.
    pub fn sinkhole(request: &Message, record_type: RecordType, ttl: u32) -> Message {
        let name = match request.queries().first() {
            Some(q) => q.name().clone(),
            None => return Self::nxdomain(request),
        };
        match record_type {
            RecordType::A => Self::answer(
                request,
                vec![Record::from_rdata(
                    name,
                    ttl,
                    RData::A(rdata::A(Ipv4Addr::UNSPECIFIED)),
                )],
            ),
            RecordType::AAAA => Self::answer(
                request,
                vec![Record::from_rdata(
                    name,
                    ttl,
                    RData::AAAA(rdata::AAAA(Ipv6Addr::UNSPECIFIED)),
                )],
            ),
            _ => Self::nxdomain(request),
        }
    }

    /// Synthetic A/AAAA answer for a REDIRECT policy action. Returns an
    /// empty NOERROR when the address family does not fit the query type.
    pub fn redirect(request: &Message, record_type: RecordType, ip: IpAddr, ttl: u32) -> Message {
        let name = match request.queries().first() {
            Some(q) => q.name().clone(),
            None => return Self::nxdomain(request),
        };
        match (record_type, ip) {
            (RecordType::A, IpAddr::V4(v4)) => Self::answer(
                request,
                vec![Record::from_rdata(name, ttl, RData::A(rdata::A(v4)))],
            ),
            (RecordType::AAAA, IpAddr::V6(v6)) => Self::answer(
                request,
                vec![Record::from_rdata(name, ttl, RData::AAAA(rdata::AAAA(v6)))],
            ),
            _ => Self::answer(request, vec![]),
        }
    }
}

/// Overwrite the id field of a serialized DNS message in place.
pub fn patch_wire_id(wire: &mut [u8], id: u16) {
    if wire.len() >= 2 {
        wire[0..2].copy_from_slice(&id.to_be_bytes());
    }
}

/// Read the id field of a serialized DNS message.
pub fn wire_id(wire: &[u8]) -> Option<u16> {
    wire.get(0..2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

/// A minimal truncated copy for UDP clients whose buffer the full response
/// exceeds: same header with TC set, question echoed, no answers.
pub fn truncated_copy(response: &Message) -> Message {
    let mut truncated = Message::new(response.id(), MessageType::Response, OpCode::Query);
    truncated.set_recursion_desired(response.recursion_desired());
    truncated.set_recursion_available(true);
    truncated.set_response_code(response.response_code());
    truncated.set_truncated(true);
    for query in response.queries() {
        truncated.add_query(query.clone());
    }
    truncated
}
