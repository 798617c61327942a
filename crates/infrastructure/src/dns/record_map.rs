use glory_hole_domain::RecordType;
use hickory_proto::rr::RecordType as HickoryRecordType;

pub struct RecordTypeMapper;

impl RecordTypeMapper {
    /// Convert domain RecordType → hickory RecordType (for building answers
    /// and upstream queries).
    pub fn to_hickory(record_type: RecordType) -> HickoryRecordType {
        match record_type {
            RecordType::A => HickoryRecordType::A,
            RecordType::AAAA => HickoryRecordType::AAAA,
            RecordType::CNAME => HickoryRecordType::CNAME,
            RecordType::MX => HickoryRecordType::MX,
            RecordType::TXT => HickoryRecordType::TXT,
            RecordType::SRV => HickoryRecordType::SRV,
            RecordType::PTR => HickoryRecordType::PTR,
            RecordType::NS => HickoryRecordType::NS,
            RecordType::SOA => HickoryRecordType::SOA,
            RecordType::CAA => HickoryRecordType::CAA,
            RecordType::Other(code) => HickoryRecordType::from(code),
        }
    }

    /// Convert hickory RecordType → domain RecordType (for incoming
    /// queries). Unrecognized types round-trip through their numeric code.
    pub fn from_hickory(hickory_type: HickoryRecordType) -> RecordType {
        RecordType::from_code(u16::from(hickory_type))
    }
}
