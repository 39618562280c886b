//! Record type/class enums and payload codecs for the five supported
//! resource-record bodies (PTR, SRV, A, AAAA, TXT).
use std::net::{Ipv4Addr, Ipv6Addr};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::config::{CLASS_ANY, CLASS_IN, CLASS_MASK};
use crate::name::{encode_name, extract, CompressionTable};

/// DNS resource record type. Unknown values round-trip verbatim: the
/// wire-exact discriminant is always preserved, even when this enum has no
/// named variant for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Ignore,
    A,
    Ptr,
    Txt,
    Aaaa,
    Srv,
    Any,
    Unknown(u16),
}

impl RecordType {
    pub fn as_u16(self) -> u16 {
        match self {
            RecordType::Ignore => 0,
            RecordType::A => 1,
            RecordType::Ptr => 12,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
            RecordType::Srv => 33,
            RecordType::Any => 255,
            RecordType::Unknown(v) => v,
        }
    }
}

impl From<u16> for RecordType {
    fn from(v: u16) -> Self {
        match v {
            0 => RecordType::Ignore,
            1 => RecordType::A,
            12 => RecordType::Ptr,
            16 => RecordType::Txt,
            28 => RecordType::Aaaa,
            33 => RecordType::Srv,
            255 => RecordType::Any,
            other => RecordType::Unknown(other),
        }
    }
}

/// Entry type within a message: which section a record event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Question,
    Answer,
    Authority,
    Additional,
    End,
}

impl EntryType {
    pub fn as_u8(self) -> u8 {
        match self {
            EntryType::Question => 0,
            EntryType::Answer => 1,
            EntryType::Authority => 2,
            EntryType::Additional => 3,
            EntryType::End => 255,
        }
    }
}

/// Mask a raw class field down to its plain value, dropping the
/// unicast-response/cache-flush top bit.
pub fn plain_class(rclass: u16) -> u16 {
    rclass & CLASS_MASK
}

/// Permissive class check used by `service_listen`: accepts IN or ANY.
pub fn is_acceptable_question_class(rclass: u16) -> bool {
    let plain = plain_class(rclass);
    plain == CLASS_IN || plain == CLASS_ANY
}

/// Strict class check used by `discovery_recv`: accepts only IN.
pub fn is_strict_in_class(rclass: u16) -> bool {
    plain_class(rclass) == CLASS_IN
}

/// A decoded SRV record body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub name: String,
}

/// A decoded (or about-to-be-encoded) TXT key/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxtEntry {
    pub key: String,
    pub value: Option<String>,
}

/// The decoded body of one of the five supported record types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    Ptr { name: String },
    Srv(SrvRecord),
    A { addr: Ipv4Addr },
    Aaaa { addr: Ipv6Addr },
    Txt(Vec<TxtEntry>),
    /// Any record type this crate does not interpret; the raw body bytes
    /// are preserved so a caller can still render or forward them.
    Opaque { rtype: RecordType, bytes: Vec<u8> },
}

/// Parse a PTR record body. Returns `None` on any bounds violation; this
/// never aborts the caller's walk of the rest of the message.
pub fn parse_ptr(buf: &[u8], size: usize, offset: usize, length: usize) -> Option<String> {
    if size < offset + length || length < 2 {
        return None;
    }
    let mut off = offset;
    Some(extract(buf, size, &mut off, crate::config::MAX_NAME_LENGTH))
}

/// Parse an SRV record body (RFC 2782): `priority(2) | weight(2) | port(2) | name`.
pub fn parse_srv(buf: &[u8], size: usize, offset: usize, length: usize) -> Option<SrvRecord> {
    if size < offset + length || length < 8 {
        return None;
    }
    let priority = BigEndian::read_u16(&buf[offset..offset + 2]);
    let weight = BigEndian::read_u16(&buf[offset + 2..offset + 4]);
    let port = BigEndian::read_u16(&buf[offset + 4..offset + 6]);
    let mut off = offset + 6;
    let name = extract(buf, size, &mut off, crate::config::MAX_NAME_LENGTH);
    Some(SrvRecord { priority, weight, port, name })
}

/// Parse an A record body: exactly 4 bytes, a big-endian IPv4 address.
pub fn parse_a(buf: &[u8], size: usize, offset: usize, length: usize) -> Option<Ipv4Addr> {
    if size < offset + length || length != 4 {
        return None;
    }
    Some(Ipv4Addr::new(buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]))
}

/// Parse an AAAA record body: exactly 16 bytes, an IPv6 address.
pub fn parse_aaaa(buf: &[u8], size: usize, offset: usize, length: usize) -> Option<Ipv6Addr> {
    if size < offset + length || length != 16 {
        return None;
    }
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&buf[offset..offset + 16]);
    Some(Ipv6Addr::from(octets))
}

/// Parse a TXT record body: a run of length-prefixed `key=value` strings.
/// Entries whose key contains a byte outside printable US-ASCII
/// `[0x20, 0x7E]`, or that have no `=` at all, are skipped rather than
/// treated as an error.
pub fn parse_txt(buf: &[u8], size: usize, offset: usize, length: usize) -> Vec<TxtEntry> {
    let mut out = Vec::new();
    let mut end = offset + length;
    if size < end {
        end = size;
    }
    let mut cur = offset;

    while cur < end {
        let sublength = buf[cur] as usize;
        let content_start = cur + 1;
        if content_start + sublength > end {
            break;
        }
        let content = &buf[content_start..content_start + sublength];
        cur = content_start + sublength;

        let mut separator = None;
        let mut malformed = false;
        for (i, &b) in content.iter().enumerate() {
            if !(0x20..=0x7E).contains(&b) {
                malformed = true;
                break;
            }
            if b == b'=' {
                separator = Some(i);
                break;
            }
        }
        if malformed {
            continue;
        }
        match separator {
            None => continue,
            Some(sep) => {
                let key = String::from_utf8_lossy(&content[..sep]).into_owned();
                let value = if sep + 1 < content.len() {
                    Some(String::from_utf8_lossy(&content[sep + 1..]).into_owned())
                } else {
                    Some(String::new())
                };
                out.push(TxtEntry { key, value });
            }
        }
    }
    out
}

/// Serialize the body of a non-TXT record into `buf`, using the shared
/// compression table for any embedded names (PTR, SRV).
pub fn write_body(buf: &mut Vec<u8>, data: &RecordData, table: &mut CompressionTable) -> crate::error::MdnsResult<()> {
    match data {
        RecordData::Ptr { name } => encode_name(buf, name, table),
        RecordData::Srv(srv) => {
            buf.write_u16::<BigEndian>(srv.priority).unwrap();
            buf.write_u16::<BigEndian>(srv.weight).unwrap();
            buf.write_u16::<BigEndian>(srv.port).unwrap();
            encode_name(buf, &srv.name, table)
        }
        RecordData::A { addr } => {
            buf.extend_from_slice(&addr.octets());
            Ok(())
        }
        RecordData::Aaaa { addr } => {
            buf.extend_from_slice(&addr.octets());
            Ok(())
        }
        RecordData::Txt(entries) => {
            write_txt_body(buf, entries);
            Ok(())
        }
        RecordData::Opaque { bytes, .. } => {
            buf.extend_from_slice(bytes);
            Ok(())
        }
    }
}

/// Serialize a run of TXT entries as the coalesced body of a single RR:
/// concatenated `len(1B) | key=value` strings in input order.
pub fn write_txt_body(buf: &mut Vec<u8>, entries: &[TxtEntry]) {
    for entry in entries {
        let mut piece = entry.key.clone();
        if let Some(value) = &entry.value {
            piece.push('=');
            piece.push_str(value);
        }
        let bytes = piece.as_bytes();
        // caller is responsible for keeping each piece under 255 bytes;
        // length is written as truncated u8 on wire-format overflow, which
        // would itself signal a bug in caller-supplied data.
        buf.push(bytes.len() as u8);
        buf.extend_from_slice(bytes);
    }
}
