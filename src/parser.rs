//! Message parser / dispatcher: walks a received datagram, validates
//! offsets and section counts, and invokes a per-record callback.
use std::net::SocketAddr;
use std::ops::ControlFlow;

use byteorder::{BigEndian, ByteOrder};

use crate::config::DNS_SD_META_QUERY_NAME;
use crate::name::{encode_name, equal, skip, CompressionTable};
use crate::record::{is_acceptable_question_class, is_strict_in_class, plain_class, EntryType, RecordType};

/// One record event handed to a [`RecordSink`]. Offsets are into the
/// original receive buffer and are only valid for the duration of the
/// callback; a sink that needs to keep data must copy it out.
pub struct RecordEvent<'a> {
    pub from: SocketAddr,
    pub entry: EntryType,
    pub query_id: u16,
    pub rtype: RecordType,
    pub rclass: u16,
    pub ttl: u32,
    pub buffer: &'a [u8],
    pub name_offset: usize,
    pub name_length: usize,
    pub record_offset: usize,
    pub record_length: usize,
}

/// Receives record events as a datagram is walked. Returning
/// `ControlFlow::Break(())` stops dispatch for the rest of the current
/// message (mirroring the C callback contract's non-zero return).
pub trait RecordSink {
    fn record(&mut self, event: RecordEvent<'_>) -> ControlFlow<()>;
}

impl<F> RecordSink for F
where
    F: FnMut(RecordEvent<'_>) -> ControlFlow<()>,
{
    fn record(&mut self, event: RecordEvent<'_>) -> ControlFlow<()> {
        self(event)
    }
}

/// The 12-byte DNS message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub query_id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

fn read_header(buf: &[u8], size: usize) -> Option<Header> {
    if size < 12 {
        return None;
    }
    Some(Header {
        query_id: BigEndian::read_u16(&buf[0..2]),
        flags: BigEndian::read_u16(&buf[2..4]),
        qdcount: BigEndian::read_u16(&buf[4..6]),
        ancount: BigEndian::read_u16(&buf[6..8]),
        nscount: BigEndian::read_u16(&buf[8..10]),
        arcount: BigEndian::read_u16(&buf[10..12]),
    })
}

/// Walk `count` resource records starting at `*off`, invoking `sink` for
/// each one that survives bounds-checking. Returns the number of records
/// actually parsed; a short buffer aborts the loop without corrupting the
/// caller's offset beyond what was already consumed.
#[allow(clippy::too_many_arguments)]
pub fn records_parse(
    from: SocketAddr,
    buf: &[u8],
    size: usize,
    off: &mut usize,
    entry: EntryType,
    query_id: u16,
    count: u16,
    mut dispatch: bool,
    sink: &mut dyn RecordSink,
) -> (u16, bool) {
    let mut parsed = 0u16;
    for _ in 0..count {
        let name_offset = *off;
        if !skip(buf, size, off) {
            break;
        }
        let name_length = *off - name_offset;

        if *off + 10 > size {
            break;
        }
        let rtype = RecordType::from(BigEndian::read_u16(&buf[*off..*off + 2]));
        let rclass = BigEndian::read_u16(&buf[*off + 2..*off + 4]);
        let ttl = BigEndian::read_u32(&buf[*off + 4..*off + 8]);
        let rdlength = BigEndian::read_u16(&buf[*off + 8..*off + 10]) as usize;
        *off += 10;

        if *off + rdlength > size {
            break;
        }
        let record_offset = *off;

        if dispatch {
            parsed += 1;
            let event = RecordEvent {
                from,
                entry,
                query_id,
                rtype,
                rclass,
                ttl,
                buffer: buf,
                name_offset,
                name_length,
                record_offset,
                record_length: rdlength,
            };
            if sink.record(event).is_break() {
                dispatch = false;
            }
        }

        *off += rdlength;
    }
    (parsed, dispatch)
}

/// Invoke `sink` once with the optional terminal `END` event, with all
/// numeric fields zero. Only called after a message's sections finished
/// without a `Break` from an earlier callback.
fn dispatch_end(from: SocketAddr, buf: &[u8], sink: &mut dyn RecordSink) {
    let event = RecordEvent {
        from,
        entry: EntryType::End,
        query_id: 0,
        rtype: RecordType::Ignore,
        rclass: 0,
        ttl: 0,
        buffer: buf,
        name_offset: 0,
        name_length: 0,
        record_offset: 0,
        record_length: 0,
    };
    let _ = sink.record(event);
}

/// `discovery_recv`: strict handling of a DNS-SD meta-query reply.
/// Requires `query_id == 0` and `flags == 0x8400`. Each answer is checked
/// against the canonical meta-query name with strict class IN; a
/// non-matching answer is skipped (not dispatched) but parsing continues
/// into the rest of the message — earlier drafts of this protocol
/// short-circuited the whole walk on the first mismatch, which this
/// corrects (see the DESIGN.md Open Question entry).
pub fn discovery_recv(from: SocketAddr, buf: &[u8], size: usize, sink: &mut dyn RecordSink) -> u16 {
    if size == 0 {
        return 0;
    }
    let header = match read_header(buf, size) {
        Some(h) => h,
        None => return 0,
    };
    if header.query_id != 0 || header.flags != 0x8400 {
        return 0;
    }

    let mut off = 12usize;
    let mut canonical = Vec::new();
    let mut table = CompressionTable::new();
    if encode_name(&mut canonical, DNS_SD_META_QUERY_NAME, &mut table).is_err() {
        return 0;
    }

    for _ in 0..header.qdcount {
        if !skip(buf, size, &mut off) {
            return 0;
        }
        if off + 4 > size {
            return 0;
        }
        off += 4; // qtype + qclass; the canonical question is not dispatched
    }

    let mut parsed = 0u16;
    let mut dispatch = true;
    for _ in 0..header.ancount {
        let name_offset = off;
        let mut check_off = off;
        let mut canonical_off = 0usize;
        let matches_name = equal(buf, size, &mut check_off, &canonical, canonical.len(), &mut canonical_off);
        if !skip(buf, size, &mut off) {
            break;
        }
        let name_length = off - name_offset;
        if off + 10 > size {
            break;
        }
        let rtype = RecordType::from(BigEndian::read_u16(&buf[off..off + 2]));
        let rclass = BigEndian::read_u16(&buf[off + 2..off + 4]);
        let ttl = BigEndian::read_u32(&buf[off + 4..off + 8]);
        let rdlength = BigEndian::read_u16(&buf[off + 8..off + 10]) as usize;
        off += 10;
        if off + rdlength > size {
            break;
        }
        let record_offset = off;

        if dispatch && matches_name && matches!(rtype, RecordType::Ptr) && is_strict_in_class(rclass) {
            parsed += 1;
            let event = RecordEvent {
                from,
                entry: EntryType::Answer,
                query_id: header.query_id,
                rtype,
                rclass,
                ttl,
                buffer: buf,
                name_offset,
                name_length,
                record_offset,
                record_length: rdlength,
            };
            if sink.record(event).is_break() {
                dispatch = false;
            }
        }
        // non-matching answers are skipped (not dispatched) but we keep
        // walking into authority/additional sections regardless.
        off += rdlength;
    }

    let mut off_mut = off;
    let (more, dispatch) = records_parse(from, buf, size, &mut off_mut, EntryType::Authority, header.query_id, header.nscount, dispatch, sink);
    parsed += more;
    let (more, dispatch) = records_parse(from, buf, size, &mut off_mut, EntryType::Additional, header.query_id, header.arcount, dispatch, sink);
    parsed += more;
    if dispatch {
        dispatch_end(from, buf, sink);
    }

    parsed
}

/// `query_recv`: general-purpose answer listener. If `only_query_id` is
/// `Some`, the header's query id must match it. Questions are traversed
/// but never dispatched; answer/authority/additional sections are parsed
/// in order.
pub fn query_recv(from: SocketAddr, buf: &[u8], size: usize, only_query_id: Option<u16>, sink: &mut dyn RecordSink) -> u16 {
    if size == 0 {
        return 0;
    }
    let header = match read_header(buf, size) {
        Some(h) => h,
        None => return 0,
    };
    if let Some(expected) = only_query_id {
        if header.query_id != expected {
            return 0;
        }
    }

    let mut off = 12usize;
    for _ in 0..header.qdcount {
        if !skip(buf, size, &mut off) {
            return 0;
        }
        if off + 4 > size {
            return 0;
        }
        off += 4;
    }

    let mut parsed = 0u16;
    let (more, dispatch) = records_parse(from, buf, size, &mut off, EntryType::Answer, header.query_id, header.ancount, true, sink);
    parsed += more;
    let (more, dispatch) = records_parse(from, buf, size, &mut off, EntryType::Authority, header.query_id, header.nscount, dispatch, sink);
    parsed += more;
    let (more, dispatch) = records_parse(from, buf, size, &mut off, EntryType::Additional, header.query_id, header.arcount, dispatch, sink);
    parsed += more;
    if dispatch {
        dispatch_end(from, buf, sink);
    }
    parsed
}

/// `service_listen`: the listening/responder role. Each question is
/// checked against the DNS-SD meta-query name; its class must be IN or ANY
/// (the permissive check — see DESIGN.md Open Question) or the whole
/// datagram is rejected. A meta-question arriving inside a reply
/// (`flags != 0`) is recognized but suppressed, not dispatched; parsing of
/// subsequent sections still proceeds.
pub fn service_listen(from: SocketAddr, buf: &[u8], size: usize, sink: &mut dyn RecordSink) -> u16 {
    if size == 0 {
        return 0;
    }
    let header = match read_header(buf, size) {
        Some(h) => h,
        None => return 0,
    };

    let mut off = 12usize;
    let mut canonical = Vec::new();
    let mut table = CompressionTable::new();
    if encode_name(&mut canonical, DNS_SD_META_QUERY_NAME, &mut table).is_err() {
        return 0;
    }

    let mut parsed = 0u16;
    for _ in 0..header.qdcount {
        let question_offset = off;
        let mut check_off = off;
        let mut canonical_off = 0usize;
        let is_dns_sd = equal(buf, size, &mut check_off, &canonical, canonical.len(), &mut canonical_off);

        if is_dns_sd {
            off = check_off;
        } else if !skip(buf, size, &mut off) {
            break;
        }

        if off + 4 > size {
            break;
        }
        let rtype = RecordType::from(BigEndian::read_u16(&buf[off..off + 2]));
        let rclass = BigEndian::read_u16(&buf[off + 2..off + 4]);
        off += 4;

        if !is_acceptable_question_class(rclass) {
            return 0;
        }
        if is_dns_sd && header.flags != 0 {
            continue;
        }

        parsed += 1;
        let event = RecordEvent {
            from,
            entry: EntryType::Question,
            query_id: header.query_id,
            rtype,
            rclass,
            ttl: 0,
            buffer: buf,
            name_offset: question_offset,
            name_length: off - 4 - question_offset,
            record_offset: question_offset,
            record_length: off - 4 - question_offset,
        };
        if sink.record(event).is_break() {
            let mut off_mut = off;
            records_parse(from, buf, size, &mut off_mut, EntryType::Answer, header.query_id, header.ancount, false, sink);
            records_parse(from, buf, size, &mut off_mut, EntryType::Authority, header.query_id, header.nscount, false, sink);
            records_parse(from, buf, size, &mut off_mut, EntryType::Additional, header.query_id, header.arcount, false, sink);
            return parsed;
        }
    }

    let mut off_mut = off;
    let (more, dispatch) = records_parse(from, buf, size, &mut off_mut, EntryType::Answer, header.query_id, header.ancount, true, sink);
    parsed += more;
    let (more, dispatch) = records_parse(from, buf, size, &mut off_mut, EntryType::Authority, header.query_id, header.nscount, dispatch, sink);
    parsed += more;
    let (more, dispatch) = records_parse(from, buf, size, &mut off_mut, EntryType::Additional, header.query_id, header.arcount, dispatch, sink);
    parsed += more;
    if dispatch {
        dispatch_end(from, buf, sink);
    }

    parsed
}

/// Check whether the name at `off` matches the canonical DNS-SD meta-query
/// name (`_services._dns-sd._udp.local.`).
pub fn is_canonical_meta_query_name(buf: &[u8], size: usize, off: usize) -> bool {
    let mut canonical = Vec::new();
    let mut table = CompressionTable::new();
    if encode_name(&mut canonical, DNS_SD_META_QUERY_NAME, &mut table).is_err() {
        return false;
    }
    let mut a = off;
    let mut b = 0usize;
    equal(buf, size, &mut a, &canonical, canonical.len(), &mut b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CLASS_IN, MAX_NAME_LENGTH};
    use crate::message::build_discovery_query;
    use std::net::{IpAddr, Ipv4Addr};

    fn peer() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 5353)
    }

    fn make_discovery_reply(ptr_target: &str) -> Vec<u8> {
        use byteorder::{BigEndian, WriteBytesExt};
        let mut buf = Vec::new();
        buf.write_u16::<BigEndian>(0).unwrap(); // query_id
        buf.write_u16::<BigEndian>(0x8400).unwrap(); // flags
        buf.write_u16::<BigEndian>(0).unwrap(); // qd
        buf.write_u16::<BigEndian>(1).unwrap(); // an
        buf.write_u16::<BigEndian>(0).unwrap();
        buf.write_u16::<BigEndian>(0).unwrap();

        let mut table = CompressionTable::new();
        encode_name(&mut buf, DNS_SD_META_QUERY_NAME, &mut table).unwrap();
        buf.write_u16::<BigEndian>(RecordType::Ptr.as_u16()).unwrap();
        buf.write_u16::<BigEndian>(CLASS_IN).unwrap();
        buf.write_u32::<BigEndian>(120).unwrap();
        let len_at = buf.len();
        buf.write_u16::<BigEndian>(0).unwrap();
        let body_start = buf.len();
        encode_name(&mut buf, ptr_target, &mut table).unwrap();
        let body_len = (buf.len() - body_start) as u16;
        BigEndian::write_u16(&mut buf[len_at..len_at + 2], body_len);
        buf
    }

    #[test]
    fn discovery_reply_parse_yields_one_answer_with_ptr_payload() {
        let datagram = make_discovery_reply("_http._tcp.local.");
        let mut answers = Vec::new();
        let mut sink = |event: RecordEvent<'_>| {
            answers.push((event.entry, event.rtype, event.rclass, event.ttl, event.record_offset, event.record_length));
            ControlFlow::Continue(())
        };
        let count = discovery_recv(peer(), &datagram, datagram.len(), &mut sink);
        assert_eq!(count, 1);
        assert_eq!(answers.len(), 1);
        let (entry, rtype, rclass, ttl, record_offset, record_length) = answers[0];
        assert_eq!(entry, EntryType::Answer);
        assert!(matches!(rtype, RecordType::Ptr));
        assert_eq!(rclass, CLASS_IN);
        assert!(ttl > 0);

        let mut off = record_offset;
        let decoded = crate::name::extract(&datagram, datagram.len(), &mut off, MAX_NAME_LENGTH);
        let _ = record_length;
        assert_eq!(decoded, "_http._tcp.local.");
    }

    #[test]
    fn discovery_recv_skips_non_matching_answer_but_continues() {
        // two answers: first under an unrelated question name, second the
        // real meta-query answer. The first must be skipped, not stop
        // the walk.
        use byteorder::{BigEndian, WriteBytesExt};
        let mut buf = Vec::new();
        buf.write_u16::<BigEndian>(0).unwrap();
        buf.write_u16::<BigEndian>(0x8400).unwrap();
        buf.write_u16::<BigEndian>(0).unwrap();
        buf.write_u16::<BigEndian>(2).unwrap(); // an = 2
        buf.write_u16::<BigEndian>(0).unwrap();
        buf.write_u16::<BigEndian>(0).unwrap();

        let mut table = CompressionTable::new();
        // first (non-matching) answer
        encode_name(&mut buf, "_unrelated._tcp.local.", &mut table).unwrap();
        buf.write_u16::<BigEndian>(RecordType::Ptr.as_u16()).unwrap();
        buf.write_u16::<BigEndian>(CLASS_IN).unwrap();
        buf.write_u32::<BigEndian>(120).unwrap();
        let len_at = buf.len();
        buf.write_u16::<BigEndian>(0).unwrap();
        let body_start = buf.len();
        encode_name(&mut buf, "_ignored._tcp.local.", &mut table).unwrap();
        let body_len = (buf.len() - body_start) as u16;
        BigEndian::write_u16(&mut buf[len_at..len_at + 2], body_len);

        // second (matching) answer
        encode_name(&mut buf, DNS_SD_META_QUERY_NAME, &mut table).unwrap();
        buf.write_u16::<BigEndian>(RecordType::Ptr.as_u16()).unwrap();
        buf.write_u16::<BigEndian>(CLASS_IN).unwrap();
        buf.write_u32::<BigEndian>(120).unwrap();
        let len_at = buf.len();
        buf.write_u16::<BigEndian>(0).unwrap();
        let body_start = buf.len();
        encode_name(&mut buf, "_http._tcp.local.", &mut table).unwrap();
        let body_len = (buf.len() - body_start) as u16;
        BigEndian::write_u16(&mut buf[len_at..len_at + 2], body_len);

        let mut dispatched = 0;
        let mut sink = |_event: RecordEvent<'_>| {
            dispatched += 1;
            ControlFlow::Continue(())
        };
        let count = discovery_recv(peer(), &buf, buf.len(), &mut sink);
        assert_eq!(count, 1);
        assert_eq!(dispatched, 1);
    }

    #[test]
    fn service_listen_fires_question_for_canonical_meta_query_with_flags_zero() {
        let datagram = build_discovery_query();
        let mut questions = Vec::new();
        let mut sink = |event: RecordEvent<'_>| {
            questions.push((event.entry, event.rtype, event.rclass));
            ControlFlow::Continue(())
        };
        let count = service_listen(peer(), &datagram, datagram.len(), &mut sink);
        assert_eq!(count, 1);
        assert_eq!(questions.len(), 1);
        let (entry, rtype, rclass) = questions[0];
        assert_eq!(entry, EntryType::Question);
        assert!(matches!(rtype, RecordType::Ptr));
        assert_eq!(plain_class(rclass), CLASS_IN);
    }

    #[test]
    fn service_listen_suppresses_meta_question_when_flags_nonzero() {
        let mut datagram = build_discovery_query();
        // set flags to a nonzero value (as if this were a reply, not a query)
        BigEndian::write_u16(&mut datagram[2..4], 0x8400);
        let mut dispatched = 0;
        let mut sink = |_event: RecordEvent<'_>| {
            dispatched += 1;
            ControlFlow::Continue(())
        };
        let count = service_listen(peer(), &datagram, datagram.len(), &mut sink);
        assert_eq!(count, 0);
        assert_eq!(dispatched, 0);
    }

    #[test]
    fn service_listen_rejects_unacceptable_question_class() {
        let mut datagram = build_discovery_query();
        // corrupt class field to something other than IN/ANY
        let len = datagram.len();
        BigEndian::write_u16(&mut datagram[len - 2..], 99);
        let mut dispatched = 0;
        let mut sink = |_event: RecordEvent<'_>| {
            dispatched += 1;
            ControlFlow::Continue(())
        };
        let count = service_listen(peer(), &datagram, datagram.len(), &mut sink);
        assert_eq!(count, 0);
        assert_eq!(dispatched, 0);
    }

    #[test]
    fn records_parse_stops_cleanly_on_truncated_buffer() {
        let mut buf = Vec::new();
        buf.push(0); // an empty name (just the terminator)
        buf.extend_from_slice(&[0x00, 0x0C]); // rtype only, missing the rest
        let mut off = 0usize;
        let mut sink = |_event: RecordEvent<'_>| ControlFlow::Continue(());
        let (parsed, _) = records_parse(peer(), &buf, buf.len(), &mut off, EntryType::Answer, 0, 1, true, &mut sink);
        assert_eq!(parsed, 0);
        assert!(off <= buf.len());
    }

    #[test]
    fn query_recv_rejects_mismatched_query_id() {
        let buf = make_discovery_reply("_http._tcp.local.");
        let mut sink = |_event: RecordEvent<'_>| ControlFlow::Continue(());
        let count = query_recv(peer(), &buf, buf.len(), Some(42), &mut sink);
        assert_eq!(count, 0);
    }

    #[test]
    fn query_recv_dispatches_answer_when_query_id_matches_or_unset() {
        let buf = make_discovery_reply("_http._tcp.local.");
        let mut dispatched = 0;
        let mut sink = |_event: RecordEvent<'_>| {
            dispatched += 1;
            ControlFlow::Continue(())
        };
        let count = query_recv(peer(), &buf, buf.len(), None, &mut sink);
        assert_eq!(count, 1);
        assert_eq!(dispatched, 1);
    }

    #[test]
    fn stop_signal_halts_further_dispatch_in_same_message() {
        let mut buf = Vec::new();
        {
            use byteorder::{BigEndian, WriteBytesExt};
            buf.write_u16::<BigEndian>(7).unwrap();
            buf.write_u16::<BigEndian>(0x8400).unwrap();
            buf.write_u16::<BigEndian>(0).unwrap();
            buf.write_u16::<BigEndian>(2).unwrap(); // an = 2
            buf.write_u16::<BigEndian>(0).unwrap();
            buf.write_u16::<BigEndian>(0).unwrap();
            let mut table = CompressionTable::new();
            for _ in 0..2 {
                encode_name(&mut buf, "host.local.", &mut table).unwrap();
                buf.write_u16::<BigEndian>(RecordType::A.as_u16()).unwrap();
                buf.write_u16::<BigEndian>(CLASS_IN).unwrap();
                buf.write_u32::<BigEndian>(60).unwrap();
                buf.write_u16::<BigEndian>(4).unwrap();
                buf.extend_from_slice(&[10, 0, 0, 1]);
            }
        }
        let mut dispatched = 0;
        let mut sink = |_event: RecordEvent<'_>| {
            dispatched += 1;
            ControlFlow::Break(())
        };
        let count = query_recv(peer(), &buf, buf.len(), Some(7), &mut sink);
        assert_eq!(count, 1);
        assert_eq!(dispatched, 1);
    }
}
