//! An mDNS (RFC 6762) and DNS-SD (RFC 6763) implementation: wire codec,
//! message builder, datagram parser/dispatcher, and a thin non-blocking
//! socket layer on top.
//!
//! The crate runs no background thread and no async reactor. Every
//! operation here either builds a buffer, sends it, or parses one already
//! received; callers own the poll loop.
pub mod config;
pub mod error;
pub mod message;
pub mod name;
pub mod parser;
pub mod record;
pub mod socket;

use std::net::{Ipv4Addr, SocketAddr};

use log::{debug, warn};
use rand::Rng;

pub use error::{MdnsError, MdnsResult};
pub use message::Record;
pub use parser::{RecordEvent, RecordSink};
pub use record::{EntryType, RecordType, SrvRecord, TxtEntry};
pub use socket::{Family, MdnsSocket};

use config::DEFAULT_BUFFER_SIZE;

/// A query id with the high bit clear, suitable for [`query_send`]; mDNS
/// queries from a host's well-known port may leave this at zero instead.
pub fn random_query_id() -> u16 {
    rand::thread_rng().gen_range(1..=0x7FFF)
}

/// Bind and join the mDNS group on the given IPv4 interface (or
/// [`Ipv4Addr::UNSPECIFIED`] to let the kernel choose).
pub fn socket_bind(interface: Ipv4Addr) -> MdnsResult<MdnsSocket> {
    let sock = MdnsSocket::bind_v4(interface)?;
    debug!("bound mdns socket on {:?}", sock.local_addr());
    Ok(sock)
}

/// Send the canonical DNS-SD service-enumeration query
/// (`_services._dns-sd._udp.local.`) to the multicast group.
pub fn discovery_send(sock: &MdnsSocket) -> MdnsResult<usize> {
    let datagram = message::build_discovery_query();
    let sent = sock.send_multicast(&datagram)?;
    debug!("sent discovery query ({} bytes)", sent);
    Ok(sent)
}

/// Poll once for a discovery reply. Returns `Ok(0)` (not an error) when no
/// datagram was waiting.
pub fn discovery_recv(sock: &MdnsSocket, sink: &mut dyn RecordSink) -> MdnsResult<u16> {
    let mut buf = vec![0u8; DEFAULT_BUFFER_SIZE];
    match sock.recv_from(&mut buf)? {
        Some((len, from)) => Ok(parser::discovery_recv(from, &buf, len, sink)),
        None => Ok(0),
    }
}

/// Send a one-question query for `name`/`rtype` to the multicast group.
/// Returns the query id used, so the caller can correlate replies against
/// it (e.g. via [`query_recv`]'s `only_query_id`). `query_id` of `0` is
/// conventional for plain mDNS queries; DNS-SD enumeration traffic
/// typically leaves it at zero too.
pub fn query_send(sock: &MdnsSocket, rtype: RecordType, name: &str, query_id: u16) -> MdnsResult<u16> {
    let local_port = sock.local_addr()?.port();
    let datagram = message::build_query(rtype, name, query_id, local_port)?;
    let sent = sock.send_multicast(&datagram)?;
    debug!("sent query for {} ({:?}, {} bytes)", name, rtype, sent);
    Ok(query_id)
}

/// Poll once for a query reply. `only_query_id` mirrors
/// [`parser::query_recv`]'s matching rule: `Some(id)` rejects anything not
/// carrying that id, `None` accepts any.
pub fn query_recv(sock: &MdnsSocket, only_query_id: Option<u16>, sink: &mut dyn RecordSink) -> MdnsResult<u16> {
    let mut buf = vec![0u8; DEFAULT_BUFFER_SIZE];
    match sock.recv_from(&mut buf)? {
        Some((len, from)) => Ok(parser::query_recv(from, &buf, len, only_query_id, sink)),
        None => Ok(0),
    }
}

/// Poll once for an incoming DNS-SD meta-question from another host on the
/// network (i.e. act as a responder rather than a querier).
pub fn service_listen(sock: &MdnsSocket, sink: &mut dyn RecordSink) -> MdnsResult<u16> {
    let mut buf = vec![0u8; DEFAULT_BUFFER_SIZE];
    match sock.recv_from(&mut buf)? {
        Some((len, from)) => Ok(parser::service_listen(from, &buf, len, sink)),
        None => Ok(0),
    }
}

/// Answer a query directly to the querying peer (unicast), echoing its
/// query id and question.
#[allow(clippy::too_many_arguments)]
pub fn query_answer_unicast(
    sock: &MdnsSocket,
    dest: SocketAddr,
    query_id: u16,
    question_rtype: RecordType,
    question_name: &str,
    answer: &Record,
    authority: &[Record],
    additional: &[Record],
) -> MdnsResult<usize> {
    let datagram = message::build_unicast_answer(query_id, question_rtype, question_name, answer, authority, additional)?;
    message::enforce_capacity(&datagram, DEFAULT_BUFFER_SIZE)?;
    let sent = sock.send_to(&datagram, dest)?;
    debug!("sent unicast answer to {} ({} bytes)", dest, sent);
    Ok(sent)
}

/// Answer a query to the whole multicast group instead of the querying
/// peer, per RFC 6762 §6 for records likely to be shared interest.
pub fn query_answer_multicast(sock: &MdnsSocket, answer: &Record, authority: &[Record], additional: &[Record]) -> MdnsResult<usize> {
    let datagram = message::build_multicast_answer(answer, authority, additional)?;
    message::enforce_capacity(&datagram, DEFAULT_BUFFER_SIZE)?;
    let sent = sock.send_multicast(&datagram)?;
    debug!("sent multicast answer ({} bytes)", sent);
    Ok(sent)
}

/// Announce a record's presence unsolicited (cache-flush bit set), per
/// RFC 6762 §8.3.
pub fn announce_multicast(sock: &MdnsSocket, answer: &Record, authority: &[Record], additional: &[Record]) -> MdnsResult<usize> {
    let datagram = message::build_announce(answer, authority, additional)?;
    message::enforce_capacity(&datagram, DEFAULT_BUFFER_SIZE)?;
    let sent = sock.send_multicast(&datagram)?;
    debug!("sent announce ({} bytes)", sent);
    Ok(sent)
}

/// Announce a record's imminent expiry (TTL 0), per RFC 6762 §10.1.
pub fn goodbye_multicast(sock: &MdnsSocket, answer: &Record, authority: &[Record], additional: &[Record]) -> MdnsResult<usize> {
    let datagram = message::build_goodbye(answer, authority, additional)?;
    message::enforce_capacity(&datagram, DEFAULT_BUFFER_SIZE)?;
    let sent = sock.send_multicast(&datagram)?;
    debug!("sent goodbye ({} bytes)", sent);
    Ok(sent)
}

/// Reports a send/recv buffer overrun that [`message::enforce_capacity`]
/// rejected, at `warn` level, for callers that want to log before
/// propagating the error.
pub fn log_capacity_rejection(err: &MdnsError) {
    warn!("message exceeded declared capacity: {}", err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::ControlFlow;
    use std::time::Duration;

    fn recv_with_retry(sock: &MdnsSocket, sink: &mut dyn RecordSink, tries: u32) -> u16 {
        for _ in 0..tries {
            let n = query_recv(sock, None, sink).unwrap();
            if n > 0 {
                return n;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        0
    }

    #[test]
    fn query_then_unicast_answer_round_trips_over_loopback() {
        use crate::config::DNS_SD_META_QUERY_NAME;

        let querier = MdnsSocket::bind_ephemeral(Family::V4).unwrap();
        let responder = MdnsSocket::bind_ephemeral(Family::V4).unwrap();

        // The discovery query is the one datagram `service_listen` (the
        // responder-role dispatcher that actually fires Question events)
        // recognizes; a plain `query_send` datagram is walked by
        // `query_recv` instead, which per spec never dispatches questions.
        let query_id = 0;
        let datagram = message::build_discovery_query();
        querier.send_to(&datagram, responder.local_addr().unwrap()).unwrap();

        let mut buf = [0u8; DEFAULT_BUFFER_SIZE];
        let (len, from) = loop_recv(&responder, &mut buf);
        let mut questions = Vec::new();
        let mut sink = |event: RecordEvent<'_>| {
            questions.push((event.entry, event.query_id, event.rtype));
            ControlFlow::Continue(())
        };
        let count = parser::service_listen(from, &buf, len, &mut sink);
        assert_eq!(count, 1);
        assert_eq!(questions[0], (EntryType::Question, query_id, RecordType::Ptr));

        let answer = Record::ptr(DNS_SD_META_QUERY_NAME, "_http._tcp.local.");
        query_answer_unicast(&responder, from, query_id, RecordType::Ptr, DNS_SD_META_QUERY_NAME, &answer, &[], &[]).unwrap();

        let mut answers = Vec::new();
        let mut answer_sink = |event: RecordEvent<'_>| {
            answers.push(event.entry);
            ControlFlow::Continue(())
        };
        let dispatched = recv_with_retry(&querier, &mut answer_sink, 50);
        assert_eq!(dispatched, 1);
        assert_eq!(answers[0], EntryType::Answer);
    }

    fn loop_recv(sock: &MdnsSocket, buf: &mut [u8]) -> (usize, SocketAddr) {
        loop {
            if let Some(r) = sock.recv_from(buf).unwrap() {
                return r;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn random_query_id_is_never_zero_or_high_bit_set() {
        for _ in 0..100 {
            let id = random_query_id();
            assert!(id != 0);
            assert!(id & 0x8000 == 0);
        }
    }
}
