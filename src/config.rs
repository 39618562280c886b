//! Tunable constants for the mDNS/DNS-SD wire protocol.
use std::net::{Ipv4Addr, Ipv6Addr};

/// Well-known mDNS port, used for both the IPv4 and IPv6 multicast groups.
pub const MDNS_PORT: u16 = 5353;

/// IPv4 link-local multicast group mDNS responders join.
pub const MULTICAST_GROUP_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// IPv6 link-local multicast group mDNS responders join.
pub const MULTICAST_GROUP_V6: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);

/// Top bit of the question class: "please answer via unicast".
pub const UNICAST_RESPONSE: u16 = 0x8000;

/// Top bit of the answer class: "this record supersedes prior cache entries".
pub const CACHE_FLUSH: u16 = 0x8000;

/// Mask to recover the plain class value from a class field carrying either
/// of the bits above.
pub const CLASS_MASK: u16 = 0x7FFF;

pub const CLASS_IN: u16 = 1;
pub const CLASS_ANY: u16 = 255;

/// Upper bound on pointer-chain hops followed while decoding a single name,
/// guarding against cyclic/hostile compression pointers.
pub const MAX_SUBSTRINGS: usize = 64;

/// Capacity of the encoder's name-compression ring.
pub const COMPRESSION_TABLE_CAPACITY: usize = 16;

/// Maximum length of a single DNS label, per RFC 1035.
pub const MAX_LABEL_LENGTH: usize = 63;

/// Maximum total length of a decoded name, per RFC 1035.
pub const MAX_NAME_LENGTH: usize = 255;

/// Default scratch buffer size for one-shot queries and discovery requests.
pub const DEFAULT_BUFFER_SIZE: usize = 512;

/// TTL used when answering a unicast query.
pub const UNICAST_ANSWER_TTL: u32 = 10;

/// TTL used for multicast answers and announcements.
pub const MULTICAST_ANSWER_TTL: u32 = 60;

/// TTL used for goodbye records (announces a record's imminent expiry).
pub const GOODBYE_TTL: u32 = 0;

/// The well-known DNS-SD meta-query name: `_services._dns-sd._udp.local.`
pub const DNS_SD_META_QUERY_NAME: &str = "_services._dns-sd._udp.local.";
