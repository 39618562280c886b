//! The multicast socket layer: binding to the mDNS port, joining the
//! well-known multicast groups, and non-blocking send/receive.
//!
//! This crate never spawns a thread or runs an async reactor. Callers poll
//! [`MdnsSocket::recv_from`] themselves (directly, or behind their own
//! `mio`/`select` loop); a `WouldBlock` result is folded into `Ok(None)`
//! rather than surfaced as an error.
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, UdpSocket};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::config::{MDNS_PORT, MULTICAST_GROUP_V4, MULTICAST_GROUP_V6};
use crate::error::{MdnsError, MdnsResult};

/// Which multicast group and address family a bound socket belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

/// A bound, group-joined, non-blocking mDNS socket.
pub struct MdnsSocket {
    socket: UdpSocket,
    family: Family,
}

impl MdnsSocket {
    /// Bind and join the IPv4 mDNS group (224.0.0.251:5353) on the given
    /// interface address, or `Ipv4Addr::UNSPECIFIED` to let the kernel pick.
    pub fn bind_v4(interface: Ipv4Addr) -> MdnsResult<Self> {
        let raw = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        raw.set_reuse_address(true)?;
        #[cfg(unix)]
        raw.set_reuse_port(true)?;

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, MDNS_PORT);
        raw.bind(&SockAddr::from(bind_addr))?;
        raw.join_multicast_v4(&MULTICAST_GROUP_V4, &interface)?;
        raw.set_multicast_loop_v4(true)?;
        raw.set_multicast_ttl_v4(255)?;
        raw.set_nonblocking(true)?;

        Ok(MdnsSocket { socket: raw.into(), family: Family::V4 })
    }

    /// Bind and join the IPv6 mDNS group (`[ff02::fb]:5353`) on the given
    /// interface index, or `0` to let the kernel pick.
    pub fn bind_v6(interface_index: u32) -> MdnsResult<Self> {
        let raw = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
        raw.set_reuse_address(true)?;
        #[cfg(unix)]
        raw.set_reuse_port(true)?;
        raw.set_only_v6(true)?;

        let bind_addr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, MDNS_PORT, 0, 0);
        raw.bind(&SockAddr::from(bind_addr))?;
        raw.join_multicast_v6(&MULTICAST_GROUP_V6, interface_index)?;
        raw.set_multicast_loop_v6(true)?;
        raw.set_nonblocking(true)?;

        Ok(MdnsSocket { socket: raw.into(), family: Family::V6 })
    }

    /// Bind an ephemeral, unjoined socket of the given family. Used for
    /// one-shot senders that only expect unicast replies back.
    pub fn bind_ephemeral(family: Family) -> MdnsResult<Self> {
        let raw = match family {
            Family::V4 => {
                let raw = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
                raw.bind(&SockAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)))?;
                raw
            }
            Family::V6 => {
                let raw = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
                raw.bind(&SockAddr::from(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0)))?;
                raw
            }
        };
        raw.set_nonblocking(true)?;
        Ok(MdnsSocket { socket: raw.into(), family })
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// The local address the kernel actually bound us to, e.g. to recover
    /// the ephemeral port for [`crate::message::build_query`]'s
    /// unicast-response decision.
    pub fn local_addr(&self) -> MdnsResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Send `buf` to the well-known multicast group/port for this socket's
    /// family.
    pub fn send_multicast(&self, buf: &[u8]) -> MdnsResult<usize> {
        let dest = match self.family {
            Family::V4 => SocketAddr::V4(SocketAddrV4::new(MULTICAST_GROUP_V4, MDNS_PORT)),
            Family::V6 => SocketAddr::V6(SocketAddrV6::new(MULTICAST_GROUP_V6, MDNS_PORT, 0, 0)),
        };
        self.send_to(buf, dest)
    }

    /// Send `buf` to a specific peer (used for unicast answers). Errors if
    /// the kernel reports fewer bytes sent than requested, since UDP never
    /// partially delivers a short write on its own.
    pub fn send_to(&self, buf: &[u8], dest: SocketAddr) -> MdnsResult<usize> {
        let sent = self.socket.send_to(buf, dest)?;
        if sent != buf.len() {
            return Err(MdnsError::new("short send: kernel accepted fewer bytes than requested"));
        }
        Ok(sent)
    }

    /// Non-blocking receive. `Ok(None)` means no datagram was waiting;
    /// callers should treat it the same as an empty poll tick, not an error.
    pub fn recv_from(&self, buf: &mut [u8]) -> MdnsResult<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok((len, from)) => Ok(Some((len, from))),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Picks the bind family implied by a target host's address, for callers
/// that want to mirror the destination's address family rather than hard
/// -code IPv4.
pub fn family_for(addr: IpAddr) -> Family {
    match addr {
        IpAddr::V4(_) => Family::V4,
        IpAddr::V6(_) => Family::V6,
    }
}
