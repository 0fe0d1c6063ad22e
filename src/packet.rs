//! Checked header parsing.
//!
//! Extracts the 5-tuple from an Ethernet frame (or a bare IP packet). Every
//! field read is bounds-checked against the buffer, so VLAN tags, IPv4
//! options and IPv6 extension headers are walked rather than assumed away.
//! A buffer that ends early yields `MalformedPacket`, never a panic.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{AclError, MalformedKind, Result};
use crate::types::{FiveTuple, IPPROTO_TCP, IPPROTO_UDP};

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86dd;
pub const ETHERTYPE_VLAN: u16 = 0x8100;
pub const ETHERTYPE_QINQ: u16 = 0x88a8;
pub const ETHERTYPE_QINQ_LEGACY: u16 = 0x9100;

const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const MAX_VLAN_TAGS: usize = 2;
const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const MAX_IPV6_EXTENSION_HEADERS: usize = 8;

const IPV6_EXT_HOP_BY_HOP: u8 = 0;
const IPV6_EXT_ROUTING: u8 = 43;
const IPV6_EXT_FRAGMENT: u8 = 44;
const IPV6_EXT_AUTH: u8 = 51;
const IPV6_EXT_DEST_OPTS: u8 = 60;

/// TCP header flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags(pub u8);

impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const ACK: u8 = 0x10;

    pub fn is_fin(self) -> bool {
        self.0 & Self::FIN != 0
    }

    pub fn is_syn(self) -> bool {
        self.0 & Self::SYN != 0
    }

    pub fn is_rst(self) -> bool {
        self.0 & Self::RST != 0
    }

    /// FIN or RST: the flow is being torn down
    pub fn is_teardown(self) -> bool {
        self.is_fin() || self.is_rst()
    }
}

/// Headers parsed out of one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeaders {
    pub tuple: FiveTuple,
    /// Offset of the IP header within the parsed buffer
    pub l3_offset: usize,
    /// Offset of the L4 header; `None` for non-first fragments
    pub l4_offset: Option<usize>,
    /// Present for TCP segments carrying a full flags byte
    pub tcp_flags: Option<TcpFlags>,
    pub vlan_tags: u8,
}

/// Bounds-checked view over a packet buffer
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn u8_at(&self, off: usize) -> Result<u8> {
        self.buf.get(off).copied().ok_or_else(AclError::truncated)
    }

    fn u16_at(&self, off: usize) -> Result<u16> {
        let b = self.slice(off, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn slice(&self, off: usize, len: usize) -> Result<&'a [u8]> {
        let end = off.checked_add(len).ok_or_else(AclError::truncated)?;
        self.buf.get(off..end).ok_or_else(AclError::truncated)
    }

    fn array<const N: usize>(&self, off: usize) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.slice(off, N)?);
        Ok(out)
    }
}

/// Parse an Ethernet frame.
///
/// Returns `Ok(None)` when the frame does not carry IPv4/IPv6; such packets
/// are outside the scope of classification.
pub fn parse_ethernet(frame: &[u8]) -> Result<Option<PacketHeaders>> {
    let r = Reader::new(frame);
    let mut ethertype = r.u16_at(12)?;
    let mut offset = ETHERNET_HEADER_LEN;
    let mut vlan_tags = 0u8;

    while matches!(
        ethertype,
        ETHERTYPE_VLAN | ETHERTYPE_QINQ | ETHERTYPE_QINQ_LEGACY
    ) {
        if usize::from(vlan_tags) == MAX_VLAN_TAGS {
            return Ok(None);
        }
        // TCI occupies the first two bytes of the tag; the inner ethertype follows.
        ethertype = r.u16_at(offset + 2)?;
        offset += VLAN_TAG_LEN;
        vlan_tags += 1;
    }

    let headers = match ethertype {
        ETHERTYPE_IPV4 => parse_ipv4_at(&r, offset)?,
        ETHERTYPE_IPV6 => parse_ipv6_at(&r, offset)?,
        _ => return Ok(None),
    };
    Ok(Some(PacketHeaders {
        vlan_tags,
        ..headers
    }))
}

/// Parse a bare IP packet; the version nibble selects the family.
pub fn parse_ip(packet: &[u8]) -> Result<PacketHeaders> {
    let r = Reader::new(packet);
    match r.u8_at(0)? >> 4 {
        4 => parse_ipv4_at(&r, 0),
        6 => parse_ipv6_at(&r, 0),
        _ => Err(AclError::malformed(MalformedKind::BadIpVersion)),
    }
}

fn parse_ipv4_at(r: &Reader<'_>, l3: usize) -> Result<PacketHeaders> {
    let vihl = r.u8_at(l3)?;
    if vihl >> 4 != 4 {
        return Err(AclError::malformed(MalformedKind::BadIpVersion));
    }
    let ihl = usize::from(vihl & 0x0f) * 4;
    if ihl < IPV4_MIN_HEADER_LEN {
        return Err(AclError::malformed(MalformedKind::BadHeaderLength));
    }
    // The whole header, options included, must be present.
    r.slice(l3, ihl)?;

    let frag = r.u16_at(l3 + 6)?;
    let proto = r.u8_at(l3 + 9)?;
    let src = IpAddr::V4(Ipv4Addr::from(r.array::<4>(l3 + 12)?));
    let dst = IpAddr::V4(Ipv4Addr::from(r.array::<4>(l3 + 16)?));

    let l4 = if frag & 0x1fff == 0 {
        Some(l3 + ihl)
    } else {
        None
    };
    finish(r, l3, l4, proto, src, dst)
}

fn parse_ipv6_at(r: &Reader<'_>, l3: usize) -> Result<PacketHeaders> {
    if r.u8_at(l3)? >> 4 != 6 {
        return Err(AclError::malformed(MalformedKind::BadIpVersion));
    }
    r.slice(l3, IPV6_HEADER_LEN)?;

    let mut next = r.u8_at(l3 + 6)?;
    let src = IpAddr::V6(Ipv6Addr::from(r.array::<16>(l3 + 8)?));
    let dst = IpAddr::V6(Ipv6Addr::from(r.array::<16>(l3 + 24)?));

    let mut offset = l3 + IPV6_HEADER_LEN;
    let mut l4 = Some(offset);
    let mut walked = 0;
    loop {
        let len = match next {
            IPV6_EXT_HOP_BY_HOP | IPV6_EXT_ROUTING | IPV6_EXT_DEST_OPTS => {
                (usize::from(r.u8_at(offset + 1)?) + 1) * 8
            }
            IPV6_EXT_AUTH => (usize::from(r.u8_at(offset + 1)?) + 2) * 4,
            IPV6_EXT_FRAGMENT => {
                if r.u16_at(offset + 2)? & 0xfff8 != 0 {
                    // Only the first fragment carries the L4 header.
                    l4 = None;
                }
                8
            }
            _ => break,
        };
        walked += 1;
        if walked > MAX_IPV6_EXTENSION_HEADERS {
            return Err(AclError::malformed(MalformedKind::BadHeaderLength));
        }
        r.slice(offset, len)?;
        next = r.u8_at(offset)?;
        offset += len;
        if l4.is_some() {
            l4 = Some(offset);
        }
    }
    finish(r, l3, l4, next, src, dst)
}

fn finish(
    r: &Reader<'_>,
    l3: usize,
    l4: Option<usize>,
    proto: u8,
    src: IpAddr,
    dst: IpAddr,
) -> Result<PacketHeaders> {
    let mut src_port = 0;
    let mut dst_port = 0;
    let mut tcp_flags = None;

    if let Some(l4) = l4 {
        match proto {
            IPPROTO_TCP => {
                src_port = r.u16_at(l4)?;
                dst_port = r.u16_at(l4 + 2)?;
                tcp_flags = Some(TcpFlags(r.u8_at(l4 + 13)?));
            }
            IPPROTO_UDP => {
                r.slice(l4, 8)?;
                src_port = r.u16_at(l4)?;
                dst_port = r.u16_at(l4 + 2)?;
            }
            _ => {}
        }
    }

    Ok(PacketHeaders {
        tuple: FiveTuple::new(src, dst, proto, src_port, dst_port),
        l3_offset: l3,
        l4_offset: l4,
        tcp_flags,
        vlan_tags: 0,
    })
}
