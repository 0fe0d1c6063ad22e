use std::fmt;
use std::net::IpAddr;

use ipnet::{IpNet, Ipv4Net};

use crate::error::{AclError, Result};

/// IP protocol number for TCP
pub const IPPROTO_TCP: u8 = 6;
/// IP protocol number for UDP
pub const IPPROTO_UDP: u8 = 17;

/// Opaque handle to an ACL in the rule store.
///
/// The generation guards against a stale handle silently addressing a slot
/// that was freed and reused by a later ACL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AclHandle {
    index: u32,
    generation: u32,
}

impl AclHandle {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the rule store
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Pack into a single integer for the management API.
    pub fn to_raw(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

impl fmt::Display for AclHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.generation)
    }
}

/// Direction a packet traverses an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn from_is_input(is_input: bool) -> Self {
        if is_input {
            Direction::Input
        } else {
            Direction::Output
        }
    }

    pub fn is_input(self) -> bool {
        self == Direction::Input
    }

    /// The other side of the interface
    pub fn opposite(self) -> Self {
        match self {
            Direction::Input => Direction::Output,
            Direction::Output => Direction::Input,
        }
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            Direction::Input => 0,
            Direction::Output => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// Rule action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Deny,
    Permit,
    /// Permit and create a session so the return traffic is permitted too
    PermitReflect,
}

impl Action {
    pub fn is_permit(self) -> bool {
        !matches!(self, Action::Deny)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Deny => "deny",
            Action::Permit => "permit",
            Action::PermitReflect => "permit+reflect",
        }
    }
}

/// One access-control entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub action: Action,
    /// Source prefix; its family is the rule's family
    pub src: IpNet,
    pub dst: IpNet,
    /// IP protocol, 0 matches any
    pub proto: u8,
    /// Source port, 0 matches any
    pub src_port: u16,
    /// Destination port, 0 matches any
    pub dst_port: u16,
}

impl Rule {
    /// Create a rule, checking that both prefixes share a family.
    pub fn new(
        action: Action,
        src: IpNet,
        dst: IpNet,
        proto: u8,
        src_port: u16,
        dst_port: u16,
    ) -> Result<Self> {
        if matches!(src, IpNet::V6(_)) != matches!(dst, IpNet::V6(_)) {
            return Err(AclError::InvalidRule(format!(
                "address family mismatch: {} vs {}",
                src, dst
            )));
        }
        Ok(Self {
            action,
            src,
            dst,
            proto,
            src_port,
            dst_port,
        })
    }

    /// IPv4 rule matching any packet of that family
    pub fn any_v4(action: Action) -> Self {
        let any = IpNet::V4(Ipv4Net::default());
        Self {
            action,
            src: any,
            dst: any,
            proto: 0,
            src_port: 0,
            dst_port: 0,
        }
    }

    pub fn with_proto(mut self, proto: u8) -> Self {
        self.proto = proto;
        self
    }

    pub fn with_src(mut self, src: IpNet) -> Self {
        self.src = src;
        self
    }

    pub fn with_dst(mut self, dst: IpNet) -> Self {
        self.dst = dst;
        self
    }

    pub fn with_src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn with_dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self.src, IpNet::V6(_))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.is_ipv6() != matches!(self.dst, IpNet::V6(_)) {
            return Err(AclError::InvalidRule(format!(
                "address family mismatch: {} vs {}",
                self.src, self.dst
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} proto {} sport {} dport {}",
            self.action.as_str(),
            self.src,
            self.dst,
            self.proto,
            self.src_port,
            self.dst_port
        )
    }
}

/// An ordered list of rules, immutable once committed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Acl {
    pub tag: String,
    pub rules: Vec<Rule>,
}

impl Acl {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            tag: String::new(),
            rules,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Addresses, ports and protocol identifying a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiveTuple {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub proto: u8,
    /// Zero for protocols without ports
    pub src_port: u16,
    pub dst_port: u16,
}

impl FiveTuple {
    pub fn new(src: IpAddr, dst: IpAddr, proto: u8, src_port: u16, dst_port: u16) -> Self {
        Self {
            src,
            dst,
            proto,
            src_port,
            dst_port,
        }
    }

    /// The tuple a reply packet of this flow carries
    pub fn mirrored(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
            proto: self.proto,
            src_port: self.dst_port,
            dst_port: self.src_port,
        }
    }

    pub fn is_ipv6(&self) -> bool {
        self.src.is_ipv6()
    }

    pub fn is_tcp(&self) -> bool {
        self.proto == IPPROTO_TCP
    }

    pub fn is_udp(&self) -> bool {
        self.proto == IPPROTO_UDP
    }
}

impl fmt::Display for FiveTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} proto {}",
            self.src, self.src_port, self.dst, self.dst_port, self.proto
        )
    }
}

/// Permit or deny
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Permit,
    Deny,
}

impl Verdict {
    pub fn is_permit(self) -> bool {
        self == Verdict::Permit
    }
}

/// Result of evaluating an interface's bound ACLs against a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    /// ACL holding the first matching rule; `None` when the default policy applied
    pub matched_acl: Option<AclHandle>,
    /// Position of the matching rule inside `matched_acl`
    pub matched_rule_index: Option<usize>,
    /// Action of the matching rule
    pub action: Option<Action>,
}

impl Classification {
    pub(crate) fn matched(acl: AclHandle, index: usize, action: Action) -> Self {
        Self {
            verdict: if action.is_permit() {
                Verdict::Permit
            } else {
                Verdict::Deny
            },
            matched_acl: Some(acl),
            matched_rule_index: Some(index),
            action: Some(action),
        }
    }

    pub(crate) fn unmatched(verdict: Verdict) -> Self {
        Self {
            verdict,
            matched_acl: None,
            matched_rule_index: None,
            action: None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.matched_acl.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_protocol_helpers() {
        let t = FiveTuple::new("10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap(), IPPROTO_TCP, 1, 2);
        assert!(t.is_tcp());
        assert!(!t.is_udp());
        let u = FiveTuple { proto: IPPROTO_UDP, ..t };
        assert!(u.is_udp());
        assert!(u.mirrored().is_udp());
    }

    #[test]
    fn test_handle_raw_roundtrip() {
        let h = AclHandle::new(7, 3);
        assert_eq!(AclHandle::from_raw(h.to_raw()), h);
        assert_eq!(h.to_raw(), (3u64 << 32) | 7);
    }

    #[test]
    fn test_rule_family_mismatch() {
        let src: IpNet = "10.0.0.0/8".parse().unwrap();
        let dst: IpNet = "2001:db8::/32".parse().unwrap();
        assert!(Rule::new(Action::Permit, src, dst, 0, 0, 0).is_err());
    }

    #[test]
    fn test_mirrored_tuple() {
        let t = FiveTuple::new(
            "10.0.0.1".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
            IPPROTO_TCP,
            1234,
            80,
        );
        let m = t.mirrored();
        assert_eq!(m.src, t.dst);
        assert_eq!(m.dst_port, 1234);
        assert_eq!(m.mirrored(), t);
    }

    #[test]
    fn test_direction_opposite() {
        assert_eq!(Direction::Input.opposite(), Direction::Output);
        assert_eq!(Direction::from_is_input(false), Direction::Output);
    }
}
