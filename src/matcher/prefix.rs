use std::net::IpAddr;

use ipnet::IpNet;

/// Check whether `addr` lies inside `prefix`.
///
/// Length 0 matches any address of the prefix's family. Whole bytes are
/// compared first, then the trailing partial byte is masked.
#[inline]
pub fn match_addr(addr: &IpAddr, prefix: &IpNet) -> bool {
    match (addr, prefix) {
        (IpAddr::V4(a), IpNet::V4(net)) => {
            let len = u32::from(net.prefix_len());
            if len == 0 {
                return true;
            }
            let mask = u32::MAX << (32 - len);
            (u32::from(*a) & mask) == (u32::from(net.addr()) & mask)
        }
        (IpAddr::V6(a), IpNet::V6(net)) => {
            match_prefix_bytes(&a.octets(), &net.addr().octets(), net.prefix_len())
        }
        _ => false,
    }
}

/// Byte-wise prefix comparison over equally sized address buffers.
#[inline]
pub fn match_prefix_bytes(addr: &[u8], net: &[u8], prefix_len: u8) -> bool {
    let prefix_len = usize::from(prefix_len);
    if prefix_len == 0 {
        return true;
    }
    let full = prefix_len / 8;
    let rem = prefix_len % 8;
    if full > addr.len() || full > net.len() {
        return false;
    }
    if addr[..full] != net[..full] {
        return false;
    }
    if rem == 0 {
        return true;
    }
    match (addr.get(full), net.get(full)) {
        (Some(a), Some(n)) => {
            let mask = 0xFFu8 << (8 - rem);
            (a & mask) == (n & mask)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::*;

    fn v4(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    #[test]
    fn test_match_v4_prefix() {
        let n = net("10.0.0.0/24");
        assert!(match_addr(&v4("10.0.0.5"), &n));
        assert!(match_addr(&v4("10.0.0.255"), &n));
        assert!(!match_addr(&v4("10.0.1.5"), &n));
    }

    #[test]
    fn test_zero_length_matches_anything() {
        assert!(match_addr(&v4("203.0.113.9"), &net("0.0.0.0/0")));
        assert!(match_addr(&v4("203.0.113.9"), &net("10.0.0.0/0")));
        let any6 = net("::/0");
        assert!(match_addr(&IpAddr::V6(Ipv6Addr::LOCALHOST), &any6));
    }

    #[test]
    fn test_family_mismatch_never_matches() {
        assert!(!match_addr(&IpAddr::V6(Ipv6Addr::LOCALHOST), &net("0.0.0.0/0")));
        assert!(!match_addr(&IpAddr::V4(Ipv4Addr::LOCALHOST), &net("::/0")));
    }

    #[test]
    fn test_match_v6_partial_byte() {
        let n = net("2001:db8:ff00::/41");
        assert!(match_addr(&"2001:db8:ff00::1".parse().unwrap(), &n));
        assert!(match_addr(&"2001:db8:ff7f::1".parse().unwrap(), &n));
        assert!(!match_addr(&"2001:db8:ff80::1".parse().unwrap(), &n));
    }

    #[test]
    fn test_host_bits_in_prefix_are_ignored() {
        // 10.0.0.77/24 is stored as given; only the leading 24 bits count.
        let n = net("10.0.0.77/24");
        assert!(match_addr(&v4("10.0.0.1"), &n));
    }

    #[test]
    fn test_full_length_is_exact() {
        assert!(match_addr(&v4("192.0.2.1"), &net("192.0.2.1/32")));
        assert!(!match_addr(&v4("192.0.2.2"), &net("192.0.2.1/32")));
        let n = net("2001:db8::1/128");
        assert!(match_addr(&"2001:db8::1".parse().unwrap(), &n));
        assert!(!match_addr(&"2001:db8::2".parse().unwrap(), &n));
    }
}
