//! Frame builders shared by the integration tests.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use acl_dataplane::{FiveTuple, IPPROTO_TCP, IPPROTO_UDP};

pub const TCP_FIN: u8 = 0x01;
pub const TCP_SYN: u8 = 0x02;
pub const TCP_RST: u8 = 0x04;
pub const TCP_ACK: u8 = 0x10;

fn ethernet(ethertype: u16) -> Vec<u8> {
    let mut f = vec![0x02, 0, 0, 0, 0, 1, 0x02, 0, 0, 0, 0, 2];
    f.extend_from_slice(&ethertype.to_be_bytes());
    f
}

fn l4(proto: u8, sport: u16, dport: u16, tcp_flags: u8) -> Vec<u8> {
    let mut h = Vec::new();
    h.extend_from_slice(&sport.to_be_bytes());
    h.extend_from_slice(&dport.to_be_bytes());
    match proto {
        IPPROTO_TCP => {
            h.extend_from_slice(&[0; 8]);
            h.push(0x50);
            h.push(tcp_flags);
            h.extend_from_slice(&[0; 6]);
        }
        IPPROTO_UDP => h.extend_from_slice(&[0, 8, 0, 0]),
        _ => {}
    }
    h
}

fn ipv4(src: Ipv4Addr, dst: Ipv4Addr, proto: u8, payload: &[u8]) -> Vec<u8> {
    let total = (20 + payload.len()) as u16;
    let mut p = vec![0x45, 0];
    p.extend_from_slice(&total.to_be_bytes());
    p.extend_from_slice(&[0, 0, 0x40, 0, 64, proto, 0, 0]);
    p.extend_from_slice(&src.octets());
    p.extend_from_slice(&dst.octets());
    p.extend_from_slice(payload);
    p
}

fn ipv6(src: Ipv6Addr, dst: Ipv6Addr, proto: u8, payload: &[u8]) -> Vec<u8> {
    let mut p = vec![0x60, 0, 0, 0];
    p.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    p.push(proto);
    p.push(64);
    p.extend_from_slice(&src.octets());
    p.extend_from_slice(&dst.octets());
    p.extend_from_slice(payload);
    p
}

/// Ethernet frame carrying `tuple` with the given TCP flags (ignored for UDP).
pub fn frame_with_flags(tuple: &FiveTuple, tcp_flags: u8) -> Vec<u8> {
    let payload = l4(tuple.proto, tuple.src_port, tuple.dst_port, tcp_flags);
    match (tuple.src, tuple.dst) {
        (IpAddr::V4(s), IpAddr::V4(d)) => {
            let mut f = ethernet(0x0800);
            f.extend(ipv4(s, d, tuple.proto, &payload));
            f
        }
        (IpAddr::V6(s), IpAddr::V6(d)) => {
            let mut f = ethernet(0x86dd);
            f.extend(ipv6(s, d, tuple.proto, &payload));
            f
        }
        _ => panic!("mixed-family tuple"),
    }
}

pub fn frame(tuple: &FiveTuple) -> Vec<u8> {
    frame_with_flags(tuple, TCP_ACK)
}

pub fn tcp(src: &str, dst: &str, sport: u16, dport: u16) -> FiveTuple {
    FiveTuple::new(src.parse().unwrap(), dst.parse().unwrap(), IPPROTO_TCP, sport, dport)
}

pub fn udp(src: &str, dst: &str, sport: u16, dport: u16) -> FiveTuple {
    FiveTuple::new(src.parse().unwrap(), dst.parse().unwrap(), IPPROTO_UDP, sport, dport)
}
