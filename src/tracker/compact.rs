//! Compact peer list decoding (BEP 23 for IPv4, BEP 7 for IPv6).

use std::net::{Ipv4Addr, Ipv6Addr};

use super::types::PeerAddr;

/// Bytes per IPv4 compact peer record.
pub const IPV4_RECORD_LEN: usize = 6;
/// Bytes per IPv6 compact peer record.
pub const IPV6_RECORD_LEN: usize = 18;

/// Decodes IPv4 compact peers: 4-byte big-endian address, 2-byte big-endian
/// port per record.
///
/// Inputs whose length is not a multiple of 6 decode to an empty list; a
/// ragged blob is treated as no peers, not as an error.
pub fn decode_ipv4(raw: &[u8]) -> Vec<PeerAddr> {
    if raw.len() % IPV4_RECORD_LEN != 0 {
        return Vec::new();
    }
    raw.chunks_exact(IPV4_RECORD_LEN)
        .map(|record| {
            let ip = Ipv4Addr::new(record[0], record[1], record[2], record[3]);
            let port = u16::from_be_bytes([record[4], record[5]]);
            PeerAddr::new(ip.to_string(), port)
        })
        .collect()
}

/// Decodes IPv6 compact peers: 16-byte address, 2-byte big-endian port per
/// record. Addresses render in RFC 5952 compressed form.
///
/// Inputs whose length is not a multiple of 18 decode to an empty list.
pub fn decode_ipv6(raw: &[u8]) -> Vec<PeerAddr> {
    if raw.len() % IPV6_RECORD_LEN != 0 {
        return Vec::new();
    }
    raw.chunks_exact(IPV6_RECORD_LEN)
        .map(|record| {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&record[..16]);
            let ip = Ipv6Addr::from(octets);
            let port = u16::from_be_bytes([record[16], record[17]]);
            PeerAddr::new(ip.to_string(), port)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ipv4_peers() {
        let raw = [
            192, 168, 1, 100, 0x1A, 0xE1, // 192.168.1.100:6881
            10, 0, 0, 1, 0x1A, 0xE2, // 10.0.0.1:6882
        ];
        let peers = decode_ipv4(&raw);
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].to_string(), "192.168.1.100:6881");
        assert_eq!(peers[1].to_string(), "10.0.0.1:6882");
    }

    #[test]
    fn test_decode_ipv4_ragged_length_yields_empty() {
        assert!(decode_ipv4(&[192, 168, 1, 100, 0x1A]).is_empty());
        assert!(decode_ipv4(&[1, 2, 3, 4, 5, 6, 7]).is_empty());
    }

    #[test]
    fn test_decode_ipv4_empty_input() {
        assert!(decode_ipv4(&[]).is_empty());
    }

    #[test]
    fn test_decode_ipv4_port_is_big_endian() {
        let peers = decode_ipv4(&[1, 2, 3, 4, 0x00, 0x50]);
        assert_eq!(peers[0].port, 80);
    }

    #[test]
    fn test_decode_ipv6_peers() {
        let mut raw = [0u8; 18];
        raw[15] = 1; // ::1
        raw[16] = 0xC8;
        raw[17] = 0xD5; // port 51413
        let peers = decode_ipv6(&raw);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].to_string(), "::1:51413");
    }

    #[test]
    fn test_decode_ipv6_renders_rfc_5952() {
        let mut raw = [0u8; 18];
        raw[0] = 0xFE;
        raw[1] = 0x80;
        raw[15] = 1; // fe80::1
        raw[16] = 0x1A;
        raw[17] = 0xE1;
        let peers = decode_ipv6(&raw);
        assert_eq!(peers[0].ip, "fe80::1");
        assert_eq!(peers[0].port, 6881);
    }

    #[test]
    fn test_decode_ipv6_ragged_length_yields_empty() {
        assert!(decode_ipv6(&[0u8; 17]).is_empty());
    }
}
