//! Ebbtide - BitTorrent tracker communication

#![deny(missing_docs)]
#![deny(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::too_many_lines)]
//!
//! This crate implements the tracker-facing half of a BitTorrent client:
//! bencode decoding and canonical encoding, `.torrent` and magnet metainfo
//! loading with byte-exact infohash computation, announce/scrape clients for
//! HTTP(S) and UDP (BEP 15) trackers, and a tiered scheduler that keeps a
//! torrent session announced across heterogeneous trackers.
//!
//! Peer wire protocol, piece storage, and DHT are out of scope; the crate
//! stops at delivering discovered peer endpoints to the caller.

pub mod bencode;
pub mod config;
pub mod metainfo;
pub mod tracing_setup;
pub mod tracker;

use std::fmt;
use std::str::FromStr;

use rand::Rng;

// Re-export main types for convenient access
pub use config::EbbtideConfig;
pub use metainfo::{FileEntry, InfoDictionary, Metainfo, MetainfoError};
pub use tracing_setup::{init_tracing, LogLevel};
pub use tracker::{
    AnnounceEvent, AnnounceRequest, AnnounceResponse, PeerAddr, ScrapeStats, TrackerError,
    TrackerManager,
};

/// SHA-1 hash identifying a unique torrent swarm.
///
/// 20-byte SHA-1 hash of the exact `info` value bytes from a metainfo file.
/// Ordering is byte-lexicographic, so hashes can key sorted maps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates an `InfoHash` from a 20-byte SHA-1 digest.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns a reference to the underlying 20-byte digest.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for InfoHash {
    type Err = MetainfoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = hex::decode(s).map_err(|_| MetainfoError::InvalidInfohashEncoding)?;
        let bytes: [u8; 20] = decoded
            .try_into()
            .map_err(|_| MetainfoError::InvalidInfohashEncoding)?;
        Ok(Self(bytes))
    }
}

/// Client identifier reported to trackers.
///
/// 20 opaque bytes, generated once per session. Generated ids follow the
/// Azureus convention: a fixed `-EB0001-` prefix and twelve random bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PeerId([u8; 20]);

/// Azureus-style client prefix for generated peer ids.
const PEER_ID_PREFIX: &[u8; 8] = b"-EB0001-";

impl PeerId {
    /// Creates a `PeerId` from caller-provided bytes.
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Generates a fresh session peer id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 20];
        bytes[..PEER_ID_PREFIX.len()].copy_from_slice(PEER_ID_PREFIX);
        rand::thread_rng().fill(&mut bytes[PEER_ID_PREFIX.len()..]);
        Self(bytes)
    }

    /// Returns a reference to the underlying 20 bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_hash_display() {
        let hash = [
            0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab,
            0xcd, 0xef, 0x01, 0x23, 0x45, 0x67,
        ];
        let info_hash = InfoHash::new(hash);
        assert_eq!(
            info_hash.to_string(),
            "0123456789abcdef0123456789abcdef01234567"
        );
    }

    #[test]
    fn test_info_hash_round_trips_through_hex() {
        let hash = InfoHash::new([0xA5; 20]);
        let parsed: InfoHash = hash.to_string().parse().unwrap();
        assert_eq!(parsed, hash);
    }

    #[test]
    fn test_info_hash_rejects_bad_hex() {
        assert!("zz".repeat(20).parse::<InfoHash>().is_err());
        assert!("abcd".parse::<InfoHash>().is_err());
    }

    #[test]
    fn test_info_hash_ordering_is_bytewise() {
        let low = InfoHash::new([0x00; 20]);
        let high = InfoHash::new([0xFF; 20]);
        assert!(low < high);
    }

    #[test]
    fn test_peer_id_generate_carries_prefix() {
        let id = PeerId::generate();
        assert_eq!(&id.as_bytes()[..8], PEER_ID_PREFIX);
    }

    #[test]
    fn test_peer_id_generate_is_random() {
        assert_ne!(PeerId::generate(), PeerId::generate());
    }
}
