//! Core types and enumerations for tracker communication.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use super::TrackerError;
use crate::{InfoHash, PeerId};

/// BitTorrent announce events.
///
/// Reported to the tracker on session state changes; `None` marks the
/// periodic keep-alive announces in between.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnnounceEvent {
    /// Periodic announce with no state change
    #[default]
    None,
    /// Client started downloading this torrent
    Started,
    /// Client completed the download
    Completed,
    /// Client is leaving the swarm
    Stopped,
}

impl AnnounceEvent {
    /// Query-string value for HTTP announces; `None` events are omitted.
    pub fn query_value(self) -> Option<&'static str> {
        match self {
            AnnounceEvent::None => None,
            AnnounceEvent::Started => Some("started"),
            AnnounceEvent::Completed => Some("completed"),
            AnnounceEvent::Stopped => Some("stopped"),
        }
    }

    /// BEP 15 wire encoding: none = 0, completed = 1, started = 2, stopped = 3.
    pub(crate) fn wire_code(self) -> u32 {
        match self {
            AnnounceEvent::None => 0,
            AnnounceEvent::Completed => 1,
            AnnounceEvent::Started => 2,
            AnnounceEvent::Stopped => 3,
        }
    }
}

impl fmt::Display for AnnounceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.query_value().unwrap_or("none"))
    }
}

/// Tracker announce request.
///
/// Session statistics and torrent identity sent on every announce. The
/// same request shape feeds both the HTTP and the UDP client.
#[derive(Debug, Clone)]
pub struct AnnounceRequest {
    /// Torrent being announced
    pub info_hash: InfoHash,
    /// Client's session identifier
    pub peer_id: PeerId,
    /// TCP port the client listens on for peer connections
    pub port: u16,
    /// Total bytes uploaded this session
    pub uploaded: u64,
    /// Total bytes downloaded this session
    pub downloaded: u64,
    /// Bytes remaining to download (0 for seeders)
    pub left: u64,
    /// Session state change being reported
    pub event: AnnounceEvent,
    /// How many peers the client wants back
    pub numwant: u32,
    /// Random per-session key echoed to the tracker (decimal on HTTP)
    pub key: u32,
    /// Request the compact peer encoding
    pub compact: bool,
    /// Ask the tracker to omit peer ids in non-compact replies
    pub no_peer_id: bool,
    /// Client's IPv6 address, when it wants v6 peers to find it
    pub ipv6: Option<String>,
    /// Opaque tracker id echoed from an earlier response
    pub tracker_id: Option<String>,
}

impl Default for AnnounceRequest {
    fn default() -> Self {
        Self {
            info_hash: InfoHash::default(),
            peer_id: PeerId::default(),
            port: 6881,
            uploaded: 0,
            downloaded: 0,
            left: 0,
            event: AnnounceEvent::None,
            numwant: 50,
            key: 0,
            compact: true,
            no_peer_id: true,
            ipv6: None,
            tracker_id: None,
        }
    }
}

/// Tracker announce response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnounceResponse {
    /// Seconds until the next periodic announce
    pub interval: u32,
    /// Tracker-imposed minimum interval, when stated
    pub min_interval: Option<u32>,
    /// Seeders in the swarm
    pub complete: u32,
    /// Leechers in the swarm
    pub incomplete: u32,
    /// Discovered peer endpoints
    pub peers: Vec<PeerAddr>,
    /// Human-readable warning that does not fail the announce
    pub warning: Option<String>,
    /// Opaque id to echo on subsequent announces
    pub tracker_id: Option<String>,
}

/// A peer endpoint discovered through a tracker.
///
/// The address is kept in presentation form (dotted quad or RFC 5952) since
/// non-compact tracker replies may carry hostnames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddr {
    /// Address in presentation form
    pub ip: String,
    /// Peer's listen port
    pub port: u16,
    /// Peer id, rarely present and only in non-compact replies
    pub peer_id: Option<PeerId>,
}

impl PeerAddr {
    /// Creates a peer address without a peer id.
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            peer_id: None,
        }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Aggregate swarm statistics for one torrent from a scrape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeStats {
    /// Seeders (peers with the complete payload)
    pub complete: u32,
    /// Total completed downloads ever observed
    pub downloaded: u32,
    /// Leechers (peers still downloading)
    pub incomplete: u32,
    /// Torrent name, when the tracker shares it
    pub name: Option<String>,
}

/// Scrape results keyed by infohash, in hash order.
pub type ScrapeMap = BTreeMap<InfoHash, ScrapeStats>;

/// Abstract tracker communication interface.
///
/// Two implementations exist - [`super::HttpTrackerClient`] for HTTP(S) and
/// [`super::UdpTrackerClient`] for BEP 15 - and the manager dispatches by URL
/// scheme. Implementations share no mutable state with one another.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// Announces client presence and retrieves a peer list.
    ///
    /// # Errors
    ///
    /// - `TrackerError` - Transport failure, malformed reply, or a tracker-reported failure
    async fn announce(
        &self,
        request: &AnnounceRequest,
        announce_url: &str,
    ) -> Result<AnnounceResponse, TrackerError>;

    /// Retrieves aggregate swarm statistics without joining the swarm.
    ///
    /// # Errors
    ///
    /// - `TrackerError` - Transport failure, malformed reply, or a tracker-reported failure
    async fn scrape(
        &self,
        info_hashes: &[InfoHash],
        scrape_url: &str,
    ) -> Result<ScrapeMap, TrackerError>;
}
