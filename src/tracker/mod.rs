//! Tracker communication: announce/scrape over HTTP(S) and UDP, plus the
//! tiered scheduler that drives periodic announces for a torrent session.
//!
//! The HTTP client follows BEP 3 (with BEP 48 scrape URL derivation), the UDP
//! client implements BEP 15, and [`TrackerManager`] rotates across BEP 12
//! tiers with exponential backoff on failing endpoints.

pub mod compact;
pub mod endpoint;
pub mod http;
pub mod manager;
pub mod types;
pub mod udp;

// Re-export public API
pub use endpoint::{Scheme, TrackerEndpoint, TrackerTier};
pub use http::{HttpFetch, HttpResponse, HttpTrackerClient, ReqwestFetch};
pub use manager::TrackerManager;
pub use types::{
    AnnounceEvent, AnnounceRequest, AnnounceResponse, PeerAddr, ScrapeMap, ScrapeStats,
    TrackerClient,
};
pub use udp::UdpTrackerClient;

/// Errors that can occur during tracker operations.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The HTTP transport failed below the protocol level (DNS, TCP, TLS,
    /// timeout).
    #[error("HTTP transport failed")]
    HttpTransport(#[from] reqwest::Error),

    /// The tracker answered with an HTTP error status; the body is not parsed.
    #[error("HTTP status {code}")]
    HttpStatus {
        /// Status code, always >= 400
        code: u16,
    },

    /// The announce response body was not a well-formed tracker reply.
    #[error("malformed announce response: {reason}")]
    MalformedAnnounce {
        /// What failed to parse
        reason: String,
    },

    /// The scrape response body was not a well-formed tracker reply.
    #[error("malformed scrape response: {reason}")]
    MalformedScrape {
        /// What failed to parse
        reason: String,
    },

    /// The tracker reported a failure in-protocol (`failure reason`).
    #[error("tracker failure: {reason}")]
    TrackerFailure {
        /// Tracker-supplied failure text
        reason: String,
    },

    /// An announce URL was not syntactically valid.
    #[error("invalid announce url")]
    UrlParse(#[from] url::ParseError),

    /// A UDP tracker URL was not of the form `udp://host[:port][/...]`.
    #[error("invalid udp tracker url: {url}")]
    UdpUrl {
        /// The offending URL
        url: String,
    },

    /// A UDP tracker URL used a form this client does not speak
    /// (bracketed IPv6 literals).
    #[error("unsupported udp tracker url form: {url}")]
    UnsupportedUrlForm {
        /// The offending URL
        url: String,
    },

    /// The UDP tracker host did not resolve.
    #[error("name resolution failed for {host}")]
    UdpResolve {
        /// Host that failed to resolve
        host: String,
    },

    /// Creating or binding the UDP socket failed.
    #[error("udp socket error")]
    UdpSocket(#[source] std::io::Error),

    /// Sending a UDP packet failed.
    #[error("udp send error")]
    UdpSend(#[source] std::io::Error),

    /// Receiving a UDP packet failed (distinct from a receive timeout, which
    /// is retried).
    #[error("udp receive error")]
    UdpRecv(#[source] std::io::Error),

    /// The tracker answered with an in-protocol error (action = 3).
    #[error("udp tracker error: {message}")]
    UdpProtocol {
        /// Tracker-supplied error text
        message: String,
    },

    /// A scrape reply was shorter than the 12 bytes per requested infohash.
    #[error("udp scrape response shorter than expected")]
    UdpShortResponse,

    /// All retry attempts for one logical UDP operation were used up.
    #[error("udp {operation} exhausted {attempts} attempts")]
    UdpExhausted {
        /// The operation that gave up
        operation: &'static str,
        /// How many attempts were made
        attempts: u32,
    },

    /// A tracker tier was constructed with no endpoints.
    #[error("tracker tier has no endpoints")]
    EmptyTier,
}
