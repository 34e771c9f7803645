//! UDP tracker client implementing the BEP 15 binary protocol.
//!
//! Every logical operation (connect, announce, scrape) runs an attempt loop:
//! per-attempt receive timeout, exponential backoff between attempts. Short
//! or mismatched replies count as "no reply yet"; an action-3 reply is a
//! terminal tracker-reported error. Connection ids are cached per resolved
//! address with a 60-second lifetime.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{Buf, BufMut};
use rand::Rng;
use tokio::net::{lookup_host, UdpSocket};

use super::types::{AnnounceRequest, AnnounceResponse, ScrapeMap, ScrapeStats, TrackerClient};
use super::{compact, TrackerError};
use crate::config::NetworkConfig;
use crate::tracing_setup::redacted;
use crate::InfoHash;

const PROTOCOL_MAGIC: u64 = 0x0417_2710_1980;
const ACTION_CONNECT: u32 = 0;
const ACTION_ANNOUNCE: u32 = 1;
const ACTION_SCRAPE: u32 = 2;
const ACTION_ERROR: u32 = 3;

const DEFAULT_UDP_PORT: u16 = 6969;
/// Wire value asking the tracker for its default peer count.
const NUMWANT_DEFAULT: u32 = 0xFFFF_FFFF;

const CONNECT_RESPONSE_LEN: usize = 16;
const ANNOUNCE_RESPONSE_MIN_LEN: usize = 20;
const SCRAPE_STATS_LEN: usize = 12;

struct CachedConnection {
    id: u64,
    expires: Instant,
}

/// BEP 15 UDP tracker client.
///
/// One instance serves every UDP endpoint the manager knows; the connection
/// id cache is per-instance state and is never shared with the HTTP client.
pub struct UdpTrackerClient {
    receive_timeout: Duration,
    max_attempts: u32,
    backoff_start: Duration,
    connection_ttl: Duration,
    connections: Mutex<HashMap<SocketAddr, CachedConnection>>,
}

impl UdpTrackerClient {
    /// Creates a client with the configured retry schedule.
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            receive_timeout: config.udp_timeout,
            max_attempts: config.udp_max_attempts,
            backoff_start: config.udp_backoff_start,
            connection_ttl: config.udp_connection_ttl,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Splits `udp://host[:port][/ignored]` into host and port, defaulting
    /// the port to 6969. Bracketed IPv6 literals are not implemented.
    fn parse_url(url: &str) -> Result<(String, u16), TrackerError> {
        let rest = url.strip_prefix("udp://").ok_or_else(|| TrackerError::UdpUrl {
            url: url.to_string(),
        })?;
        let host_port = rest.split('/').next().unwrap_or("");
        if host_port.is_empty() {
            return Err(TrackerError::UdpUrl {
                url: url.to_string(),
            });
        }
        if host_port.starts_with('[') {
            return Err(TrackerError::UnsupportedUrlForm {
                url: url.to_string(),
            });
        }

        match host_port.rsplit_once(':') {
            Some((host, port_text)) => {
                if host.is_empty() {
                    return Err(TrackerError::UdpUrl {
                        url: url.to_string(),
                    });
                }
                if port_text.is_empty() {
                    return Ok((host.to_string(), DEFAULT_UDP_PORT));
                }
                let port: u16 = port_text.parse().map_err(|_| TrackerError::UdpUrl {
                    url: url.to_string(),
                })?;
                if port == 0 {
                    return Err(TrackerError::UdpUrl {
                        url: url.to_string(),
                    });
                }
                Ok((host.to_string(), port))
            }
            None => Ok((host_port.to_string(), DEFAULT_UDP_PORT)),
        }
    }

    /// Resolves the tracker host, preferring IPv4 since only IPv4 compact
    /// peers are parsed, falling back to any family.
    async fn resolve(host: &str, port: u16) -> Result<SocketAddr, TrackerError> {
        let addrs: Vec<SocketAddr> = lookup_host((host, port))
            .await
            .map_err(|_| TrackerError::UdpResolve {
                host: host.to_string(),
            })?
            .collect();
        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| TrackerError::UdpResolve {
                host: host.to_string(),
            })
    }

    async fn bind_socket(remote: SocketAddr) -> Result<UdpSocket, TrackerError> {
        let local: SocketAddr = if remote.is_ipv4() {
            (IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0).into()
        } else {
            (IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0).into()
        };
        UdpSocket::bind(local).await.map_err(TrackerError::UdpSocket)
    }

    fn cached_connection(&self, addr: SocketAddr) -> Option<u64> {
        let connections = self.connections.lock().expect("connection cache poisoned");
        connections
            .get(&addr)
            .filter(|entry| entry.expires > Instant::now())
            .map(|entry| entry.id)
    }

    fn store_connection(&self, addr: SocketAddr, id: u64) {
        let mut connections = self.connections.lock().expect("connection cache poisoned");
        connections.insert(
            addr,
            CachedConnection {
                id,
                expires: Instant::now() + self.connection_ttl,
            },
        );
    }

    fn invalidate_connection(&self, addr: SocketAddr) {
        let mut connections = self.connections.lock().expect("connection cache poisoned");
        connections.remove(&addr);
    }

    /// Returns a valid connection id for `addr`, running the connect exchange
    /// when the cache is empty or expired.
    async fn connection_id(
        &self,
        socket: &UdpSocket,
        addr: SocketAddr,
    ) -> Result<u64, TrackerError> {
        if let Some(id) = self.cached_connection(addr) {
            return Ok(id);
        }

        let mut backoff = self.backoff_start;
        let mut buf = vec![0u8; 2048];
        for attempt in 0..self.max_attempts {
            let transaction_id: u32 = rand::thread_rng().gen();
            let mut packet = Vec::with_capacity(16);
            packet.put_u64(PROTOCOL_MAGIC);
            packet.put_u32(ACTION_CONNECT);
            packet.put_u32(transaction_id);

            socket
                .send_to(&packet, addr)
                .await
                .map_err(TrackerError::UdpSend)?;

            if let Ok(received) =
                tokio::time::timeout(self.receive_timeout, socket.recv_from(&mut buf)).await
            {
                let (len, _) = received.map_err(TrackerError::UdpRecv)?;
                let reply = &buf[..len];
                if len >= 8 {
                    let mut cursor = reply;
                    let action = cursor.get_u32();
                    let reply_transaction = cursor.get_u32();
                    if action == ACTION_ERROR {
                        self.invalidate_connection(addr);
                        return Err(TrackerError::UdpProtocol {
                            message: error_text(reply),
                        });
                    }
                    if len >= CONNECT_RESPONSE_LEN
                        && action == ACTION_CONNECT
                        && reply_transaction == transaction_id
                    {
                        let id = cursor.get_u64();
                        self.store_connection(addr, id);
                        return Ok(id);
                    }
                }
                // Short or mismatched reply: no reply yet.
            }

            tracing::debug!(%addr, attempt, "udp connect timed out, backing off");
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }

        Err(TrackerError::UdpExhausted {
            operation: "connect",
            attempts: self.max_attempts,
        })
    }

    fn build_announce_packet(
        connection_id: u64,
        transaction_id: u32,
        request: &AnnounceRequest,
    ) -> Vec<u8> {
        let mut packet = Vec::with_capacity(98);
        packet.put_u64(connection_id);
        packet.put_u32(ACTION_ANNOUNCE);
        packet.put_u32(transaction_id);
        packet.put_slice(request.info_hash.as_bytes());
        packet.put_slice(request.peer_id.as_bytes());
        packet.put_u64(request.downloaded);
        packet.put_u64(request.left);
        packet.put_u64(request.uploaded);
        packet.put_u32(request.event.wire_code());
        packet.put_u32(0); // ip = 0: tracker uses the sender address
        packet.put_u32(request.key);
        packet.put_u32(if request.numwant == 0 {
            NUMWANT_DEFAULT
        } else {
            request.numwant
        });
        packet.put_u16(request.port);
        packet
    }

    fn parse_announce_reply(reply: &[u8]) -> AnnounceResponse {
        let mut cursor = &reply[8..];
        let interval = cursor.get_u32();
        let leechers = cursor.get_u32();
        let seeders = cursor.get_u32();

        // Tolerate trailing bytes that do not form a whole peer record.
        let peer_bytes = &reply[ANNOUNCE_RESPONSE_MIN_LEN..];
        let usable = peer_bytes.len() - peer_bytes.len() % compact::IPV4_RECORD_LEN;
        let peers = compact::decode_ipv4(&peer_bytes[..usable]);

        AnnounceResponse {
            interval,
            min_interval: None,
            complete: seeders,
            incomplete: leechers,
            peers,
            warning: None,
            tracker_id: None,
        }
    }

    async fn announce_exchange(
        &self,
        socket: &UdpSocket,
        addr: SocketAddr,
        request: &AnnounceRequest,
    ) -> Result<AnnounceResponse, TrackerError> {
        let mut backoff = self.backoff_start;
        let mut buf = vec![0u8; 65536];

        for attempt in 0..self.max_attempts {
            let connection_id = self.connection_id(socket, addr).await?;
            let transaction_id: u32 = rand::thread_rng().gen();
            let packet = Self::build_announce_packet(connection_id, transaction_id, request);

            socket
                .send_to(&packet, addr)
                .await
                .map_err(TrackerError::UdpSend)?;

            if let Ok(received) =
                tokio::time::timeout(self.receive_timeout, socket.recv_from(&mut buf)).await
            {
                let (len, _) = received.map_err(TrackerError::UdpRecv)?;
                let reply = &buf[..len];
                if len >= 8 {
                    let mut cursor = reply;
                    let action = cursor.get_u32();
                    let reply_transaction = cursor.get_u32();
                    if action == ACTION_ERROR {
                        self.invalidate_connection(addr);
                        return Err(TrackerError::UdpProtocol {
                            message: error_text(reply),
                        });
                    }
                    if len >= ANNOUNCE_RESPONSE_MIN_LEN
                        && action == ACTION_ANNOUNCE
                        && reply_transaction == transaction_id
                    {
                        return Ok(Self::parse_announce_reply(reply));
                    }
                }
                // Short or mismatched reply: force a reconnect next attempt.
                self.invalidate_connection(addr);
            } else {
                self.invalidate_connection(addr);
            }

            tracing::debug!(%addr, attempt, "udp announce unanswered, backing off");
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }

        Err(TrackerError::UdpExhausted {
            operation: "announce",
            attempts: self.max_attempts,
        })
    }

    async fn scrape_exchange(
        &self,
        socket: &UdpSocket,
        addr: SocketAddr,
        info_hashes: &[InfoHash],
    ) -> Result<ScrapeMap, TrackerError> {
        let mut backoff = self.backoff_start;
        let mut buf = vec![0u8; 8192];

        for attempt in 0..self.max_attempts {
            let connection_id = self.connection_id(socket, addr).await?;
            let transaction_id: u32 = rand::thread_rng().gen();

            let mut packet = Vec::with_capacity(16 + 20 * info_hashes.len());
            packet.put_u64(connection_id);
            packet.put_u32(ACTION_SCRAPE);
            packet.put_u32(transaction_id);
            for hash in info_hashes {
                packet.put_slice(hash.as_bytes());
            }

            socket
                .send_to(&packet, addr)
                .await
                .map_err(TrackerError::UdpSend)?;

            if let Ok(received) =
                tokio::time::timeout(self.receive_timeout, socket.recv_from(&mut buf)).await
            {
                let (len, _) = received.map_err(TrackerError::UdpRecv)?;
                let reply = &buf[..len];
                if len >= 8 {
                    let mut cursor = reply;
                    let action = cursor.get_u32();
                    let reply_transaction = cursor.get_u32();
                    if action == ACTION_ERROR {
                        self.invalidate_connection(addr);
                        return Err(TrackerError::UdpProtocol {
                            message: error_text(reply),
                        });
                    }
                    if action == ACTION_SCRAPE && reply_transaction == transaction_id {
                        let needed = 8 + SCRAPE_STATS_LEN * info_hashes.len();
                        if len < needed {
                            self.invalidate_connection(addr);
                            return Err(TrackerError::UdpShortResponse);
                        }
                        let mut stats = ScrapeMap::new();
                        for hash in info_hashes {
                            stats.insert(
                                *hash,
                                ScrapeStats {
                                    complete: cursor.get_u32(),
                                    downloaded: cursor.get_u32(),
                                    incomplete: cursor.get_u32(),
                                    name: None,
                                },
                            );
                        }
                        return Ok(stats);
                    }
                }
                self.invalidate_connection(addr);
            } else {
                self.invalidate_connection(addr);
            }

            tracing::debug!(%addr, attempt, "udp scrape unanswered, backing off");
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }

        Err(TrackerError::UdpExhausted {
            operation: "scrape",
            attempts: self.max_attempts,
        })
    }
}

#[async_trait]
impl TrackerClient for UdpTrackerClient {
    async fn announce(
        &self,
        request: &AnnounceRequest,
        announce_url: &str,
    ) -> Result<AnnounceResponse, TrackerError> {
        let (host, port) = Self::parse_url(announce_url)?;
        let addr = Self::resolve(&host, port).await?;
        let socket = Self::bind_socket(addr).await?;
        tracing::debug!(url = %redacted(announce_url), %addr, event = %request.event, "sending udp announce");
        self.announce_exchange(&socket, addr, request).await
    }

    async fn scrape(
        &self,
        info_hashes: &[InfoHash],
        scrape_url: &str,
    ) -> Result<ScrapeMap, TrackerError> {
        if info_hashes.is_empty() {
            return Ok(ScrapeMap::new());
        }
        let (host, port) = Self::parse_url(scrape_url)?;
        let addr = Self::resolve(&host, port).await?;
        let socket = Self::bind_socket(addr).await?;
        tracing::debug!(url = %redacted(scrape_url), %addr, hashes = info_hashes.len(), "sending udp scrape");
        self.scrape_exchange(&socket, addr, info_hashes).await
    }
}

/// Error replies carry UTF-8 text from byte 8 to the end.
fn error_text(reply: &[u8]) -> String {
    String::from_utf8_lossy(&reply[8.min(reply.len())..]).into_owned()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::PeerId;

    #[test]
    fn test_parse_url_forms() {
        assert_eq!(
            UdpTrackerClient::parse_url("udp://tracker.example:1337/announce").unwrap(),
            ("tracker.example".to_string(), 1337)
        );
        assert_eq!(
            UdpTrackerClient::parse_url("udp://tracker.example").unwrap(),
            ("tracker.example".to_string(), DEFAULT_UDP_PORT)
        );
        assert_eq!(
            UdpTrackerClient::parse_url("udp://tracker.example/announce").unwrap(),
            ("tracker.example".to_string(), DEFAULT_UDP_PORT)
        );
    }

    #[test]
    fn test_parse_url_rejects_other_schemes() {
        assert!(matches!(
            UdpTrackerClient::parse_url("http://tracker.example:80/announce"),
            Err(TrackerError::UdpUrl { .. })
        ));
    }

    #[test]
    fn test_parse_url_rejects_bracketed_ipv6() {
        assert!(matches!(
            UdpTrackerClient::parse_url("udp://[::1]:6969/announce"),
            Err(TrackerError::UnsupportedUrlForm { .. })
        ));
    }

    #[test]
    fn test_parse_url_rejects_bad_ports() {
        assert!(matches!(
            UdpTrackerClient::parse_url("udp://host:notaport"),
            Err(TrackerError::UdpUrl { .. })
        ));
        assert!(matches!(
            UdpTrackerClient::parse_url("udp://host:0"),
            Err(TrackerError::UdpUrl { .. })
        ));
        assert!(matches!(
            UdpTrackerClient::parse_url("udp://host:70000"),
            Err(TrackerError::UdpUrl { .. })
        ));
    }

    #[test]
    fn test_announce_packet_layout() {
        let mut hash = [0u8; 20];
        let mut id = [0u8; 20];
        for i in 0..20u8 {
            hash[i as usize] = i;
            id[i as usize] = 0xA5 ^ i;
        }
        let request = AnnounceRequest {
            info_hash: InfoHash::new(hash),
            peer_id: PeerId::new(id),
            port: 51413,
            uploaded: 1,
            downloaded: 2,
            left: 3,
            event: super::super::AnnounceEvent::Started,
            numwant: 0,
            key: 0xDEAD_BEEF,
            ..AnnounceRequest::default()
        };

        let packet = UdpTrackerClient::build_announce_packet(0x0102_0304_0506_0708, 0x11223344, &request);
        assert_eq!(packet.len(), 98);
        assert_eq!(&packet[0..8], &0x0102_0304_0506_0708u64.to_be_bytes());
        assert_eq!(&packet[8..12], &ACTION_ANNOUNCE.to_be_bytes());
        assert_eq!(&packet[12..16], &0x11223344u32.to_be_bytes());
        assert_eq!(&packet[16..36], &hash);
        assert_eq!(&packet[36..56], &id);
        assert_eq!(&packet[56..64], &2u64.to_be_bytes()); // downloaded
        assert_eq!(&packet[64..72], &3u64.to_be_bytes()); // left
        assert_eq!(&packet[72..80], &1u64.to_be_bytes()); // uploaded
        assert_eq!(&packet[80..84], &2u32.to_be_bytes()); // started = 2 per BEP 15
        assert_eq!(&packet[84..88], &0u32.to_be_bytes()); // ip
        assert_eq!(&packet[88..92], &0xDEAD_BEEFu32.to_be_bytes());
        assert_eq!(&packet[92..96], &NUMWANT_DEFAULT.to_be_bytes()); // numwant 0 -> default
        assert_eq!(&packet[96..98], &51413u16.to_be_bytes());
    }

    /// Scriptable loopback tracker speaking just enough BEP 15 for the tests.
    struct FakeUdpTracker {
        port: u16,
        connects: Arc<AtomicU32>,
        announces: Arc<AtomicU32>,
        scrapes: Arc<AtomicU32>,
    }

    #[derive(Clone)]
    struct FakeBehavior {
        peers: Vec<(Ipv4Addr, u16)>,
        truncate_first_announce: bool,
        error_on_announce: Option<String>,
        error_on_scrape: Option<String>,
        scrape_triplet: (u32, u32, u32),
    }

    impl Default for FakeBehavior {
        fn default() -> Self {
            Self {
                peers: Vec::new(),
                truncate_first_announce: false,
                error_on_announce: None,
                error_on_scrape: None,
                scrape_triplet: (12, 34, 56),
            }
        }
    }

    impl FakeUdpTracker {
        async fn start(behavior: FakeBehavior) -> Self {
            let socket = Arc::new(
                UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
                    .await
                    .expect("bind fake tracker"),
            );
            let port = socket.local_addr().unwrap().port();
            let connects = Arc::new(AtomicU32::new(0));
            let announces = Arc::new(AtomicU32::new(0));
            let scrapes = Arc::new(AtomicU32::new(0));

            let server = Self {
                port,
                connects: Arc::clone(&connects),
                announces: Arc::clone(&announces),
                scrapes: Arc::clone(&scrapes),
            };

            tokio::spawn(async move {
                let mut behavior = behavior;
                let mut buf = vec![0u8; 65536];
                let connection_id = 0x0123_4567_89AB_CDEFu64;
                loop {
                    let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                        return;
                    };
                    if len < 16 {
                        continue;
                    }
                    let mut cursor = &buf[8..len];
                    let action = cursor.get_u32();
                    let transaction_id = cursor.get_u32();

                    let mut reply = Vec::new();
                    match action {
                        ACTION_CONNECT => {
                            connects.fetch_add(1, Ordering::SeqCst);
                            reply.put_u32(ACTION_CONNECT);
                            reply.put_u32(transaction_id);
                            reply.put_u64(connection_id);
                        }
                        ACTION_ANNOUNCE => {
                            announces.fetch_add(1, Ordering::SeqCst);
                            if let Some(message) = &behavior.error_on_announce {
                                reply.put_u32(ACTION_ERROR);
                                reply.put_u32(transaction_id);
                                reply.put_slice(message.as_bytes());
                            } else if behavior.truncate_first_announce {
                                behavior.truncate_first_announce = false;
                                reply.put_u32(ACTION_ANNOUNCE);
                                reply.put_u32(transaction_id);
                                // 12 bytes only: deliberately short
                            } else {
                                reply.put_u32(ACTION_ANNOUNCE);
                                reply.put_u32(transaction_id);
                                reply.put_u32(900); // interval
                                reply.put_u32(5); // leechers
                                reply.put_u32(3); // seeders
                                for (ip, port) in &behavior.peers {
                                    reply.put_slice(&ip.octets());
                                    reply.put_u16(*port);
                                }
                            }
                        }
                        ACTION_SCRAPE => {
                            scrapes.fetch_add(1, Ordering::SeqCst);
                            if let Some(message) = &behavior.error_on_scrape {
                                reply.put_u32(ACTION_ERROR);
                                reply.put_u32(transaction_id);
                                reply.put_slice(message.as_bytes());
                            } else {
                                reply.put_u32(ACTION_SCRAPE);
                                reply.put_u32(transaction_id);
                                let hashes = (len - 16) / 20;
                                let (seeders, completed, leechers) = behavior.scrape_triplet;
                                for _ in 0..hashes {
                                    reply.put_u32(seeders);
                                    reply.put_u32(completed);
                                    reply.put_u32(leechers);
                                }
                            }
                        }
                        _ => {
                            reply.put_u32(ACTION_ERROR);
                            reply.put_u32(transaction_id);
                            reply.put_slice(b"unsupported action");
                        }
                    }
                    let _ = socket.send_to(&reply, peer).await;
                }
            });

            server
        }

        fn url(&self) -> String {
            format!("udp://127.0.0.1:{}/announce", self.port)
        }
    }

    fn fast_client() -> UdpTrackerClient {
        let config = NetworkConfig {
            udp_timeout: Duration::from_millis(200),
            udp_backoff_start: Duration::from_millis(100),
            udp_max_attempts: 4,
            ..NetworkConfig::default()
        };
        UdpTrackerClient::new(&config)
    }

    fn request() -> AnnounceRequest {
        AnnounceRequest {
            info_hash: InfoHash::new([0x01; 20]),
            peer_id: PeerId::new([0xB4; 20]),
            port: 51413,
            left: 42,
            event: super::super::AnnounceEvent::Started,
            numwant: 10,
            key: 0xDEAD_BEEF,
            ..AnnounceRequest::default()
        }
    }

    #[tokio::test]
    async fn test_announce_happy_path() {
        let server = FakeUdpTracker::start(FakeBehavior {
            peers: vec![
                (Ipv4Addr::new(127, 1, 2, 3), 6881),
                (Ipv4Addr::new(10, 0, 0, 2), 80),
            ],
            ..FakeBehavior::default()
        })
        .await;

        let client = fast_client();
        let response = client.announce(&request(), &server.url()).await.unwrap();

        assert_eq!(response.interval, 900);
        assert_eq!(response.incomplete, 5);
        assert_eq!(response.complete, 3);
        assert_eq!(response.peers.len(), 2);
        assert_eq!(response.peers[0].to_string(), "127.1.2.3:6881");
        assert_eq!(response.peers[1].to_string(), "10.0.0.2:80");

        // The tracker must observe a connect before the announce.
        assert!(server.connects.load(Ordering::SeqCst) >= 1);
        assert!(server.announces.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_announce_retries_after_truncated_reply() {
        let server = FakeUdpTracker::start(FakeBehavior {
            peers: vec![(Ipv4Addr::new(127, 0, 0, 9), 6881)],
            truncate_first_announce: true,
            ..FakeBehavior::default()
        })
        .await;

        let client = fast_client();
        let started = Instant::now();
        let response = client.announce(&request(), &server.url()).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(response.peers.len(), 1);
        assert_eq!(response.peers[0].to_string(), "127.0.0.9:6881");
        // The truncated reply costs at least one backoff delay.
        assert!(elapsed >= Duration::from_millis(100), "elapsed {elapsed:?}");
        assert!(server.announces.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_announce_surfaces_tracker_error() {
        let server = FakeUdpTracker::start(FakeBehavior {
            error_on_announce: Some("nope nope nope".to_string()),
            ..FakeBehavior::default()
        })
        .await;

        let client = fast_client();
        let result = client.announce(&request(), &server.url()).await;
        assert!(matches!(
            result,
            Err(TrackerError::UdpProtocol { message }) if message.contains("nope nope nope")
        ));
    }

    #[tokio::test]
    async fn test_scrape_returns_stats_per_hash() {
        let server = FakeUdpTracker::start(FakeBehavior {
            scrape_triplet: (77, 55, 99),
            ..FakeBehavior::default()
        })
        .await;

        let client = fast_client();
        let hashes = [InfoHash::new([0x10; 20]), InfoHash::new([0x20; 20])];
        let stats = client.scrape(&hashes, &server.url()).await.unwrap();

        assert_eq!(stats.len(), 2);
        for hash in &hashes {
            let entry = stats.get(hash).unwrap();
            assert_eq!(entry.complete, 77);
            assert_eq!(entry.downloaded, 55);
            assert_eq!(entry.incomplete, 99);
            assert_eq!(entry.name, None);
        }
        assert!(server.connects.load(Ordering::SeqCst) >= 1);
        assert!(server.scrapes.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_scrape_error_surfaces_text() {
        let server = FakeUdpTracker::start(FakeBehavior {
            error_on_scrape: Some("scrape broken, sorry".to_string()),
            ..FakeBehavior::default()
        })
        .await;

        let client = fast_client();
        let result = client.scrape(&[InfoHash::new([0x33; 20])], &server.url()).await;
        assert!(matches!(
            result,
            Err(TrackerError::UdpProtocol { message }) if message.contains("scrape broken")
        ));
    }

    #[tokio::test]
    async fn test_empty_scrape_is_local() {
        let server = FakeUdpTracker::start(FakeBehavior::default()).await;

        let client = fast_client();
        let stats = client.scrape(&[], &server.url()).await.unwrap();
        assert!(stats.is_empty());
        assert_eq!(server.scrapes.load(Ordering::SeqCst), 0);
        assert_eq!(server.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_announce_rejects_wrong_scheme_quickly() {
        let client = fast_client();
        let result = client
            .announce(&request(), "http://127.0.0.1:6969/announce")
            .await;
        assert!(matches!(result, Err(TrackerError::UdpUrl { .. })));
    }

    #[tokio::test]
    async fn test_connection_id_is_cached_across_operations() {
        let server = FakeUdpTracker::start(FakeBehavior::default()).await;

        let client = fast_client();
        let hash = [InfoHash::new([0x44; 20])];
        client.scrape(&hash, &server.url()).await.unwrap();
        client.scrape(&hash, &server.url()).await.unwrap();

        // Second scrape reuses the cached connection id.
        assert_eq!(server.connects.load(Ordering::SeqCst), 1);
        assert_eq!(server.scrapes.load(Ordering::SeqCst), 2);
    }
}
