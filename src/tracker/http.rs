//! HTTP(S) tracker client: announce URL construction, bencoded response
//! parsing, and BEP 48 scrape support.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use super::types::{
    AnnounceRequest, AnnounceResponse, PeerAddr, ScrapeMap, ScrapeStats, TrackerClient,
};
use super::{compact, TrackerError};
use crate::bencode::{self, BencodeValue};
use crate::config::NetworkConfig;
use crate::tracing_setup::redacted;
use crate::InfoHash;

/// Escape everything except RFC 3986 unreserved characters, with uppercase
/// hex digits - the encoding trackers expect for `info_hash` and `peer_id`.
const TRACKER_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A byte-level HTTP GET capability.
///
/// The tracker client consumes this seam instead of a concrete HTTP stack so
/// tests can substitute a scripted transport; [`ReqwestFetch`] is the real
/// implementation.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Performs a GET and returns the status plus the full response body.
    ///
    /// # Errors
    ///
    /// - `TrackerError::HttpTransport` - DNS, connect, TLS, or timeout failure
    async fn get(&self, url: &str) -> Result<HttpResponse, TrackerError>;
}

/// Status and body of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw response body
    pub body: Vec<u8>,
}

/// [`HttpFetch`] implementation backed by `reqwest`.
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    /// Builds a client honoring the configured timeouts and redirect policy.
    ///
    /// # Panics
    ///
    /// Panics if the underlying TLS backend cannot be initialized.
    pub fn new(config: &NetworkConfig) -> Self {
        let redirect = if config.follow_redirects {
            reqwest::redirect::Policy::default()
        } else {
            reqwest::redirect::Policy::none()
        };
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.transfer_timeout)
            .redirect(redirect)
            .user_agent(config.user_agent)
            .build()
            .expect("HTTP client creation should not fail");
        Self { client }
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn get(&self, url: &str) -> Result<HttpResponse, TrackerError> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

/// HTTP tracker client.
///
/// Stateless across calls: the announce URL travels with each request, so one
/// client instance serves every HTTP endpoint the manager knows.
pub struct HttpTrackerClient {
    fetch: Arc<dyn HttpFetch>,
}

impl HttpTrackerClient {
    /// Creates a client with the real `reqwest` transport.
    pub fn new(config: &NetworkConfig) -> Self {
        Self::with_fetch(Arc::new(ReqwestFetch::new(config)))
    }

    /// Creates a client over a caller-supplied transport.
    pub fn with_fetch(fetch: Arc<dyn HttpFetch>) -> Self {
        Self { fetch }
    }

    /// Derives a scrape URL by replacing the final `/announce` path segment
    /// (BEP 48). Returns `None` when the announce URL does not follow the
    /// convention, in which case scrape is unsupported for that endpoint.
    pub fn derive_scrape_url(announce_url: &str) -> Option<String> {
        let start = announce_url.rfind("/announce")?;
        let rest = &announce_url[start + "/announce".len()..];
        if !rest.is_empty() && !rest.starts_with('?') {
            return None;
        }
        let mut scrape_url = String::with_capacity(announce_url.len());
        scrape_url.push_str(&announce_url[..start]);
        scrape_url.push_str("/scrape");
        scrape_url.push_str(rest);
        Some(scrape_url)
    }

    /// Builds the announce URL: base URL plus the query parameters of BEP 3,
    /// joined with `?` or `&` depending on whether the base already carries a
    /// query.
    pub(crate) fn build_announce_url(base: &str, request: &AnnounceRequest) -> String {
        let mut url = String::with_capacity(base.len() + 256);
        url.push_str(base);
        url.push(if base.contains('?') { '&' } else { '?' });

        let _ = write!(
            url,
            "info_hash={}",
            percent_encode_bytes(request.info_hash.as_bytes())
        );
        let _ = write!(
            url,
            "&peer_id={}",
            percent_encode_bytes(request.peer_id.as_bytes())
        );
        let _ = write!(url, "&port={}", request.port);
        let _ = write!(url, "&uploaded={}", request.uploaded);
        let _ = write!(url, "&downloaded={}", request.downloaded);
        let _ = write!(url, "&left={}", request.left);
        if let Some(event) = request.event.query_value() {
            let _ = write!(url, "&event={event}");
        }
        let _ = write!(url, "&compact={}", u8::from(request.compact));
        let _ = write!(url, "&numwant={}", request.numwant);
        let _ = write!(url, "&key={}", request.key);
        if request.no_peer_id {
            url.push_str("&no_peer_id=1");
        }
        if let Some(ipv6) = &request.ipv6 {
            let _ = write!(url, "&ipv6={}", percent_encode_bytes(ipv6.as_bytes()));
        }
        if let Some(tracker_id) = &request.tracker_id {
            let _ = write!(
                url,
                "&trackerid={}",
                percent_encode_bytes(tracker_id.as_bytes())
            );
        }

        url
    }

    fn parse_announce_response(body: &[u8]) -> Result<AnnounceResponse, TrackerError> {
        let root =
            bencode::decode(body).map_err(|error| TrackerError::MalformedAnnounce {
                reason: error.to_string(),
            })?;
        let dict = root.as_dict().ok_or_else(|| TrackerError::MalformedAnnounce {
            reason: "response is not a dictionary".to_string(),
        })?;

        if let Some(reason) = dict_string(dict, b"failure reason") {
            return Err(TrackerError::TrackerFailure { reason });
        }

        let mut response = AnnounceResponse {
            interval: 1800,
            ..AnnounceResponse::default()
        };
        if let Some(interval) = dict_u32(dict, b"interval") {
            response.interval = interval;
        }
        response.min_interval = dict_u32(dict, b"min interval");
        response.complete = dict_u32(dict, b"complete").unwrap_or(0);
        response.incomplete = dict_u32(dict, b"incomplete").unwrap_or(0);
        response.warning = dict_string(dict, b"warning message");
        response.tracker_id = dict_string(dict, b"tracker id");

        match dict.get(b"peers".as_slice()) {
            Some(BencodeValue::Bytes(raw)) => {
                response.peers = compact::decode_ipv4(raw);
            }
            Some(BencodeValue::List(entries)) => {
                for entry in entries {
                    let Some(peer_dict) = entry.as_dict() else {
                        continue;
                    };
                    let Some(ip) = dict_string(peer_dict, b"ip") else {
                        continue;
                    };
                    let Some(port) = peer_dict
                        .get(b"port".as_slice())
                        .and_then(BencodeValue::as_integer)
                        .and_then(|value| u16::try_from(value).ok())
                    else {
                        continue;
                    };
                    response.peers.push(PeerAddr::new(ip, port));
                }
            }
            _ => {}
        }

        if let Some(raw) = dict
            .get(b"peers6".as_slice())
            .and_then(BencodeValue::as_bytes)
        {
            response.peers.extend(compact::decode_ipv6(raw));
        }

        Ok(response)
    }

    fn parse_scrape_response(body: &[u8]) -> Result<ScrapeMap, TrackerError> {
        let root = bencode::decode(body).map_err(|error| TrackerError::MalformedScrape {
            reason: error.to_string(),
        })?;
        let dict = root.as_dict().ok_or_else(|| TrackerError::MalformedScrape {
            reason: "response is not a dictionary".to_string(),
        })?;

        if let Some(reason) = dict_string(dict, b"failure reason") {
            return Err(TrackerError::TrackerFailure { reason });
        }

        let files = dict
            .get(b"files".as_slice())
            .and_then(BencodeValue::as_dict)
            .ok_or_else(|| TrackerError::MalformedScrape {
                reason: "missing files dictionary".to_string(),
            })?;

        let mut stats = ScrapeMap::new();
        for (key, value) in files {
            if key.len() != 20 {
                continue;
            }
            let Some(entry) = value.as_dict() else {
                continue;
            };
            let mut hash = [0u8; 20];
            hash.copy_from_slice(key);
            stats.insert(
                InfoHash::new(hash),
                ScrapeStats {
                    complete: dict_u32(entry, b"complete").unwrap_or(0),
                    downloaded: dict_u32(entry, b"downloaded").unwrap_or(0),
                    incomplete: dict_u32(entry, b"incomplete").unwrap_or(0),
                    name: dict_string(entry, b"name"),
                },
            );
        }

        Ok(stats)
    }
}

#[async_trait]
impl TrackerClient for HttpTrackerClient {
    async fn announce(
        &self,
        request: &AnnounceRequest,
        announce_url: &str,
    ) -> Result<AnnounceResponse, TrackerError> {
        Url::parse(announce_url)?;
        let url = Self::build_announce_url(announce_url, request);
        tracing::debug!(url = %redacted(&url), event = %request.event, "sending HTTP announce");

        let response = self.fetch.get(&url).await?;
        if response.status >= 400 {
            return Err(TrackerError::HttpStatus {
                code: response.status,
            });
        }
        Self::parse_announce_response(&response.body)
    }

    async fn scrape(
        &self,
        info_hashes: &[InfoHash],
        scrape_url: &str,
    ) -> Result<ScrapeMap, TrackerError> {
        Url::parse(scrape_url)?;
        let mut url = String::from(scrape_url);
        let mut separator = if url.contains('?') { '&' } else { '?' };
        for hash in info_hashes {
            url.push(separator);
            url.push_str("info_hash=");
            url.push_str(&percent_encode_bytes(hash.as_bytes()));
            separator = '&';
        }
        tracing::debug!(url = %redacted(&url), hashes = info_hashes.len(), "sending HTTP scrape");

        let response = self.fetch.get(&url).await?;
        if response.status >= 400 {
            return Err(TrackerError::HttpStatus {
                code: response.status,
            });
        }
        Self::parse_scrape_response(&response.body)
    }
}

fn percent_encode_bytes(bytes: &[u8]) -> String {
    percent_encode(bytes, TRACKER_ESCAPE).to_string()
}

fn dict_u32(dict: &BTreeMap<Vec<u8>, BencodeValue>, key: &[u8]) -> Option<u32> {
    dict.get(key)
        .and_then(BencodeValue::as_integer)
        .map(|value| value as u32)
}

fn dict_string(dict: &BTreeMap<Vec<u8>, BencodeValue>, key: &[u8]) -> Option<String> {
    dict.get(key)
        .and_then(BencodeValue::as_bytes)
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
}
