//! Per-endpoint announce scheduling and tier rotation (BEP 12).

use std::time::{Duration, Instant};

use rand::Rng;

use super::TrackerError;
use crate::config::AnnounceScheduleConfig;

/// Transport scheme of an announce URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain HTTP
    Http,
    /// HTTP over TLS
    Https,
    /// BEP 15 UDP
    Udp,
}

impl Scheme {
    /// Derives the scheme from a URL prefix; unknown prefixes fall back to
    /// HTTP and fail later in the HTTP client's URL validation.
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("udp://") {
            Scheme::Udp
        } else if url.starts_with("https://") {
            Scheme::Https
        } else {
            Scheme::Http
        }
    }
}

/// Scheduler state for one announce URL.
#[derive(Debug, Clone)]
pub struct TrackerEndpoint {
    /// Full announce URL
    pub url: String,
    /// Scheme the manager dispatches on
    pub scheme: Scheme,
    /// When the last successful announce completed
    pub last_announce: Option<Instant>,
    /// Earliest instant a new announce may be issued; `None` = never scheduled
    pub next_allowed: Option<Instant>,
    /// Consecutive failures since the last success
    pub failure_count: u32,
    /// Set once the failure count exceeds the disable threshold
    pub disabled: bool,
    /// Opaque id the tracker asked us to echo on subsequent announces
    pub tracker_id: Option<String>,
}

impl TrackerEndpoint {
    /// Creates endpoint state for an announce URL.
    pub fn new(url: String) -> Self {
        let scheme = Scheme::from_url(&url);
        Self {
            url,
            scheme,
            last_announce: None,
            next_allowed: None,
            failure_count: 0,
            disabled: false,
            tracker_id: None,
        }
    }

    /// Records a successful announce and schedules the next one.
    ///
    /// The base delay is `min_interval.unwrap_or(interval)` clamped into the
    /// configured window, with +-20% uniform jitter, and never less than one
    /// second in the future. Resets the failure count.
    pub fn record_success(
        &mut self,
        interval: u32,
        min_interval: Option<u32>,
        config: &AnnounceScheduleConfig,
    ) {
        let now = Instant::now();
        self.last_announce = Some(now);

        let base = config.clamp_interval(u64::from(min_interval.unwrap_or(interval)));
        let jitter_bound = (base.as_secs() / 5) as i64;
        let jitter = if jitter_bound > 0 {
            rand::thread_rng().gen_range(-jitter_bound..=jitter_bound)
        } else {
            0
        };
        let delay_secs = (base.as_secs() as i64 + jitter).max(1);

        self.next_allowed = Some(now + Duration::from_secs(delay_secs as u64));
        self.failure_count = 0;
    }

    /// Records a failed announce: exponential backoff `5 * 2^min(n, 10)`
    /// seconds clamped into the configured window, disabling the endpoint
    /// once the failure count exceeds the threshold.
    pub fn record_failure(&mut self, config: &AnnounceScheduleConfig) {
        self.failure_count += 1;
        let backoff_secs = 5u64 << self.failure_count.min(10);
        self.next_allowed = Some(Instant::now() + config.clamp_interval(backoff_secs));
        if self.failure_count > config.disable_threshold {
            self.disabled = true;
        }
    }

    /// Whether an announce may be issued at `now`.
    pub fn can_announce_now(&self, now: Instant) -> bool {
        if self.disabled {
            return false;
        }
        match self.next_allowed {
            None => true, // never scheduled
            Some(next_allowed) => now >= next_allowed,
        }
    }
}

/// An ordered preference group of tracker endpoints.
///
/// Non-empty by construction, so `current()` always has an endpoint to
/// return.
#[derive(Debug, Clone)]
pub struct TrackerTier {
    endpoints: Vec<TrackerEndpoint>,
    current_index: usize,
}

impl TrackerTier {
    /// Creates a tier over the given endpoints.
    ///
    /// # Errors
    ///
    /// - `TrackerError::EmptyTier` - `endpoints` is empty
    pub fn new(endpoints: Vec<TrackerEndpoint>) -> Result<Self, TrackerError> {
        if endpoints.is_empty() {
            return Err(TrackerError::EmptyTier);
        }
        Ok(Self {
            endpoints,
            current_index: 0,
        })
    }

    /// Creates a tier from announce URLs.
    ///
    /// # Errors
    ///
    /// - `TrackerError::EmptyTier` - `urls` is empty
    pub fn from_urls(urls: Vec<String>) -> Result<Self, TrackerError> {
        Self::new(urls.into_iter().map(TrackerEndpoint::new).collect())
    }

    /// The endpoint at the rotation cursor.
    pub fn current(&self) -> &TrackerEndpoint {
        &self.endpoints[self.current_index]
    }

    /// Mutable access to the endpoint at the rotation cursor.
    pub fn current_mut(&mut self) -> &mut TrackerEndpoint {
        &mut self.endpoints[self.current_index]
    }

    /// The rotation cursor position.
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Advances the rotation cursor, wrapping at the end.
    pub fn rotate(&mut self) {
        self.current_index = (self.current_index + 1) % self.endpoints.len();
    }

    /// Whether any endpoint may announce at `now`.
    pub fn any_available(&self, now: Instant) -> bool {
        self.endpoints
            .iter()
            .any(|endpoint| endpoint.can_announce_now(now))
    }

    /// All endpoints in tier order.
    pub fn endpoints(&self) -> &[TrackerEndpoint] {
        &self.endpoints
    }

    /// Number of endpoints in the tier; never zero.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always false; tiers are non-empty by construction.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
