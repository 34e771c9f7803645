//! Centralized configuration for Ebbtide.
//!
//! All tunable parameters are defined here to avoid hard-coded values
//! scattered throughout the codebase.

use std::time::Duration;

/// Central configuration for all Ebbtide components.
///
/// Groups related settings into logical sections. Supports environment
/// variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct EbbtideConfig {
    /// Transport-level settings for HTTP and UDP tracker exchanges
    pub network: NetworkConfig,
    /// Announce scheduling policy shared by all tracker endpoints
    pub announce: AnnounceScheduleConfig,
}

/// Network communication configuration for tracker clients.
///
/// Controls HTTP timeouts and redirect policy, and the UDP retry schedule
/// mandated by BEP 15.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// HTTP TCP connect timeout
    pub connect_timeout: Duration,
    /// HTTP whole-operation timeout
    pub transfer_timeout: Duration,
    /// Whether HTTP 3xx redirects are followed
    pub follow_redirects: bool,
    /// User agent for HTTP requests
    pub user_agent: &'static str,
    /// Per-attempt UDP receive timeout
    pub udp_timeout: Duration,
    /// UDP attempts per logical operation (connect, announce, scrape)
    pub udp_max_attempts: u32,
    /// Initial UDP retry backoff, doubled on every attempt
    pub udp_backoff_start: Duration,
    /// Lifetime of a cached UDP connection id
    pub udp_connection_ttl: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(8),
            transfer_timeout: Duration::from_secs(10),
            follow_redirects: true,
            user_agent: "ebbtide/0.1.0",
            udp_timeout: Duration::from_millis(1500),
            udp_max_attempts: 8,
            udp_backoff_start: Duration::from_millis(1500),
            udp_connection_ttl: Duration::from_secs(60),
        }
    }
}

/// Announce scheduling policy applied per tracker endpoint.
///
/// Tracker-supplied intervals are clamped into `[min_interval_floor,
/// interval_ceiling]` before jitter; endpoints are disabled after
/// `disable_threshold` consecutive failures is exceeded.
#[derive(Debug, Clone)]
pub struct AnnounceScheduleConfig {
    /// Floor for the announce interval
    pub min_interval_floor: Duration,
    /// Ceiling for the announce interval and failure backoff
    pub interval_ceiling: Duration,
    /// Consecutive failures beyond which an endpoint is disabled
    pub disable_threshold: u32,
}

impl Default for AnnounceScheduleConfig {
    fn default() -> Self {
        Self {
            min_interval_floor: Duration::from_secs(30),
            interval_ceiling: Duration::from_secs(3600),
            disable_threshold: 7,
        }
    }
}

impl AnnounceScheduleConfig {
    /// Clamps a tracker-supplied or computed interval into the configured window.
    pub(crate) fn clamp_interval(&self, seconds: u64) -> Duration {
        let secs = seconds.clamp(
            self.min_interval_floor.as_secs(),
            self.interval_ceiling.as_secs(),
        );
        Duration::from_secs(secs)
    }
}

impl EbbtideConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime tuning via `EBBTIDE_*` variables while keeping
    /// sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(timeout) = std::env::var("EBBTIDE_CONNECT_TIMEOUT_SEC") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.network.connect_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(timeout) = std::env::var("EBBTIDE_TRANSFER_TIMEOUT_SEC") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.network.transfer_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(timeout) = std::env::var("EBBTIDE_UDP_TIMEOUT_MS") {
            if let Ok(millis) = timeout.parse::<u64>() {
                config.network.udp_timeout = Duration::from_millis(millis);
                config.network.udp_backoff_start = Duration::from_millis(millis);
            }
        }

        if let Ok(attempts) = std::env::var("EBBTIDE_UDP_MAX_ATTEMPTS") {
            if let Ok(count) = attempts.parse::<u32>() {
                config.network.udp_max_attempts = count;
            }
        }

        if let Ok(redirects) = std::env::var("EBBTIDE_FOLLOW_REDIRECTS") {
            config.network.follow_redirects = redirects.parse().unwrap_or(true);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = EbbtideConfig::default();

        assert_eq!(config.network.connect_timeout, Duration::from_secs(8));
        assert_eq!(config.network.transfer_timeout, Duration::from_secs(10));
        assert!(config.network.follow_redirects);
        assert_eq!(config.network.udp_timeout, Duration::from_millis(1500));
        assert_eq!(config.network.udp_max_attempts, 8);
        assert_eq!(config.network.udp_connection_ttl, Duration::from_secs(60));
        assert_eq!(config.announce.min_interval_floor, Duration::from_secs(30));
        assert_eq!(config.announce.interval_ceiling, Duration::from_secs(3600));
        assert_eq!(config.announce.disable_threshold, 7);
    }

    #[test]
    fn test_clamp_interval_window() {
        let schedule = AnnounceScheduleConfig::default();

        assert_eq!(schedule.clamp_interval(10), Duration::from_secs(30));
        assert_eq!(schedule.clamp_interval(60), Duration::from_secs(60));
        assert_eq!(schedule.clamp_interval(90_000), Duration::from_secs(3600));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("EBBTIDE_CONNECT_TIMEOUT_SEC", "3");
        std::env::set_var("EBBTIDE_UDP_MAX_ATTEMPTS", "2");

        let config = EbbtideConfig::from_env();

        assert_eq!(config.network.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.network.udp_max_attempts, 2);

        std::env::remove_var("EBBTIDE_CONNECT_TIMEOUT_SEC");
        std::env::remove_var("EBBTIDE_UDP_MAX_ATTEMPTS");
    }
}
