//! Tracker manager: owns the tier topology and drives scheduled announces on
//! a background worker.
//!
//! One worker task serializes every announce; the public surface (`start`,
//! `stop`, `announce`, `on_stats`, `drain_new_peers`, `set_peers_callback`)
//! may be called from any task. Manual announces serialize through the same
//! tier lock the worker holds, so endpoint state is never driven from two
//! places at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::endpoint::{Scheme, TrackerTier};
use super::http::{HttpFetch, HttpTrackerClient};
use super::types::{AnnounceEvent, AnnounceRequest, PeerAddr, TrackerClient};
use super::udp::UdpTrackerClient;
use crate::config::{AnnounceScheduleConfig, EbbtideConfig};
use crate::tracing_setup::redacted;
use crate::{InfoHash, PeerId};

/// Peers delivered to the callback in announce-arrival order.
pub type PeersCallback = dyn Fn(&[PeerAddr]) + Send + Sync;

/// Peers requested on scheduled (worker-driven) announces.
const WORKER_NUMWANT: u32 = 50;
/// Floor for worker sleeps, and the fallback when nothing is schedulable.
const MIN_SLEEP: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Clone, Copy)]
struct TransferStats {
    uploaded: u64,
    downloaded: u64,
    left: u64,
}

struct ManagerShared {
    info_hash: InfoHash,
    peer_id: PeerId,
    port: u16,
    key: u32,
    schedule: AnnounceScheduleConfig,
    tiers: tokio::sync::Mutex<Vec<TrackerTier>>,
    stats: Mutex<TransferStats>,
    pending_peers: Mutex<Vec<PeerAddr>>,
    peers_callback: Mutex<Option<Arc<PeersCallback>>>,
    running: AtomicBool,
    wake: Notify,
    http: HttpTrackerClient,
    udp: UdpTrackerClient,
}

/// Drives announce/scrape exchanges for one torrent session across ordered
/// tracker tiers.
///
/// Construct with the announce list from a [`crate::Metainfo`], call
/// [`TrackerManager::start`] to begin periodic announces, and consume peers
/// through [`TrackerManager::drain_new_peers`] or a callback.
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() {
/// use ebbtide::{EbbtideConfig, Metainfo, PeerId, TrackerManager};
///
/// let data = std::fs::read("example.torrent").unwrap();
/// let metainfo = Metainfo::from_torrent(data).unwrap();
///
/// let mut manager = TrackerManager::new(
///     metainfo.announce_list.clone(),
///     metainfo.info_hash(),
///     PeerId::generate(),
///     6881,
///     &EbbtideConfig::default(),
/// );
/// manager.start();
/// // ...
/// let peers = manager.drain_new_peers();
/// # let _ = peers;
/// manager.stop().await;
/// # }
/// ```
pub struct TrackerManager {
    shared: Arc<ManagerShared>,
    worker: Option<JoinHandle<()>>,
}

impl TrackerManager {
    /// Creates a manager over the given announce tiers with the real HTTP
    /// transport. Empty tiers are skipped.
    pub fn new(
        announce_list: Vec<Vec<String>>,
        info_hash: InfoHash,
        peer_id: PeerId,
        port: u16,
        config: &EbbtideConfig,
    ) -> Self {
        Self::build(
            announce_list,
            info_hash,
            peer_id,
            port,
            config,
            HttpTrackerClient::new(&config.network),
        )
    }

    /// Creates a manager whose HTTP exchanges go through a caller-supplied
    /// transport. Used by tests to script tracker behavior.
    pub fn with_fetch(
        announce_list: Vec<Vec<String>>,
        info_hash: InfoHash,
        peer_id: PeerId,
        port: u16,
        config: &EbbtideConfig,
        fetch: Arc<dyn HttpFetch>,
    ) -> Self {
        Self::build(
            announce_list,
            info_hash,
            peer_id,
            port,
            config,
            HttpTrackerClient::with_fetch(fetch),
        )
    }

    fn build(
        announce_list: Vec<Vec<String>>,
        info_hash: InfoHash,
        peer_id: PeerId,
        port: u16,
        config: &EbbtideConfig,
        http: HttpTrackerClient,
    ) -> Self {
        let tiers: Vec<TrackerTier> = announce_list
            .into_iter()
            .filter_map(|urls| TrackerTier::from_urls(urls).ok())
            .collect();

        Self {
            shared: Arc::new(ManagerShared {
                info_hash,
                peer_id,
                port,
                key: rand::thread_rng().gen(),
                schedule: config.announce.clone(),
                tiers: tokio::sync::Mutex::new(tiers),
                stats: Mutex::new(TransferStats::default()),
                pending_peers: Mutex::new(Vec::new()),
                peers_callback: Mutex::new(None),
                running: AtomicBool::new(false),
                wake: Notify::new(),
                http,
                udp: UdpTrackerClient::new(&config.network),
            }),
            worker: None,
        }
    }

    /// Launches the background worker. Re-entrant calls are no-ops.
    pub fn start(&mut self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        self.worker = Some(tokio::spawn(async move {
            worker_loop(shared).await;
        }));
    }

    /// Signals the worker and waits for it to finish. After `stop` returns,
    /// no further peer callbacks are delivered.
    pub async fn stop(&mut self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.wake.notify_one();
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }

    /// Updates the transfer statistics reported on subsequent announces.
    ///
    /// # Panics
    ///
    /// Panics if the stats mutex was poisoned by a panicking thread.
    pub fn on_stats(&self, uploaded: u64, downloaded: u64, left: u64) {
        let mut stats = self.shared.stats.lock().expect("stats lock poisoned");
        *stats = TransferStats {
            uploaded,
            downloaded,
            left,
        };
    }

    /// Performs one announce sweep against the first tier that has an
    /// available endpoint, on the caller's task. This is the vehicle for
    /// `started`/`stopped` events on session boundaries.
    pub async fn announce(&self, event: AnnounceEvent, numwant: u32) {
        let now = Instant::now();
        let mut tiers = self.shared.tiers.lock().await;
        for index in 0..tiers.len() {
            if tiers[index].any_available(now) {
                try_one_tier(&self.shared, &mut tiers[index], index, event, numwant).await;
                return;
            }
        }
    }

    /// Atomically takes the peers accumulated since the last drain, in
    /// announce-arrival order.
    ///
    /// # Panics
    ///
    /// Panics if the peer buffer mutex was poisoned by a panicking thread.
    pub fn drain_new_peers(&self) -> Vec<PeerAddr> {
        let mut pending = self
            .shared
            .pending_peers
            .lock()
            .expect("peers lock poisoned");
        std::mem::take(&mut *pending)
    }

    /// Replaces the peers callback. The callback runs on the worker with no
    /// manager locks held, so it may call [`TrackerManager::drain_new_peers`].
    ///
    /// # Panics
    ///
    /// Panics if the callback mutex was poisoned by a panicking thread.
    pub fn set_peers_callback(&self, callback: impl Fn(&[PeerAddr]) + Send + Sync + 'static) {
        let mut slot = self
            .shared
            .peers_callback
            .lock()
            .expect("callback lock poisoned");
        *slot = Some(Arc::new(callback));
    }
}

impl Drop for TrackerManager {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.wake.notify_one();
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

async fn worker_loop(shared: Arc<ManagerShared>) {
    tracing::debug!("tracker worker started");

    while shared.running.load(Ordering::SeqCst) {
        let now = Instant::now();
        {
            let mut tiers = shared.tiers.lock().await;
            for index in 0..tiers.len() {
                if !shared.running.load(Ordering::SeqCst) {
                    break;
                }
                if tiers[index].any_available(now) {
                    try_one_tier(
                        &shared,
                        &mut tiers[index],
                        index,
                        AnnounceEvent::None,
                        WORKER_NUMWANT,
                    )
                    .await;
                    break;
                }
            }
        }

        if !shared.running.load(Ordering::SeqCst) {
            break;
        }

        let sleep_for = {
            let tiers = shared.tiers.lock().await;
            next_wakeup(&tiers, Instant::now())
        };
        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = shared.wake.notified() => {}
        }
    }

    tracing::debug!("tracker worker stopped");
}

/// How long the worker may sleep before some endpoint becomes schedulable.
fn next_wakeup(tiers: &[TrackerTier], now: Instant) -> Duration {
    let mut earliest: Option<Instant> = None;
    for tier in tiers {
        for endpoint in tier.endpoints() {
            if endpoint.disabled {
                continue;
            }
            let due = match endpoint.next_allowed {
                None => now + Duration::from_secs(1), // never scheduled
                Some(at) => at,
            };
            earliest = Some(match earliest {
                None => due,
                Some(current) => current.min(due),
            });
        }
    }
    match earliest {
        None => MIN_SLEEP,
        Some(due) => due.saturating_duration_since(now).max(MIN_SLEEP),
    }
}

/// One announce sweep over a tier: starting at the rotation cursor, tries up
/// to every endpoint, rotating on failure, stopping on the first success.
async fn try_one_tier(
    shared: &ManagerShared,
    tier: &mut TrackerTier,
    tier_index: usize,
    event: AnnounceEvent,
    numwant: u32,
) -> bool {
    let now = Instant::now();
    let start_index = tier.current_index();

    for _ in 0..tier.len() {
        if !tier.current().can_announce_now(now) {
            tier.rotate();
            continue;
        }

        let request = {
            let stats = shared.stats.lock().expect("stats lock poisoned");
            AnnounceRequest {
                info_hash: shared.info_hash,
                peer_id: shared.peer_id,
                port: shared.port,
                uploaded: stats.uploaded,
                downloaded: stats.downloaded,
                left: stats.left,
                event,
                numwant,
                key: shared.key,
                compact: true,
                no_peer_id: true,
                ipv6: None,
                tracker_id: tier.current().tracker_id.clone(),
            }
        };
        let url = tier.current().url.clone();

        let result = match tier.current().scheme {
            Scheme::Udp => shared.udp.announce(&request, &url).await,
            Scheme::Http | Scheme::Https => shared.http.announce(&request, &url).await,
        };

        match result {
            Ok(response) => {
                let endpoint = tier.current_mut();
                endpoint.record_success(
                    response.interval,
                    response.min_interval,
                    &shared.schedule,
                );
                if let Some(tracker_id) = response.tracker_id {
                    endpoint.tracker_id = Some(tracker_id);
                }
                if let Some(warning) = &response.warning {
                    tracing::warn!(url = %redacted(&url), warning = %warning, "tracker warning");
                }
                tracing::info!(
                    url = %redacted(&url),
                    tier = tier_index,
                    event = %event,
                    interval = response.interval,
                    peers = response.peers.len(),
                    "announce succeeded"
                );
                if !response.peers.is_empty() {
                    deliver_peers(shared, response.peers);
                }
                return true;
            }
            Err(error) => {
                tracing::warn!(
                    url = %redacted(&url),
                    tier = tier_index,
                    failures = tier.current().failure_count + 1,
                    error = %error,
                    "announce failed"
                );
                tier.current_mut().record_failure(&shared.schedule);
                tier.rotate();
                if tier.current_index() == start_index {
                    break; // full loop
                }
            }
        }
    }

    false
}

/// Buffers peers for `drain_new_peers`, then invokes the callback with no
/// manager locks held. The callback observes the same sequence a subsequent
/// drain would.
fn deliver_peers(shared: &ManagerShared, peers: Vec<PeerAddr>) {
    {
        let mut pending = shared.pending_peers.lock().expect("peers lock poisoned");
        pending.extend(peers.iter().cloned());
    }
    let callback = shared
        .peers_callback
        .lock()
        .expect("callback lock poisoned")
        .clone();
    if let Some(callback) = callback {
        callback(&peers);
    }
}
