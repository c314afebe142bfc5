//! Background key refresh.
//!
//! The loop fetches once immediately, then on a fixed interval, and installs
//! each successful result into the [`KeyCache`]. A failed fetch leaves the
//! previous set in place; the next tick is the retry. The loop is the only
//! writer of the cache it owns.
//!
//! Cancellation is observed while waiting for the next tick and, under the
//! default [`CancelPolicy::AbandonInFlight`], while a fetch is in progress.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth_metrics;
use crate::cache::KeyCache;
use crate::config::AuthConfig;
use crate::error::FetchError;
use crate::fetcher::KeyFetcher;
use crate::keys::KeySet;

/// Default time between refreshes
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// What to do when a fetch succeeds but yields no usable keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyKeySetPolicy {
    /// Keep a non-empty current set and log a warning. An uninitialized or
    /// already-empty cache still receives the empty set.
    #[default]
    PreserveExisting,
    /// Install the empty set; every token fails with `KeyNotFound` until keys return
    Replace,
}

/// What happens to a fetch that is running when cancellation arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelPolicy {
    /// Drop the fetch; nothing from it is installed
    #[default]
    AbandonInFlight,
    /// Let the fetch complete and install its result, then stop
    FinishInFlight,
}

/// Result of a single refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A set was installed
    Installed {
        /// Generation assigned by the cache
        generation: u64,
        /// Keys in the installed set
        key_count: usize,
    },
    /// The fetch returned no usable keys and the current set was kept
    PreservedOnEmpty,
    /// The fetch failed; the current set was kept
    Failed,
}

/// Counters describing the loop's history
#[derive(Debug, Default)]
pub struct RefreshStats {
    attempts: AtomicU64,
    installs: AtomicU64,
    failures: AtomicU64,
    empty_fetches: AtomicU64,
    last_install_unix: AtomicU64,
}

impl RefreshStats {
    /// Fetches started
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Sets installed, including empty ones
    pub fn installs(&self) -> u64 {
        self.installs.load(Ordering::Relaxed)
    }

    /// Fetches that failed
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Fetches that returned no usable keys
    pub fn empty_fetches(&self) -> u64 {
        self.empty_fetches.load(Ordering::Relaxed)
    }

    /// Unix time of the last install
    pub fn last_install(&self) -> Option<u64> {
        match self.last_install_unix.load(Ordering::Relaxed) {
            0 => None,
            secs => Some(secs),
        }
    }
}

/// Periodically fetches the provider's keys into a [`KeyCache`]
pub struct RefreshLoop {
    fetcher: Arc<dyn KeyFetcher>,
    cache: KeyCache,
    interval: Duration,
    empty_policy: EmptyKeySetPolicy,
    cancel_policy: CancelPolicy,
    stats: Arc<RefreshStats>,
}

impl std::fmt::Debug for RefreshLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshLoop")
            .field("endpoint", &self.fetcher.endpoint())
            .field("interval", &self.interval)
            .field("empty_policy", &self.empty_policy)
            .field("cancel_policy", &self.cancel_policy)
            .finish_non_exhaustive()
    }
}

impl RefreshLoop {
    /// Create a loop with the default interval and policies
    pub fn new(fetcher: Arc<dyn KeyFetcher>, cache: KeyCache) -> Self {
        Self {
            fetcher,
            cache,
            interval: DEFAULT_REFRESH_INTERVAL,
            empty_policy: EmptyKeySetPolicy::default(),
            cancel_policy: CancelPolicy::default(),
            stats: Arc::new(RefreshStats::default()),
        }
    }

    /// Create a loop using the interval and empty-set policy from `config`
    pub fn from_config(fetcher: Arc<dyn KeyFetcher>, cache: KeyCache, config: &AuthConfig) -> Self {
        Self::new(fetcher, cache)
            .with_interval(config.refresh_interval)
            .with_empty_key_set_policy(config.empty_key_set_policy)
    }

    /// Set the refresh interval (at least one second)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_REFRESH_INTERVAL);
        self
    }

    /// Set the empty-document policy
    pub fn with_empty_key_set_policy(mut self, policy: EmptyKeySetPolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    /// Set the cancellation policy
    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.cancel_policy = policy;
        self
    }

    /// Shared handle to the loop's counters
    pub fn stats(&self) -> Arc<RefreshStats> {
        Arc::clone(&self.stats)
    }

    /// Fetch once and install the result according to policy
    pub async fn refresh_once(&self) -> RefreshOutcome {
        self.stats.attempts.fetch_add(1, Ordering::Relaxed);

        match self.fetcher.fetch().await {
            Ok(set) => self.install(set),
            Err(FetchError::NoUsableKeys { candidates }) => {
                self.stats.empty_fetches.fetch_add(1, Ordering::Relaxed);
                auth_metrics::record_fetch("no_usable_keys");
                self.handle_empty(candidates)
            }
            Err(err) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                auth_metrics::record_fetch(err.kind());
                let current = self.cache.current();
                error!(
                    jwks_uri = %self.fetcher.endpoint(),
                    error = %err,
                    kind = err.kind(),
                    current_generation = current.generation(),
                    current_keys = current.len(),
                    "JWKS refresh failed, keeping current key set"
                );
                RefreshOutcome::Failed
            }
        }
    }

    fn handle_empty(&self, candidates: usize) -> RefreshOutcome {
        let current = self.cache.current();
        match self.empty_policy {
            EmptyKeySetPolicy::PreserveExisting if !current.is_empty() => {
                warn!(
                    jwks_uri = %self.fetcher.endpoint(),
                    candidates,
                    current_generation = current.generation(),
                    current_keys = current.len(),
                    "JWKS document has no usable signing keys, keeping current key set"
                );
                RefreshOutcome::PreservedOnEmpty
            }
            _ => {
                warn!(
                    jwks_uri = %self.fetcher.endpoint(),
                    candidates,
                    "JWKS document has no usable signing keys, installing empty key set"
                );
                self.install(KeySet::empty())
            }
        }
    }

    fn install(&self, set: KeySet) -> RefreshOutcome {
        let key_count = set.len();
        let generation = self.cache.install(set);

        self.stats.installs.fetch_add(1, Ordering::Relaxed);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.stats.last_install_unix.store(now, Ordering::Relaxed);
        if key_count > 0 {
            auth_metrics::record_fetch("success");
        }
        auth_metrics::record_key_set_size(key_count);

        info!(generation, key_count, "Key set refreshed");
        RefreshOutcome::Installed {
            generation,
            key_count,
        }
    }

    /// Run until `cancel` fires
    ///
    /// The first fetch starts immediately. Missed ticks are delayed rather
    /// than bursted, so a slow fetch never triggers back-to-back requests.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            jwks_uri = %self.fetcher.endpoint(),
            interval_secs = self.interval.as_secs(),
            cancel_policy = ?self.cancel_policy,
            "Starting JWKS refresh loop"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.cancel_policy {
                CancelPolicy::FinishInFlight => {
                    self.refresh_once().await;
                }
                CancelPolicy::AbandonInFlight => {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            debug!("Abandoning in-flight JWKS fetch");
                            break;
                        }
                        _ = self.refresh_once() => {}
                    }
                }
            }
        }

        info!(
            attempts = self.stats.attempts(),
            installs = self.stats.installs(),
            failures = self.stats.failures(),
            "JWKS refresh loop stopped"
        );
    }

    /// Spawn [`RefreshLoop::run`] on the current runtime
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
