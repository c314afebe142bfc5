//! Shared holder of the current key set.
//!
//! Readers load an `Arc<KeySet>` snapshot without blocking; the refresher
//! replaces the whole snapshot in one atomic store. A reader that loaded a
//! set before a swap keeps using it until it drops the `Arc`.

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::keys::KeySet;

/// Lock-free, swap-on-refresh cache of the provider's signing keys
///
/// Cloning is cheap; all clones observe the same snapshot.
#[derive(Debug, Clone)]
pub struct KeyCache {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    current: ArcSwap<KeySet>,
    /// Generation of the last install, 0 before the first one
    generation: watch::Sender<u64>,
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyCache {
    /// Create a cache holding the uninitialized sentinel
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                current: ArcSwap::from_pointee(KeySet::uninitialized()),
                generation,
            }),
        }
    }

    /// The key set at the moment of the call
    pub fn current(&self) -> Arc<KeySet> {
        self.inner.current.load_full()
    }

    /// Atomically replace the current set and return its generation
    ///
    /// Concurrent installs are serialized; generations are strictly increasing.
    pub fn install(&self, set: KeySet) -> u64 {
        let mut installed = 0;
        let key_count = set.len();
        self.inner.generation.send_modify(|generation| {
            *generation += 1;
            installed = *generation;
            self.inner
                .current
                .store(Arc::new(set.with_generation(installed)));
        });
        debug!(generation = installed, key_count, "Installed key set");
        installed
    }

    /// Generation of the current set
    pub fn generation(&self) -> u64 {
        *self.inner.generation.borrow()
    }

    /// True once any set has been installed
    pub fn is_initialized(&self) -> bool {
        self.generation() > 0
    }

    /// Wait until the first install, for at most `timeout`
    ///
    /// Returns whether the cache is initialized.
    ///
    /// # Example
    ///
    /// ```rust
    /// use keystone_auth::{KeyCache, KeySet};
    /// use std::time::Duration;
    ///
    /// # tokio_test::block_on(async {
    /// let cache = KeyCache::new();
    /// assert!(!cache.wait_initialized(Duration::from_millis(10)).await);
    ///
    /// cache.install(KeySet::empty());
    /// assert!(cache.wait_initialized(Duration::ZERO).await);
    /// # });
    /// ```
    pub async fn wait_initialized(&self, timeout: Duration) -> bool {
        let mut installs = self.inner.generation.subscribe();
        matches!(
            tokio::time::timeout(timeout, installs.wait_for(|generation| *generation > 0)).await,
            Ok(Ok(_))
        )
    }
}
