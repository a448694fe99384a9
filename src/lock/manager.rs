//! Process-local lock manager: stable lock identities over an LRU cache.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::lease::LeaseStore;
use super::lock::DistributedLock;
use super::lru::LruCache;
use crate::config::LockConfig;
use crate::events::EventEmitter;

/// Hands out [`DistributedLock`]s keyed by string and keeps them in a
/// bounded, access-ordered cache.
///
/// `get_lock(key)` returns the *same* `Arc` for a key until the entry is
/// evicted, so callers can rely on lock identity for the cache's lifetime.
/// The cache bound (default 100,000 entries) is a pure local capacity
/// control; it has nothing to do with lease TTL expiry in the shared store.
pub struct LockManager {
    store: Arc<dyn LeaseStore>,
    config: LockConfig,
    worker_id: String,
    emitter: EventEmitter,
    cache: Mutex<LruCache<String, Arc<DistributedLock>>>,
}

impl LockManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn LeaseStore>,
        config: LockConfig,
        worker_id: impl Into<String>,
        emitter: EventEmitter,
    ) -> Self {
        let capacity = config.cache_capacity;
        Self {
            store,
            config,
            worker_id: worker_id.into(),
            emitter,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The worker identity recorded as lease holder.
    #[must_use]
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Get (or create) the lock for `key`.
    ///
    /// Identity is stable: two calls with the same key return the same lock
    /// instance until the entry is evicted by capacity pressure or an
    /// expiry sweep.
    #[must_use]
    pub fn get_lock(&self, key: &str) -> Arc<DistributedLock> {
        let mut cache = self.cache.lock();
        if let Some(lock) = cache.get(&key.to_string()) {
            lock.touch();
            return Arc::clone(lock);
        }

        let lock = Arc::new(DistributedLock::new(
            key,
            self.worker_id.clone(),
            self.config.ttl,
            self.config.renew_schedule_rate,
            Arc::clone(&self.store),
            self.emitter.clone(),
        ));
        if let Some((evicted_key, evicted)) = cache.insert(key.to_string(), Arc::clone(&lock)) {
            // A held lock stays alive through its holder's Arc; eviction
            // only forgets the local identity.
            tracing::debug!(
                key = %evicted_key,
                held = evicted.is_held(),
                "lock cache evicted least-recently-used entry"
            );
        }
        lock
    }

    /// Number of locally cached lock objects.
    #[must_use]
    pub fn cached_locks(&self) -> usize {
        self.cache.lock().len()
    }

    /// Sweep the local cache: drop entries idle longer than `timeout` that
    /// are not currently held, best-effort deleting expired backing rows.
    /// Idempotent if the backing row is already gone.
    pub async fn delete_expired_locks(&self, timeout: Duration) {
        let stale: Vec<String> = {
            let cache = self.cache.lock();
            cache
                .iter()
                .filter(|(_, lock)| !lock.is_held() && lock.idle_for() >= timeout)
                .map(|(key, _)| key.clone())
                .collect()
        };

        for key in stale {
            {
                let mut cache = self.cache.lock();
                // Re-check under the current lock state; the entry may have
                // been re-acquired between the scan and now.
                let still_stale = cache
                    .peek(&key)
                    .is_some_and(|l| !l.is_held() && l.idle_for() >= timeout);
                if !still_stale {
                    continue;
                }
                cache.remove(&key);
            }
            if let Err(e) = self.store.delete_expired(&key).await {
                tracing::warn!(key = %key, error = %e, "expired lease delete failed");
            }
        }
    }
}
