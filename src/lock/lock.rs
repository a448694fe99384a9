//! A single leased lock with background renewal and invalidation.

use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::lease::LeaseStore;
use crate::events::{EngineEvent, EventEmitter};

/// Leased mutual exclusion on a string key, shared across workers.
///
/// The surface is deliberately narrow: [`try_acquire`](Self::try_acquire),
/// [`release`](Self::release), [`is_held`](Self::is_held), plus an
/// invalidation subscription. Contention and store failures surface as
/// `false`, never as errors.
///
/// While held, a background task renews the lease every
/// `renew_schedule_rate`. If renewal fails — the lease was taken over or
/// deleted externally — the lock flips to invalid and every subscriber of
/// [`subscribe_invalidation`](Self::subscribe_invalidation) is notified so
/// the owning execution can abandon its critical section. That notification
/// is the engine's only cancellation mechanism.
pub struct DistributedLock {
    key: String,
    holder: String,
    ttl: ChronoDuration,
    renew_schedule_rate: Duration,
    store: Arc<dyn LeaseStore>,
    emitter: EventEmitter,
    state: Mutex<LockState>,
    invalidated: watch::Sender<bool>,
    last_used_at: Mutex<Instant>,
}

struct LockState {
    held: bool,
    renew_task: Option<JoinHandle<()>>,
}

impl DistributedLock {
    pub(crate) fn new(
        key: impl Into<String>,
        holder: impl Into<String>,
        ttl: ChronoDuration,
        renew_schedule_rate: Duration,
        store: Arc<dyn LeaseStore>,
        emitter: EventEmitter,
    ) -> Self {
        let (invalidated, _) = watch::channel(false);
        Self {
            key: key.into(),
            holder: holder.into(),
            ttl,
            renew_schedule_rate,
            store,
            emitter,
            state: Mutex::new(LockState {
                held: false,
                renew_task: None,
            }),
            invalidated,
            last_used_at: Mutex::new(Instant::now()),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Attempt to take the lease.
    ///
    /// Creates the lease row if absent, otherwise updates it under the
    /// take-over rule (same holder, or expired per the store clock).
    /// Returns `false` on contention or store failure — never an error.
    /// Succeeding spawns the renewal task and resets the invalidation flag.
    pub async fn try_acquire(self: &Arc<Self>) -> bool {
        self.touch();
        if self.is_held() {
            return true;
        }

        let acquired = match self.store.is_exists(&self.key).await {
            Ok(false) => match self.store.create(&self.key, &self.holder, self.ttl).await {
                Ok(true) => true,
                // Lost the create race; fall back to the conditional update.
                Ok(false) => self.conditional_take().await,
                Err(e) => {
                    tracing::warn!(key = %self.key, error = %e, "lease create failed");
                    false
                }
            },
            Ok(true) => self.conditional_take().await,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "lease existence check failed");
                false
            }
        };

        if !acquired {
            return false;
        }

        let _ = self.invalidated.send(false);
        let mut state = self.state.lock();
        state.held = true;
        state.renew_task = Some(self.spawn_renewal());
        true
    }

    async fn conditional_take(&self) -> bool {
        match self.store.update(&self.key, &self.holder, self.ttl).await {
            Ok(took) => took,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "lease update failed");
                false
            }
        }
    }

    /// Whether this process currently believes it holds the lease.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.state.lock().held
    }

    /// Release the lease: stop renewal and best-effort delete the row.
    pub async fn release(&self) {
        let task = {
            let mut state = self.state.lock();
            if !state.held {
                return;
            }
            state.held = false;
            state.renew_task.take()
        };
        if let Some(task) = task {
            task.abort();
        }
        if let Err(e) = self.store.delete(&self.key).await {
            tracing::warn!(key = %self.key, error = %e, "lease delete on release failed");
        }
    }

    /// Subscribe to invalidation: the received value flips to `true` when a
    /// renewal fails and the holder must abandon its critical section.
    #[must_use]
    pub fn subscribe_invalidation(&self) -> watch::Receiver<bool> {
        self.invalidated.subscribe()
    }

    /// Whether the lock was invalidated by a failed renewal since the last
    /// successful acquire.
    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        *self.invalidated.borrow()
    }

    /// Mark the lock as recently used (cache recency bookkeeping).
    pub(crate) fn touch(&self) {
        *self.last_used_at.lock() = Instant::now();
    }

    /// How long since this lock object was last handed out or acquired.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_used_at.lock().elapsed()
    }

    fn spawn_renewal(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let rate = self.renew_schedule_rate;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(rate).await;
                let Some(lock) = weak.upgrade() else {
                    break;
                };
                if !lock.is_held() {
                    break;
                }
                let renewed = match lock
                    .store
                    .update_expired_at(&lock.key, &lock.holder, lock.ttl)
                    .await
                {
                    Ok(renewed) => renewed,
                    Err(e) => {
                        tracing::warn!(key = %lock.key, error = %e, "lease renewal errored");
                        false
                    }
                };
                if !renewed {
                    lock.invalidate();
                    break;
                }
            }
        })
    }

    fn invalidate(&self) {
        {
            let mut state = self.state.lock();
            state.held = false;
            state.renew_task = None;
        }
        let _ = self.invalidated.send(true);
        self.emitter.emit(EngineEvent::LockInvalidated {
            key: self.key.clone(),
        });
        tracing::warn!(key = %self.key, "lock lease lost; holder must abort its critical section");
    }
}

impl Drop for DistributedLock {
    fn drop(&mut self) {
        if let Some(task) = self.state.lock().renew_task.take() {
            task.abort();
        }
    }
}
