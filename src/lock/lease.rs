//! Lease store contract backing the distributed lock manager.
//!
//! Leases live in a store shared by every worker; the store owns the clock
//! (`now()`), so TTL comparisons never depend on local wall-clock agreement
//! between workers.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Errors from the lease store backend.
#[derive(Debug, Error, Diagnostic)]
pub enum LeaseError {
    #[error("lease store backend error: {message}")]
    #[diagnostic(code(flowmesh::lock::lease_backend))]
    Backend { message: String },
}

impl LeaseError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Current state of one lease row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaseStatus {
    pub key: String,
    pub holder: String,
    pub expires_at: DateTime<Utc>,
}

impl LeaseStatus {
    /// Expired relative to the store clock passed in.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Shared lease rows with their own clock.
///
/// Conditional semantics live here, next to the clock: `update` applies the
/// take-over rule (holder matches, or the existing lease is expired per the
/// store's `now()`), `update_expired_at` extends only a lease still held by
/// the renewing worker, `delete_expired` removes only an expired row.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Create the lease row if absent. `false` when a row already exists.
    async fn create(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, LeaseError>;

    /// Take or refresh the lease: succeeds iff the current holder is
    /// `holder` or the existing lease has expired.
    async fn update(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, LeaseError>;

    /// Extend the expiry of a lease still held by `holder`. `false` when the
    /// lease disappeared or was taken over — the renewal must stop.
    async fn update_expired_at(
        &self,
        key: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, LeaseError>;

    async fn is_exists(&self, key: &str) -> Result<bool, LeaseError>;

    /// Unconditional removal; idempotent.
    async fn delete(&self, key: &str) -> Result<(), LeaseError>;

    /// Remove the row only if it has expired; idempotent.
    async fn delete_expired(&self, key: &str) -> Result<(), LeaseError>;

    async fn get_status(&self, key: &str) -> Result<Option<LeaseStatus>, LeaseError>;

    /// The store's clock. All TTL math uses this, never local time.
    async fn now(&self) -> Result<DateTime<Utc>, LeaseError>;
}

#[derive(Clone, Debug)]
struct LeaseRow {
    holder: String,
    expires_at: DateTime<Utc>,
}

/// In-memory lease store for tests and single-process deployments.
///
/// The clock is a real `Utc::now()` plus a controllable offset so tests can
/// expire leases without sleeping.
pub struct InMemoryLeaseStore {
    rows: Mutex<FxHashMap<String, LeaseRow>>,
    clock_offset: Mutex<Duration>,
}

impl Default for InMemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLeaseStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(FxHashMap::default()),
            clock_offset: Mutex::new(Duration::zero()),
        }
    }

    /// Advance the store clock (test control).
    pub fn advance_clock(&self, by: Duration) {
        let mut offset = self.clock_offset.lock();
        *offset = *offset + by;
    }

    /// Forcibly reassign a lease to another holder (test control for
    /// simulating a take-over by a different worker).
    pub fn usurp(&self, key: &str, new_holder: &str, ttl: Duration) {
        let now = self.current_time();
        self.rows.lock().insert(
            key.to_string(),
            LeaseRow {
                holder: new_holder.to_string(),
                expires_at: now + ttl,
            },
        );
    }

    fn current_time(&self) -> DateTime<Utc> {
        Utc::now() + *self.clock_offset.lock()
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn create(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, LeaseError> {
        let now = self.current_time();
        let mut rows = self.rows.lock();
        if rows.contains_key(key) {
            return Ok(false);
        }
        rows.insert(
            key.to_string(),
            LeaseRow {
                holder: holder.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn update(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, LeaseError> {
        let now = self.current_time();
        let mut rows = self.rows.lock();
        match rows.get_mut(key) {
            Some(row) if row.holder == holder || row.expires_at <= now => {
                row.holder = holder.to_string();
                row.expires_at = now + ttl;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn update_expired_at(
        &self,
        key: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, LeaseError> {
        let now = self.current_time();
        let mut rows = self.rows.lock();
        match rows.get_mut(key) {
            Some(row) if row.holder == holder => {
                row.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn is_exists(&self, key: &str) -> Result<bool, LeaseError> {
        Ok(self.rows.lock().contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), LeaseError> {
        self.rows.lock().remove(key);
        Ok(())
    }

    async fn delete_expired(&self, key: &str) -> Result<(), LeaseError> {
        let now = self.current_time();
        let mut rows = self.rows.lock();
        if let Some(row) = rows.get(key) {
            if row.expires_at <= now {
                rows.remove(key);
            }
        }
        Ok(())
    }

    async fn get_status(&self, key: &str) -> Result<Option<LeaseStatus>, LeaseError> {
        Ok(self.rows.lock().get(key).map(|row| LeaseStatus {
            key: key.to_string(),
            holder: row.holder.clone(),
            expires_at: row.expires_at,
        }))
    }

    async fn now(&self) -> Result<DateTime<Utc>, LeaseError> {
        Ok(self.current_time())
    }
}
