//! Retry store contract and the in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

use super::{FlowRetry, RetryError};

/// Durable storage for retry records.
///
/// `batch_update_retry_record` is the CAS primitive: an update applies only
/// where the stored version equals the caller's expected version, and the
/// returned count tells the caller how many rows it actually won.
#[async_trait]
pub trait RetryStore: Send + Sync {
    /// Insert new records. Existing entity ids are left untouched.
    async fn batch_create(&self, retries: Vec<FlowRetry>) -> Result<(), RetryError>;

    /// Version-guarded update (`WHERE version = expected`); bumps the stored
    /// version by exactly 1 per affected row. Returns the number of rows
    /// actually changed — 0 means a concurrent worker moved first.
    async fn batch_update_retry_record(&self, retries: Vec<FlowRetry>)
    -> Result<usize, RetryError>;

    /// Due records (`next_retry_time <= now`), excluding in-flight claims,
    /// ordered by entity id for deterministic batches.
    async fn filter_by_next_retry_time(
        &self,
        now: DateTime<Utc>,
        exclude_ids: &[String],
    ) -> Result<Vec<FlowRetry>, RetryError>;

    /// Unconditionally reschedule the given lineages.
    async fn batch_update_next_retry_time(
        &self,
        ids: &[String],
        time: DateTime<Utc>,
    ) -> Result<(), RetryError>;

    /// Terminate lineages (success or policy exhaustion).
    async fn batch_delete(&self, ids: &[String]) -> Result<(), RetryError>;

    /// Read one record.
    async fn find(&self, entity_id: &str) -> Result<Option<FlowRetry>, RetryError>;
}

/// In-memory retry store.
///
/// A `BTreeMap` keyed by entity id keeps sweep batches ordered without an
/// explicit sort.
#[derive(Default)]
pub struct InMemoryRetryStore {
    rows: Mutex<BTreeMap<String, FlowRetry>>,
}

impl InMemoryRetryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records; test convenience.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

#[async_trait]
impl RetryStore for InMemoryRetryStore {
    async fn batch_create(&self, retries: Vec<FlowRetry>) -> Result<(), RetryError> {
        let mut rows = self.rows.lock();
        for retry in retries {
            rows.entry(retry.entity_id.clone()).or_insert(retry);
        }
        Ok(())
    }

    async fn batch_update_retry_record(
        &self,
        retries: Vec<FlowRetry>,
    ) -> Result<usize, RetryError> {
        let mut rows = self.rows.lock();
        let mut changed = 0;
        for update in retries {
            if let Some(row) = rows.get_mut(&update.entity_id) {
                if row.version == update.version {
                    row.next_retry_time = update.next_retry_time;
                    row.last_retry_time = update.last_retry_time;
                    row.retry_count = update.retry_count;
                    row.version += 1;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn filter_by_next_retry_time(
        &self,
        now: DateTime<Utc>,
        exclude_ids: &[String],
    ) -> Result<Vec<FlowRetry>, RetryError> {
        let excluded: BTreeSet<&String> = exclude_ids.iter().collect();
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|r| r.next_retry_time <= now && !excluded.contains(&r.entity_id))
            .cloned()
            .collect())
    }

    async fn batch_update_next_retry_time(
        &self,
        ids: &[String],
        time: DateTime<Utc>,
    ) -> Result<(), RetryError> {
        let mut rows = self.rows.lock();
        for id in ids {
            if let Some(row) = rows.get_mut(id) {
                row.next_retry_time = time;
            }
        }
        Ok(())
    }

    async fn batch_delete(&self, ids: &[String]) -> Result<(), RetryError> {
        let mut rows = self.rows.lock();
        for id in ids {
            rows.remove(id);
        }
        Ok(())
    }

    async fn find(&self, entity_id: &str) -> Result<Option<FlowRetry>, RetryError> {
        Ok(self.rows.lock().get(entity_id).cloned())
    }
}
