//! Retry bookkeeping on top of the store: policy application and events.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::policy::RetryPolicy;
use super::store::RetryStore;
use super::{FlowRetry, RetryEntityType, RetryError};
use crate::events::{EngineEvent, EventEmitter};

/// What happened to a lineage when a failure was registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryOutcome {
    /// A (re)attempt was scheduled.
    Scheduled(FlowRetry),
    /// Another worker updated the record first; re-read and re-decide.
    Conflict,
    /// The lineage ran out of attempts and was deleted.
    Exhausted,
}

/// Applies the [`RetryPolicy`] to the durable records in a [`RetryStore`].
///
/// The service never throws on CAS conflicts: a concurrent update is a
/// designed [`RetryOutcome::Conflict`] the caller reacts to by re-reading.
pub struct RetryService {
    store: Arc<dyn RetryStore>,
    policy: RetryPolicy,
    emitter: EventEmitter,
}

impl RetryService {
    #[must_use]
    pub fn new(store: Arc<dyn RetryStore>, policy: RetryPolicy, emitter: EventEmitter) -> Self {
        Self {
            store,
            policy,
            emitter,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Register a dispatch failure for `entity_id` at `now`.
    ///
    /// First failure creates a fresh record; later failures advance the
    /// lineage with a CAS update. Exhausted lineages are deleted.
    pub async fn register_failure(
        &self,
        entity_id: &str,
        entity_type: RetryEntityType,
        now: DateTime<Utc>,
    ) -> Result<RetryOutcome, RetryError> {
        let Some(existing) = self.store.find(entity_id).await? else {
            let retry = FlowRetry::new(
                entity_id,
                entity_type,
                self.policy.next_retry_time(now, 0),
            );
            self.store.batch_create(vec![retry.clone()]).await?;
            self.emit_scheduled(&retry);
            return Ok(RetryOutcome::Scheduled(retry));
        };

        let attempted = existing.retry_count + 1;
        if self.policy.is_exhausted(attempted) {
            self.store
                .batch_delete(std::slice::from_ref(&existing.entity_id))
                .await?;
            self.emitter.emit(EngineEvent::RetryExhausted {
                entity_id: existing.entity_id.clone(),
                retry_count: attempted,
            });
            return Ok(RetryOutcome::Exhausted);
        }

        let next = existing.next_attempt(now, self.policy.next_retry_time(now, attempted));
        let changed = self
            .store
            .batch_update_retry_record(vec![next.clone()])
            .await?;
        if changed == 0 {
            return Ok(RetryOutcome::Conflict);
        }
        self.emit_scheduled(&next);
        Ok(RetryOutcome::Scheduled(next))
    }

    /// Due lineages at `now`, minus ids already claimed by an in-flight
    /// sweep. Ordered by entity id.
    pub async fn due(
        &self,
        now: DateTime<Utc>,
        exclude_ids: &[String],
    ) -> Result<Vec<FlowRetry>, RetryError> {
        self.store.filter_by_next_retry_time(now, exclude_ids).await
    }

    /// Push lineages to a later attempt time without touching versions.
    pub async fn defer(&self, ids: &[String], time: DateTime<Utc>) -> Result<(), RetryError> {
        self.store.batch_update_next_retry_time(ids, time).await
    }

    /// Terminate lineages after a successful re-dispatch.
    pub async fn complete(&self, ids: &[String]) -> Result<(), RetryError> {
        self.store.batch_delete(ids).await
    }

    fn emit_scheduled(&self, retry: &FlowRetry) {
        self.emitter.emit(EngineEvent::RetryScheduled {
            entity_id: retry.entity_id.clone(),
            retry_count: retry.retry_count,
            next_retry_time: retry.next_retry_time,
        });
    }
}
