//! Retry subsystem: durable, version-guarded records of failed work.
//!
//! Every failed jober dispatch parks its context here as a [`FlowRetry`]
//! row. Rows are only ever updated through compare-and-swap on their
//! `version` field, so two workers sweeping the same record cannot both
//! re-dispatch it: the loser's update touches zero rows and it must re-read
//! before deciding anything. A zero-row CAS outcome is a designed signal,
//! not an error.

mod policy;
mod service;
mod store;

pub use policy::RetryPolicy;
pub use service::{RetryOutcome, RetryService};
pub use store::{InMemoryRetryStore, RetryStore};

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Entity kind a retry record refers to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryEntityType {
    /// A flow context whose jober dispatch failed.
    Context,
    /// Anything else an embedder parks here.
    Other(String),
}

/// One durable retry record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRetry {
    pub entity_id: String,
    pub entity_type: RetryEntityType,
    pub next_retry_time: DateTime<Utc>,
    pub last_retry_time: Option<DateTime<Utc>>,
    pub retry_count: u32,
    /// Optimistic concurrency token; bumped by exactly 1 per CAS update.
    pub version: u64,
}

impl FlowRetry {
    /// Fresh record for a first dispatch failure.
    #[must_use]
    pub fn new(
        entity_id: impl Into<String>,
        entity_type: RetryEntityType,
        next_retry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_type,
            next_retry_time,
            last_retry_time: None,
            retry_count: 0,
            version: 0,
        }
    }

    /// The record this one becomes after another failed attempt at `now`,
    /// rescheduled to `next_retry_time`. The version is left at the
    /// *expected* value; the store bumps it on a successful CAS.
    #[must_use]
    pub fn next_attempt(&self, now: DateTime<Utc>, next_retry_time: DateTime<Utc>) -> Self {
        Self {
            entity_id: self.entity_id.clone(),
            entity_type: self.entity_type.clone(),
            next_retry_time,
            last_retry_time: Some(now),
            retry_count: self.retry_count + 1,
            version: self.version,
        }
    }
}

/// Errors from the retry store backend.
#[derive(Debug, Error, Diagnostic)]
pub enum RetryError {
    #[error("retry store backend error: {message}")]
    #[diagnostic(code(flowmesh::retry::backend))]
    Backend { message: String },
}

impl RetryError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}
