//! Structured events emitted by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One observable engine transition.
///
/// Events are broadcast to sinks for logging and monitoring; nothing in the
/// engine's control flow depends on them being consumed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum EngineEvent {
    /// A batch of contexts arrived at a node.
    NodeEntered {
        stream_id: String,
        node_id: String,
        batch_size: usize,
    },
    /// A node finished processing a batch.
    NodeCompleted {
        stream_id: String,
        node_id: String,
        forwarded: usize,
    },
    /// A jober RPC dispatch failed; the context went to the retry queue.
    DispatchFailed {
        stream_id: String,
        node_id: String,
        context_id: String,
        reason: String,
    },
    /// A callback notification was raised (fire-and-forget leg).
    CallbackRaised {
        stream_id: String,
        node_id: String,
        context_id: String,
    },
    /// A context reached an End node and was terminated.
    ContextTerminated {
        stream_id: String,
        context_id: String,
    },
    /// A held lock's lease renewal failed; its holder must abort.
    LockInvalidated { key: String },
    /// A retry record was created or rescheduled.
    RetryScheduled {
        entity_id: String,
        retry_count: u32,
        next_retry_time: DateTime<Utc>,
    },
    /// A retry lineage ran out of attempts and was abandoned.
    RetryExhausted { entity_id: String, retry_count: u32 },
    /// Free-form diagnostic, scoped.
    Diagnostic { scope: String, message: String },
}

impl EngineEvent {
    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Diagnostic {
            scope: scope.into(),
            message: message.into(),
        }
    }

    /// Short label used by sinks and filters.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NodeEntered { .. } => "node_entered",
            Self::NodeCompleted { .. } => "node_completed",
            Self::DispatchFailed { .. } => "dispatch_failed",
            Self::CallbackRaised { .. } => "callback_raised",
            Self::ContextTerminated { .. } => "context_terminated",
            Self::LockInvalidated { .. } => "lock_invalidated",
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::Diagnostic { .. } => "diagnostic",
        }
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeEntered {
                stream_id,
                node_id,
                batch_size,
            } => write!(f, "[{stream_id}] enter {node_id} ({batch_size} ctx)"),
            Self::NodeCompleted {
                stream_id,
                node_id,
                forwarded,
            } => write!(f, "[{stream_id}] done {node_id} (-> {forwarded} ctx)"),
            Self::DispatchFailed {
                stream_id,
                node_id,
                context_id,
                reason,
            } => write!(
                f,
                "[{stream_id}] dispatch failed at {node_id} for {context_id}: {reason}"
            ),
            Self::CallbackRaised {
                stream_id,
                node_id,
                context_id,
            } => write!(f, "[{stream_id}] callback at {node_id} for {context_id}"),
            Self::ContextTerminated {
                stream_id,
                context_id,
            } => write!(f, "[{stream_id}] terminated {context_id}"),
            Self::LockInvalidated { key } => write!(f, "lock invalidated: {key}"),
            Self::RetryScheduled {
                entity_id,
                retry_count,
                next_retry_time,
            } => write!(
                f,
                "retry #{retry_count} for {entity_id} at {next_retry_time}"
            ),
            Self::RetryExhausted {
                entity_id,
                retry_count,
            } => write!(f, "retry exhausted for {entity_id} after {retry_count}"),
            Self::Diagnostic { scope, message } => write!(f, "[{scope}] {message}"),
        }
    }
}
