//! Flow contexts: one execution instance's position and data in a flow.
//!
//! A [`FlowContext`] is created when a flow instance starts, mutated only by
//! the worker holding its distributed lock, persisted after every
//! transition, and terminated on reaching an End node or exhausting its
//! retries. Fork nodes produce independent branch copies correlated by
//! `batch_id`.
//!
//! # Examples
//!
//! ```rust
//! use flowmesh::context::FlowContext;
//! use serde_json::json;
//!
//! let mut ctx = FlowContext::new("demo01-1.0.0", "start");
//! ctx.put_business_data("amount", json!(42));
//! assert_eq!(ctx.business_data.get("amount"), Some(&json!(42)));
//! assert_eq!(ctx.root_id, ctx.id);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::FlowData;
use crate::utils::collections::new_data_map;
use crate::utils::id_generator::IdGenerator;

/// Lifecycle of a context within the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextStatus {
    /// Created but not yet advanced past the start node.
    #[default]
    Created,
    /// Being advanced through the graph.
    Running,
    /// Parked in the retry subsystem awaiting its next attempt.
    Retryable,
    /// Reached an End node or was abandoned after retry exhaustion.
    Terminated,
}

/// One running instance's position and data within a flow definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowContext {
    pub id: String,
    pub stream_id: String,
    /// Id of the originating context; equals `id` unless this is a fork
    /// branch copy.
    pub root_id: String,
    /// Current node id.
    pub position: String,
    pub status: ContextStatus,
    pub business_data: FlowData,
    pub pass_data: FlowData,
    pub trace_ids: BTreeSet<String>,
    /// Fan-in correlation id; set on fork branch copies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

impl FlowContext {
    /// Create a fresh root context positioned at `position`.
    pub fn new(stream_id: impl Into<String>, position: impl Into<String>) -> Self {
        let ids = IdGenerator::new();
        let id = ids.generate_context_id();
        let mut trace_ids = BTreeSet::new();
        trace_ids.insert(ids.generate_trace_id());
        Self {
            id: id.clone(),
            stream_id: stream_id.into(),
            root_id: id,
            position: position.into(),
            status: ContextStatus::Created,
            business_data: new_data_map(),
            pass_data: new_data_map(),
            trace_ids,
            batch_id: None,
        }
    }

    /// Seed the business data of a new context.
    #[must_use]
    pub fn with_business_data(mut self, business_data: FlowData) -> Self {
        self.business_data = business_data;
        self
    }

    /// Insert one business-data entry.
    pub fn put_business_data(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.business_data.insert(key.into(), value);
    }

    /// Merge a structured jober result object into the business data.
    ///
    /// Non-object results are stored under the `"result"` key so nothing a
    /// task returns is ever dropped.
    pub fn merge_business_data(&mut self, result: serde_json::Value) {
        match result {
            serde_json::Value::Object(map) => {
                for (k, v) in map {
                    self.business_data.insert(k, v);
                }
            }
            serde_json::Value::Null => {}
            other => {
                self.business_data.insert("result".to_string(), other);
            }
        }
    }

    /// Advance the persisted position. Transitions are monotonic per
    /// context; the engine never moves a context backwards.
    pub fn move_to(&mut self, position: impl Into<String>) {
        self.position = position.into();
        self.status = ContextStatus::Running;
    }

    /// Produce an independent branch copy for a fork pass.
    ///
    /// The copy gets a fresh id, keeps `root_id` and all data, and is
    /// stamped with the shared `batch_id` correlating the fork's branches.
    #[must_use]
    pub fn fork_branch(&self, batch_id: &str, position: impl Into<String>) -> Self {
        let mut branch = self.clone();
        branch.id = IdGenerator::new().generate_context_id();
        branch.position = position.into();
        branch.status = ContextStatus::Running;
        branch.batch_id = Some(batch_id.to_string());
        branch
    }

    /// Whether this context has reached a terminal status.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.status == ContextStatus::Terminated
    }
}
