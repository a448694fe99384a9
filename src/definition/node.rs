//! Nodes and the task/callback configuration attached to them.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::FlowEvent;
use crate::types::{CommunicationType, NodeType, SerializationFormat, TriggerMode};

/// A single node of a flow definition.
///
/// Structural constraints (event counts, trigger mode, jober presence) are
/// enforced by the validation engine, not by construction; the builder keeps
/// arbitrary shapes representable so broken graphs can be rejected with a
/// precise field name instead of failing to exist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    pub node_type: NodeType,
    #[serde(default)]
    pub trigger_mode: TriggerMode,
    #[serde(default)]
    pub events: Vec<FlowEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jober: Option<Jober>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<Callback>,
    /// Hold-until-threshold batching applied to contexts entering this
    /// node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    /// Per-fork-batch fan-in cap applied to contexts entering this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trans_batch_size: Option<usize>,
}

impl FlowNode {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            trigger_mode: TriggerMode::Auto,
            events: Vec::new(),
            jober: None,
            callback: None,
            batch_size: None,
            trans_batch_size: None,
        }
    }

    #[must_use]
    pub fn with_trigger_mode(mut self, trigger_mode: TriggerMode) -> Self {
        self.trigger_mode = trigger_mode;
        self
    }

    #[must_use]
    pub fn with_jober(mut self, jober: Jober) -> Self {
        self.jober = Some(jober);
        self
    }

    #[must_use]
    pub fn with_callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, threshold: usize) -> Self {
        self.batch_size = Some(threshold);
        self
    }

    #[must_use]
    pub fn with_trans_batch_size(mut self, threshold: usize) -> Self {
        self.trans_batch_size = Some(threshold);
        self
    }
}

/// Identifies a concrete RPC implementation (`fitable_id`) of an interface
/// (`genericable_id`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fitable {
    pub genericable_id: String,
    pub fitable_id: String,
}

impl Fitable {
    pub fn new(genericable_id: impl Into<String>, fitable_id: impl Into<String>) -> Self {
        Self {
            genericable_id: genericable_id.into(),
            fitable_id: fitable_id.into(),
        }
    }
}

impl fmt::Display for Fitable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.genericable_id, self.fitable_id)
    }
}

/// Task kind attached to a node; drives both validation and dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoberType {
    /// Loops the current business data back unchanged; needs no fitables.
    Echo,
    /// Generic RPC task; exactly one fitable names the executor.
    General,
    /// Tool-store task; resolved by a non-blank unique tool name with a
    /// declared parameter list carried in `properties`.
    Store,
}

impl fmt::Display for JoberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Echo => write!(f, "echo"),
            Self::General => write!(f, "general"),
            Self::Store => write!(f, "store"),
        }
    }
}

/// Configured task dispatched when a context passes the owning node.
///
/// `properties` carries per-type extras: Store jobers put the tool's
/// `unique_name` and `params` list here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Jober {
    pub name: String,
    pub jober_type: JoberType,
    #[serde(default)]
    pub fitables: Vec<Fitable>,
    #[serde(default)]
    pub communication_type: CommunicationType,
    #[serde(default)]
    pub serialization_format: SerializationFormat,
    #[serde(default)]
    pub properties: FxHashMap<String, serde_json::Value>,
}

impl Jober {
    pub fn new(name: impl Into<String>, jober_type: JoberType) -> Self {
        Self {
            name: name.into(),
            jober_type,
            fitables: Vec::new(),
            communication_type: CommunicationType::Sync,
            serialization_format: SerializationFormat::Json,
            properties: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn with_fitable(mut self, fitable: Fitable) -> Self {
        self.fitables.push(fitable);
        self
    }

    #[must_use]
    pub fn with_communication_type(mut self, communication_type: CommunicationType) -> Self {
        self.communication_type = communication_type;
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Tool unique name, for Store jobers.
    #[must_use]
    pub fn tool_unique_name(&self) -> Option<&str> {
        self.properties.get("unique_name").and_then(|v| v.as_str())
    }

    /// Declared parameter list, for Store jobers.
    #[must_use]
    pub fn declared_params(&self) -> Option<&Vec<serde_json::Value>> {
        self.properties.get("params").and_then(|v| v.as_array())
    }
}

/// Asynchronous notification raised after a node successfully processes a
/// context.
///
/// `filtered_keys` declares which business-data keys the notification may
/// carry; everything else is stripped before dispatch. The notification leg
/// is fire-and-forget: no result is awaited and failures are not retried.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Callback {
    pub name: String,
    #[serde(default)]
    pub fitables: Vec<Fitable>,
    #[serde(default)]
    pub filtered_keys: BTreeSet<String>,
}

impl Callback {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fitables: Vec::new(),
            filtered_keys: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_fitable(mut self, fitable: Fitable) -> Self {
        self.fitables.push(fitable);
        self
    }

    #[must_use]
    pub fn with_filtered_key(mut self, key: impl Into<String>) -> Self {
        self.filtered_keys.insert(key.into());
        self
    }
}
