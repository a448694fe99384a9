//! Core types for the flowmesh workflow engine.
//!
//! This module defines the fundamental enums used throughout the engine for
//! classifying nodes, trigger behaviour, and RPC dispatch. These are the core
//! domain concepts that define what a flow graph *is*; the execution-time
//! types (contexts, retries, leases) live in their own modules.
//!
//! # Key Types
//!
//! - [`NodeType`]: classifies nodes in a flow definition
//! - [`TriggerMode`]: automatic vs. manual node triggering
//! - [`CommunicationType`] / [`SerializationFormat`]: RPC dispatch knobs
//! - [`FlowData`]: the map type used for business and pass data
//!
//! # Examples
//!
//! ```rust
//! use flowmesh::types::{NodeType, TriggerMode};
//!
//! let start = NodeType::Start;
//! assert!(start.is_terminal() == false);
//! assert!(NodeType::End.is_terminal());
//! assert_eq!(TriggerMode::default(), TriggerMode::Auto);
//! ```

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Map type carried by flow contexts for business and pass data.
///
/// Keys are field names, values arbitrary JSON. The same shape is handed to
/// the condition evaluator and used to build jober RPC arguments.
pub type FlowData = FxHashMap<String, serde_json::Value>;

/// Classifies a node within a flow definition.
///
/// The node type drives both structural validation (each type has its own
/// rule set) and runtime processing (condition nodes route, fork nodes copy,
/// state nodes dispatch jobers).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    /// Entry point of a flow. Exactly one per definition, exactly one
    /// outgoing event, never carries a jober.
    Start,
    /// Terminal node. No outgoing events; reaching it terminates the
    /// context.
    End,
    /// Branching node. Outgoing events carry condition rules evaluated
    /// against the context's data.
    Condition,
    /// Fan-out node. Emits independent context copies per outgoing event,
    /// correlated by batch id for later joins.
    Fork,
    /// Ordinary processing node; may carry a jober and a callback.
    State,
}

impl NodeType {
    /// Returns `true` for node types that terminate a context's lifeline.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Returns `true` for node types whose trigger mode must be automatic
    /// and which never carry a jober (Start, End, Condition).
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Start | Self::End | Self::Condition)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::End => write!(f, "end"),
            Self::Condition => write!(f, "condition"),
            Self::Fork => write!(f, "fork"),
            Self::State => write!(f, "state"),
        }
    }
}

/// Whether a node fires as soon as contexts arrive or waits for an external
/// nudge.
///
/// Structural nodes (Start/End/Condition) must be [`TriggerMode::Auto`];
/// validation enforces this.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerMode {
    #[default]
    Auto,
    Manual,
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// RPC dispatch mode for jober and callback invocations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommunicationType {
    #[default]
    Sync,
    Async,
}

impl fmt::Display for CommunicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => write!(f, "sync"),
            Self::Async => write!(f, "async"),
        }
    }
}

/// Payload encoding requested from the RPC layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SerializationFormat {
    #[default]
    Json,
    Protobuf,
}

impl fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Protobuf => write!(f, "protobuf"),
        }
    }
}
