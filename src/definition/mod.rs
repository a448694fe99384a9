//! Flow-graph data model: definitions, nodes, events, jobers, callbacks.
//!
//! A [`FlowDefinition`] is the immutable description of a workflow: a set of
//! typed [`FlowNode`]s keyed by node id, connected by [`FlowEvent`]s. Once a
//! definition is activated (validated and cached) it is never mutated; a new
//! version is a new value.
//!
//! Definitions are usually built with the fluent [`DefinitionBuilder`]:
//!
//! ```rust
//! use flowmesh::definition::{DefinitionBuilder, FlowEvent, Jober, JoberType, Fitable};
//! use flowmesh::types::NodeType;
//!
//! let definition = DefinitionBuilder::new("order-flow", "abc123", "1.0.0")
//!     .start_node("start")
//!     .state_node(
//!         "charge",
//!         Some(Jober::new("charge card", JoberType::General)
//!             .with_fitable(Fitable::new("genericable.payment", "fitable.charge"))),
//!     )
//!     .end_node("end")
//!     .event(FlowEvent::new("ev0001", "start", "charge"))
//!     .event(FlowEvent::new("ev0002", "charge", "end"))
//!     .build();
//!
//! assert_eq!(definition.stream_id, "abc123-1.0.0");
//! assert_eq!(definition.nodes.len(), 3);
//! ```

mod builder;
mod event;
mod node;

pub use builder::DefinitionBuilder;
pub use event::FlowEvent;
pub use node::{Callback, Fitable, FlowNode, Jober, JoberType};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::types::NodeType;

/// Immutable description of a workflow graph.
///
/// Identity is threefold: `definition_id` (this activation), `meta_id` +
/// `version` (the logical flow), and `stream_id` (the `{meta_id}-{version}`
/// key external triggers use). The node map is keyed by node id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub definition_id: String,
    pub stream_id: String,
    pub meta_id: String,
    pub version: String,
    pub name: String,
    pub nodes: FxHashMap<String, FlowNode>,
}

impl FlowDefinition {
    /// Compose the stream id external triggers address a definition by.
    #[must_use]
    pub fn stream_id_of(meta_id: &str, version: &str) -> String {
        format!("{meta_id}-{version}")
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.get(id)
    }

    /// The unique Start node, if the definition has exactly one.
    ///
    /// Validation guarantees exactly one Start node for activated
    /// definitions; on unvalidated input this returns `None` when the count
    /// is zero or ambiguous.
    #[must_use]
    pub fn start_node(&self) -> Option<&FlowNode> {
        let mut starts = self
            .nodes
            .values()
            .filter(|n| n.node_type == NodeType::Start);
        match (starts.next(), starts.next()) {
            (Some(node), None) => Some(node),
            _ => None,
        }
    }

    /// Iterate nodes of a given type, in unspecified order.
    pub fn nodes_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &FlowNode> {
        self.nodes
            .values()
            .filter(move |n| n.node_type == node_type)
    }

    /// All events of the graph, flattened across nodes.
    pub fn events(&self) -> impl Iterator<Item = &FlowEvent> {
        self.nodes.values().flat_map(|n| n.events.iter())
    }
}
