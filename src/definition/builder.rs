//! Fluent builder for flow definitions.
//!
//! Mirrors the shape a deployment payload would carry, without doing any
//! validation: [`DefinitionBuilder::build`] always produces a
//! [`FlowDefinition`], and the validation engine decides whether it may be
//! activated. Events are attached to their `from` node at build time; events
//! whose `from` names an unknown node are kept on a synthetic orphan list so
//! validation can reject them by field name instead of losing them silently.

use rustc_hash::FxHashMap;
use uuid::Uuid;

use super::{Callback, FlowDefinition, FlowEvent, FlowNode, Jober};
use crate::types::{NodeType, TriggerMode};

/// Builder for [`FlowDefinition`] values.
///
/// # Examples
///
/// ```rust
/// use flowmesh::definition::{DefinitionBuilder, FlowEvent};
///
/// let definition = DefinitionBuilder::new("demo", "demo01", "1.0.0")
///     .start_node("start")
///     .state_node("work", None)
///     .end_node("end")
///     .event(FlowEvent::new("e00001", "start", "work"))
///     .event(FlowEvent::new("e00002", "work", "end"))
///     .build();
///
/// assert!(definition.start_node().is_some());
/// ```
#[derive(Debug, Default)]
pub struct DefinitionBuilder {
    definition_id: Option<String>,
    name: String,
    meta_id: String,
    version: String,
    nodes: Vec<FlowNode>,
    events: Vec<FlowEvent>,
}

impl DefinitionBuilder {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        meta_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            definition_id: None,
            name: name.into(),
            meta_id: meta_id.into(),
            version: version.into(),
            nodes: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Override the generated definition id (useful for tests and replays).
    #[must_use]
    pub fn with_definition_id(mut self, definition_id: impl Into<String>) -> Self {
        self.definition_id = Some(definition_id.into());
        self
    }

    /// Add an arbitrary, fully-specified node.
    #[must_use]
    pub fn node(mut self, node: FlowNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add a Start node.
    #[must_use]
    pub fn start_node(self, id: impl Into<String>) -> Self {
        self.node(FlowNode::new(id, NodeType::Start))
    }

    /// Add an End node.
    #[must_use]
    pub fn end_node(self, id: impl Into<String>) -> Self {
        self.node(FlowNode::new(id, NodeType::End))
    }

    /// Add a Condition node.
    #[must_use]
    pub fn condition_node(self, id: impl Into<String>) -> Self {
        self.node(FlowNode::new(id, NodeType::Condition))
    }

    /// Add a Fork node.
    #[must_use]
    pub fn fork_node(self, id: impl Into<String>) -> Self {
        self.node(FlowNode::new(id, NodeType::Fork))
    }

    /// Add a State node, optionally carrying a jober.
    #[must_use]
    pub fn state_node(self, id: impl Into<String>, jober: Option<Jober>) -> Self {
        let mut node = FlowNode::new(id, NodeType::State);
        node.jober = jober;
        self.node(node)
    }

    /// Add a State node with a callback attached.
    #[must_use]
    pub fn state_node_with_callback(
        self,
        id: impl Into<String>,
        jober: Option<Jober>,
        callback: Callback,
    ) -> Self {
        let mut node = FlowNode::new(id, NodeType::State);
        node.jober = jober;
        node.callback = Some(callback);
        self.node(node)
    }

    /// Set the trigger mode of the most recently added node.
    #[must_use]
    pub fn trigger_mode(mut self, trigger_mode: TriggerMode) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.trigger_mode = trigger_mode;
        }
        self
    }

    /// Batch entering contexts on the most recently added node.
    #[must_use]
    pub fn batch_size(mut self, threshold: usize) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.batch_size = Some(threshold);
        }
        self
    }

    /// Cap per-fork fan-in on the most recently added node.
    #[must_use]
    pub fn trans_batch_size(mut self, threshold: usize) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.trans_batch_size = Some(threshold);
        }
        self
    }

    /// Add an event; attached to its `from` node at build time.
    #[must_use]
    pub fn event(mut self, event: FlowEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Assemble the definition.
    ///
    /// Events are distributed onto their `from` nodes in declaration order
    /// (condition branch policy depends on this order). Orphan events whose
    /// `from` node does not exist are attached to a synthetic detached node
    /// entry so validation can name them; they never execute.
    #[must_use]
    pub fn build(self) -> FlowDefinition {
        let mut nodes: FxHashMap<String, FlowNode> = self
            .nodes
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();

        let mut orphans: Vec<FlowEvent> = Vec::new();
        for event in self.events {
            match nodes.get_mut(&event.from) {
                Some(node) => node.events.push(event),
                None => orphans.push(event),
            }
        }
        if !orphans.is_empty() {
            tracing::warn!(
                count = orphans.len(),
                "events reference unknown from-nodes; parking them on a detached node"
            );
            let mut detached = FlowNode::new(DETACHED_NODE_ID, NodeType::State);
            detached.events = orphans;
            nodes.insert(DETACHED_NODE_ID.to_string(), detached);
        }

        let definition_id = self
            .definition_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let stream_id = FlowDefinition::stream_id_of(&self.meta_id, &self.version);

        FlowDefinition {
            definition_id,
            stream_id,
            meta_id: self.meta_id,
            version: self.version,
            name: self.name,
            nodes,
        }
    }
}

/// Id of the synthetic node holding events whose `from` node is unknown.
pub(crate) const DETACHED_NODE_ID: &str = "__detached__";
