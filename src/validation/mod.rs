//! Structural validation of flow definitions.
//!
//! Validation runs once, at definition activation time: a definition that
//! fails any rule is never cached or executed, and activation is
//! all-or-nothing. Rules are an ordered list of independent functions over
//! the whole definition, failing fast on the first violation with a
//! [`ValidationError::InvalidParameter`] naming the offending field.
//!
//! The per-node-type and per-jober-type rule sets are plain dispatch tables
//! keyed on the type enums — no trait-object rule hierarchy.
//!
//! ```rust
//! use flowmesh::definition::{DefinitionBuilder, FlowEvent};
//! use flowmesh::validation::validate;
//!
//! let definition = DefinitionBuilder::new("demo", "demo01", "1.0.0")
//!     .start_node("start")
//!     .end_node("end")
//!     .event(FlowEvent::new("e00001", "start", "end"))
//!     .build();
//!
//! assert!(validate(&definition).is_ok());
//! ```

mod events;
mod jobers;
mod nodes;


pub use events::is_valid_meta_id;

use miette::Diagnostic;
use thiserror::Error;

use crate::definition::{FlowDefinition, FlowNode};
use crate::types::NodeType;

/// Error raised when a definition violates a structural rule.
///
/// The `field` names the violated constraint in the vocabulary a deployment
/// caller can act on (e.g. `"start node event size"`).
#[derive(Debug, Error, Diagnostic)]
pub enum ValidationError {
    #[error("invalid parameter: {field}")]
    #[diagnostic(
        code(flowmesh::validation::invalid_parameter),
        help("Fix the named field in the flow definition and redeploy; activation is all-or-nothing.")
    )]
    InvalidParameter { field: String },
}

impl ValidationError {
    pub(crate) fn field(field: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
        }
    }

    /// The offending field name.
    #[must_use]
    pub fn field_name(&self) -> &str {
        match self {
            Self::InvalidParameter { field } => field,
        }
    }
}

type Rule = fn(&FlowDefinition) -> Result<(), ValidationError>;

/// Ordered rule list; the first failure wins.
const RULES: &[Rule] = &[
    definition_rule,
    events::structural_event_rule,
    node_type_rule,
    jobers::jober_rule,
];

/// Validate a definition against every structural rule.
///
/// Deterministic and idempotent: the same definition always yields the same
/// accept/reject outcome and the same offending field.
pub fn validate(definition: &FlowDefinition) -> Result<(), ValidationError> {
    for rule in RULES {
        rule(definition)?;
    }
    Ok(())
}

/// Definition-level identity and shape checks.
fn definition_rule(definition: &FlowDefinition) -> Result<(), ValidationError> {
    if definition.meta_id.trim().is_empty() {
        return Err(ValidationError::field("definition meta id"));
    }
    if definition.version.trim().is_empty() {
        return Err(ValidationError::field("definition version"));
    }
    if definition.nodes.is_empty() {
        return Err(ValidationError::field("definition node size"));
    }
    let start_count = definition.nodes_of_type(NodeType::Start).count();
    if start_count != 1 {
        return Err(ValidationError::field("start node count"));
    }
    Ok(())
}

/// Per-node-type rules, dispatched by the node's type tag.
fn node_type_rule(definition: &FlowDefinition) -> Result<(), ValidationError> {
    for node in sorted_nodes(definition) {
        match node.node_type {
            NodeType::Start => nodes::start_rule(node)?,
            NodeType::End => nodes::end_rule(node)?,
            NodeType::Condition => nodes::condition_rule(node)?,
            NodeType::Fork => nodes::fork_rule(node)?,
            NodeType::State => nodes::state_rule(node)?,
        }
    }
    Ok(())
}

/// Nodes ordered by id so the first failure is stable across runs.
pub(crate) fn sorted_nodes(definition: &FlowDefinition) -> Vec<&FlowNode> {
    let mut nodes: Vec<&FlowNode> = definition.nodes.values().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    nodes
}
