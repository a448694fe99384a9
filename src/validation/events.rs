//! Structural event rule: identifiers, endpoints, condition-rule symmetry.

use super::{ValidationError, sorted_nodes};
use crate::definition::FlowDefinition;
use crate::types::NodeType;

/// Length every event meta id must have.
pub(crate) const META_ID_LEN: usize = 6;

/// Check every event of every node.
///
/// An event must carry a well-formed meta id, reference two existing and
/// distinct nodes, originate from the node it is attached to, and carry a
/// condition rule exactly when its `from` node is a Condition node.
pub(crate) fn structural_event_rule(
    definition: &FlowDefinition,
) -> Result<(), ValidationError> {
    for node in sorted_nodes(definition) {
        for event in &node.events {
            if !is_valid_meta_id(&event.meta_id) {
                return Err(ValidationError::field("event meta id"));
            }
            if event.from.trim().is_empty() || event.from != node.id {
                return Err(ValidationError::field("event from node"));
            }
            if event.to.trim().is_empty() || !definition.nodes.contains_key(&event.to) {
                return Err(ValidationError::field("event to node"));
            }
            if event.from == event.to {
                return Err(ValidationError::field("event from to"));
            }
            let from_condition = node.node_type == NodeType::Condition;
            if from_condition && !event.has_condition_rule() {
                return Err(ValidationError::field("condition node condition rule"));
            }
            if !from_condition && event.condition_rule.is_some() {
                return Err(ValidationError::field("event condition rule"));
            }
        }
    }
    Ok(())
}

/// Meta ids are exactly six characters drawn from `[A-Za-z0-9 ]`.
#[must_use]
pub fn is_valid_meta_id(meta_id: &str) -> bool {
    meta_id.len() == META_ID_LEN
        && meta_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ')
}
