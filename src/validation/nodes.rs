//! Per-node-type rules. One function per variant of [`NodeType`].

use super::ValidationError;
use crate::definition::FlowNode;
use crate::types::TriggerMode;

/// Start: exactly one outgoing event, no jober, automatic trigger.
pub(crate) fn start_rule(node: &FlowNode) -> Result<(), ValidationError> {
    if node.events.len() != 1 {
        return Err(ValidationError::field("start node event size"));
    }
    if node.jober.is_some() {
        return Err(ValidationError::field("start node jober"));
    }
    if node.trigger_mode != TriggerMode::Auto {
        return Err(ValidationError::field("start node trigger mode"));
    }
    Ok(())
}

/// End: no outgoing events, no jober, automatic trigger.
pub(crate) fn end_rule(node: &FlowNode) -> Result<(), ValidationError> {
    if !node.events.is_empty() {
        return Err(ValidationError::field("end node event size"));
    }
    if node.jober.is_some() {
        return Err(ValidationError::field("end node jober"));
    }
    if node.trigger_mode != TriggerMode::Auto {
        return Err(ValidationError::field("end node trigger mode"));
    }
    Ok(())
}

/// Condition: at least two branches, no jober, automatic trigger.
///
/// Rule presence on each branch is the structural event rule's concern;
/// this rule owns the branch count.
pub(crate) fn condition_rule(node: &FlowNode) -> Result<(), ValidationError> {
    if node.events.len() < 2 {
        return Err(ValidationError::field("condition node event size"));
    }
    if node.jober.is_some() {
        return Err(ValidationError::field("condition node jober"));
    }
    if node.trigger_mode != TriggerMode::Auto {
        return Err(ValidationError::field("condition node trigger mode"));
    }
    Ok(())
}

/// Fork: at least one branch to copy contexts onto.
pub(crate) fn fork_rule(node: &FlowNode) -> Result<(), ValidationError> {
    if node.events.is_empty() {
        return Err(ValidationError::field("fork node event size"));
    }
    Ok(())
}

/// State nodes are unconstrained at this level; their jober (if any) is
/// covered by the jober rule.
pub(crate) fn state_rule(_node: &FlowNode) -> Result<(), ValidationError> {
    Ok(())
}
