//! Jober rule: task name hygiene plus per-jober-type constraints.

use super::{ValidationError, sorted_nodes};
use crate::definition::{FlowDefinition, Jober, JoberType};

/// Longest task name accepted.
const MAX_JOBER_NAME_LEN: usize = 256;

/// Characters a task name must not contain.
const FORBIDDEN_NAME_CHARS: &[char] = &[
    '!', '@', '#', '$', '%', '^', '&', '*', '<', '?', '{', '}', '|',
];

/// Validate every jober in the definition.
pub(crate) fn jober_rule(definition: &FlowDefinition) -> Result<(), ValidationError> {
    for node in sorted_nodes(definition) {
        if let Some(jober) = &node.jober {
            check_jober(jober)?;
        }
    }
    Ok(())
}

fn check_jober(jober: &Jober) -> Result<(), ValidationError> {
    if jober.name.len() > MAX_JOBER_NAME_LEN
        || jober.name.chars().any(|c| FORBIDDEN_NAME_CHARS.contains(&c))
    {
        return Err(ValidationError::field("jober name"));
    }
    match jober.jober_type {
        JoberType::Echo => echo_rule(jober),
        JoberType::General => general_rule(jober),
        JoberType::Store => store_rule(jober),
    }
}

/// Echo tasks run in-process and must not name any fitable.
fn echo_rule(jober: &Jober) -> Result<(), ValidationError> {
    if !jober.fitables.is_empty() {
        return Err(ValidationError::field("echo jober fitables"));
    }
    Ok(())
}

/// Generic RPC tasks name exactly one executor fitable.
fn general_rule(jober: &Jober) -> Result<(), ValidationError> {
    if jober.fitables.len() != 1 {
        return Err(ValidationError::field("general jober fitables"));
    }
    Ok(())
}

/// Store tasks resolve by tool identity: a non-blank unique name and a
/// declared parameter list.
fn store_rule(jober: &Jober) -> Result<(), ValidationError> {
    match jober.tool_unique_name() {
        Some(name) if !name.trim().is_empty() => {}
        _ => return Err(ValidationError::field("store jober unique name")),
    }
    if jober.declared_params().is_none() {
        return Err(ValidationError::field("store jober params"));
    }
    Ok(())
}
