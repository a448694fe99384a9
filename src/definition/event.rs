//! Events: the directed, optionally conditional edges of a flow graph.

use serde::{Deserialize, Serialize};

/// A directed edge from one node to another.
///
/// `meta_id` is a six-character identifier (`[A-Za-z0-9 ]` only) unique
/// within the definition. `condition_rule` must be present and non-blank
/// exactly when the `from` node is a Condition node; the rule text is opaque
/// to the engine and handed to the external
/// [`ConditionEvaluator`](crate::stores::ConditionEvaluator).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub meta_id: String,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_rule: Option<String>,
}

impl FlowEvent {
    /// Create an unconditional event between two nodes.
    pub fn new(
        meta_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            meta_id: meta_id.into(),
            from: from.into(),
            to: to.into(),
            condition_rule: None,
        }
    }

    /// Attach a condition rule (for events leaving a Condition node).
    #[must_use]
    pub fn with_condition_rule(mut self, rule: impl Into<String>) -> Self {
        self.condition_rule = Some(rule.into());
        self
    }

    /// Whether this event carries a non-blank condition rule.
    #[must_use]
    pub fn has_condition_rule(&self) -> bool {
        self.condition_rule
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty())
    }
}
