//! UUID-backed identifier generation for contexts, batches, and traces.

use uuid::Uuid;

/// Generates the engine's runtime identifiers.
///
/// A plain value type so callers can keep one per component or create them
/// ad hoc; all ids are v4 UUIDs rendered without braces.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdGenerator;

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Fresh id for a flow context.
    #[must_use]
    pub fn generate_context_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Fresh correlation id for a fork batch.
    #[must_use]
    pub fn generate_batch_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Fresh trace id attached to a context's trace set.
    #[must_use]
    pub fn generate_trace_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Fresh worker identity used for lease holder bookkeeping.
    #[must_use]
    pub fn generate_worker_id(&self) -> String {
        format!("worker-{}", Uuid::new_v4())
    }
}
