//! External collaborator contracts: repositories, RPC dispatch, and the
//! condition evaluator.
//!
//! The engine never talks to a database or network directly; it goes
//! through the async traits here. In-memory implementations of the
//! repositories ship in-crate for tests and single-process embedding; RPC
//! and rule evaluation have no meaningful in-process default and are left
//! to the embedder.

use async_trait::async_trait;
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::context::FlowContext;
use crate::definition::FlowDefinition;
use crate::types::{CommunicationType, FlowData, SerializationFormat};

/// Errors from repository collaborators.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("store backend error: {message}")]
    #[diagnostic(code(flowmesh::store::backend))]
    Backend { message: String },

    #[error("definition not found: {key}")]
    #[diagnostic(
        code(flowmesh::store::definition_not_found),
        help("Deploy the definition before triggering it.")
    )]
    DefinitionNotFound { key: String },
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Errors from the RPC dispatch collaborator.
#[derive(Debug, Error, Diagnostic)]
pub enum RpcError {
    #[error("rpc invocation failed ({fitable_id}): {message}")]
    #[diagnostic(code(flowmesh::rpc::invocation))]
    Invocation {
        fitable_id: String,
        message: String,
    },

    #[error("no executor registered for fitable {fitable_id}")]
    #[diagnostic(code(flowmesh::rpc::unknown_fitable))]
    UnknownFitable { fitable_id: String },
}

/// Errors from the condition evaluator collaborator.
///
/// Distinct from dispatch errors on purpose: a failing rule aborts the
/// transition instead of enqueuing a retry.
#[derive(Debug, Error, Diagnostic)]
pub enum EvaluatorError {
    #[error("condition rule failed to evaluate: {message}")]
    #[diagnostic(
        code(flowmesh::evaluator::failed),
        help("The transition is aborted; no default branch is chosen on evaluator errors.")
    )]
    Failed { message: String },
}

impl EvaluatorError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Persistence for flow contexts.
#[async_trait]
pub trait ContextRepo: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<FlowContext>, StoreError>;
    async fn save(&self, context: &FlowContext) -> Result<(), StoreError>;
    /// Contexts parked at the start node of a definition version.
    async fn find_by_start_node(
        &self,
        meta_id: &str,
        version: &str,
    ) -> Result<Vec<FlowContext>, StoreError>;
    /// How many persisted contexts sit at `position` of a stream.
    async fn count_by_node(&self, stream_id: &str, position: &str) -> Result<u64, StoreError>;
}

/// Persistence for flow definitions.
#[async_trait]
pub trait DefinitionRepo: Send + Sync {
    async fn find(&self, definition_id: &str) -> Result<Option<FlowDefinition>, StoreError>;
    async fn find_by_stream_id(
        &self,
        stream_id: &str,
    ) -> Result<Option<FlowDefinition>, StoreError>;
    async fn find_by_meta_id_and_version(
        &self,
        meta_id: &str,
        version: &str,
    ) -> Result<Option<FlowDefinition>, StoreError>;
}

/// Dispatch contract to external task executors.
#[async_trait]
pub trait RpcInvoker: Send + Sync {
    async fn invoke(
        &self,
        genericable_id: &str,
        fitable_id: &str,
        communication_type: CommunicationType,
        serialization_format: SerializationFormat,
        args: Vec<Value>,
    ) -> Result<Value, RpcError>;
}

/// Opaque condition-rule evaluation service.
#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
    async fn evaluate(&self, rule: &str, data: &FlowData) -> Result<bool, EvaluatorError>;
}

/// In-memory context repository.
#[derive(Default)]
pub struct InMemoryContextRepo {
    contexts: Mutex<FxHashMap<String, FlowContext>>,
}

impl InMemoryContextRepo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored contexts; test convenience.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }
}

#[async_trait]
impl ContextRepo for InMemoryContextRepo {
    async fn find(&self, id: &str) -> Result<Option<FlowContext>, StoreError> {
        Ok(self.contexts.lock().get(id).cloned())
    }

    async fn save(&self, context: &FlowContext) -> Result<(), StoreError> {
        self.contexts
            .lock()
            .insert(context.id.clone(), context.clone());
        Ok(())
    }

    async fn find_by_start_node(
        &self,
        meta_id: &str,
        version: &str,
    ) -> Result<Vec<FlowContext>, StoreError> {
        let stream_id = FlowDefinition::stream_id_of(meta_id, version);
        let mut found: Vec<FlowContext> = self
            .contexts
            .lock()
            .values()
            .filter(|c| c.stream_id == stream_id && c.status == crate::context::ContextStatus::Created)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn count_by_node(&self, stream_id: &str, position: &str) -> Result<u64, StoreError> {
        Ok(self
            .contexts
            .lock()
            .values()
            .filter(|c| c.stream_id == stream_id && c.position == position)
            .count() as u64)
    }
}

/// In-memory definition repository keyed by definition, stream, and
/// meta/version identities.
#[derive(Default)]
pub struct InMemoryDefinitionRepo {
    definitions: Mutex<Vec<Arc<FlowDefinition>>>,
}

impl InMemoryDefinitionRepo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition so lookups can find it.
    pub fn insert(&self, definition: FlowDefinition) {
        self.definitions.lock().push(Arc::new(definition));
    }
}

#[async_trait]
impl DefinitionRepo for InMemoryDefinitionRepo {
    async fn find(&self, definition_id: &str) -> Result<Option<FlowDefinition>, StoreError> {
        Ok(self
            .definitions
            .lock()
            .iter()
            .find(|d| d.definition_id == definition_id)
            .map(|d| (**d).clone()))
    }

    async fn find_by_stream_id(
        &self,
        stream_id: &str,
    ) -> Result<Option<FlowDefinition>, StoreError> {
        Ok(self
            .definitions
            .lock()
            .iter()
            .find(|d| d.stream_id == stream_id)
            .map(|d| (**d).clone()))
    }

    async fn find_by_meta_id_and_version(
        &self,
        meta_id: &str,
        version: &str,
    ) -> Result<Option<FlowDefinition>, StoreError> {
        Ok(self
            .definitions
            .lock()
            .iter()
            .find(|d| d.meta_id == meta_id && d.version == version)
            .map(|d| (**d).clone()))
    }
}
