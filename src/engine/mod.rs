//! Reactive execution core: the live publisher graph that advances flow
//! contexts node by node.
//!
//! A [`FlowPublisher`] is built once per activated definition and wires
//! every node to the context repository, RPC invoker, condition evaluator,
//! lock manager, and retry service. Each node is a publisher; each outgoing
//! event is a subscription optionally guarded by a
//! [`SubscriptionFilter`]. Offering a batch of contexts runs frontier
//! passes until everything has completed, been held by a filter, been
//! parked for retry, or been rejected by lock contention.

mod dispatch;
mod filters;
mod processor;
mod publisher;

pub use filters::{BatchSizeFilter, FilterChain, SubscriptionFilter, TransBatchSizeFilter};
pub use publisher::{FlowPublisher, OfferReport};

use miette::Diagnostic;
use std::sync::Arc;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::events::EventEmitter;
use crate::lock::LockManager;
use crate::retry::RetryService;
use crate::stores::{ConditionEvaluator, ContextRepo, EvaluatorError, RpcInvoker, StoreError};

/// Collaborators every publisher graph is wired to.
#[derive(Clone)]
pub struct EngineDeps {
    pub context_repo: Arc<dyn ContextRepo>,
    pub invoker: Arc<dyn RpcInvoker>,
    pub evaluator: Arc<dyn ConditionEvaluator>,
    pub lock_manager: Arc<LockManager>,
    pub retry_service: Arc<RetryService>,
    pub emitter: EventEmitter,
    pub config: EngineConfig,
}

/// Errors surfaced by the execution core.
///
/// Dispatch failures are deliberately absent: they are routed to the retry
/// subsystem and never propagate to the trigger caller.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("unknown node in publisher graph: {node_id}")]
    #[diagnostic(
        code(flowmesh::engine::unknown_node),
        help("The definition changed under a live publisher; clear the cache and re-activate.")
    )]
    UnknownNode { node_id: String },

    #[error("definition has no start node")]
    #[diagnostic(code(flowmesh::engine::no_start_node))]
    NoStartNode,

    #[error("condition evaluation failed at node {node_id}")]
    #[diagnostic(
        code(flowmesh::engine::condition_evaluation),
        help("The transition was aborted; no default branch is chosen on evaluator errors.")
    )]
    ConditionEvaluation {
        node_id: String,
        #[source]
        source: EvaluatorError,
    },

    #[error(transparent)]
    #[diagnostic(code(flowmesh::engine::store))]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(code(flowmesh::engine::retry))]
    Retry(#[from] crate::retry::RetryError),
}
