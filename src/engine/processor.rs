//! Node processing stages: termination, jober dispatch, branch selection.

use chrono::Utc;
use std::sync::Arc;

use super::dispatch::dispatch_jober;
use super::{EngineDeps, EngineError};
use crate::context::{ContextStatus, FlowContext};
use crate::definition::{FlowEvent, FlowNode};
use crate::events::EngineEvent;
use crate::lock::DistributedLock;
use crate::retry::RetryEntityType;

/// A context together with the per-context lock owned for this pass.
pub(crate) type OwnedContext = (FlowContext, Arc<DistributedLock>);

/// Terminate a batch that reached an End node: persist the terminal state,
/// emit, release the locks.
pub(crate) async fn terminate_batch(
    contexts: Vec<OwnedContext>,
    deps: &EngineDeps,
    completed: &mut Vec<FlowContext>,
) -> Result<(), EngineError> {
    for (mut context, lock) in contexts {
        context.status = ContextStatus::Terminated;
        deps.context_repo.save(&context).await?;
        deps.emitter.emit(EngineEvent::ContextTerminated {
            stream_id: context.stream_id.clone(),
            context_id: context.id.clone(),
        });
        lock.release().await;
        completed.push(context);
    }
    Ok(())
}

/// Run the node's jober (if any) over the batch.
///
/// Dispatch failures never propagate to the trigger caller: the failing
/// context is persisted as retryable, handed to the retry subsystem, and
/// removed from the batch. Returns the surviving contexts with their merged
/// results.
pub(crate) async fn run_jober_stage(
    node: &FlowNode,
    contexts: Vec<OwnedContext>,
    deps: &EngineDeps,
    retried: &mut Vec<String>,
) -> Result<Vec<OwnedContext>, EngineError> {
    let Some(jober) = &node.jober else {
        return Ok(contexts);
    };

    let mut survivors = Vec::with_capacity(contexts.len());
    for (mut context, lock) in contexts {
        match dispatch_jober(jober, &mut context, deps).await {
            Ok(()) => survivors.push((context, lock)),
            Err(e) => {
                deps.emitter.emit(EngineEvent::DispatchFailed {
                    stream_id: context.stream_id.clone(),
                    node_id: node.id.clone(),
                    context_id: context.id.clone(),
                    reason: e.to_string(),
                });
                tracing::warn!(
                    node = %node.id,
                    context = %context.id,
                    error = %e,
                    "jober dispatch failed; parking context for retry"
                );
                context.status = ContextStatus::Retryable;
                deps.context_repo.save(&context).await?;
                deps.retry_service
                    .register_failure(&context.id, RetryEntityType::Context, Utc::now())
                    .await?;
                retried.push(context.id.clone());
                lock.release().await;
            }
        }
    }
    Ok(survivors)
}

/// Pick the outgoing branch for a condition-node context.
///
/// Branch policy is first-declared-wins: events are evaluated in
/// declaration order and the first rule that holds is taken, whether or not
/// later rules would also hold. `Ok(None)` means no branch matched.
/// Evaluator failures abort the transition with a dedicated error kind; no
/// default branch is ever chosen.
pub(crate) async fn select_branch<'a>(
    node: &'a FlowNode,
    context: &FlowContext,
    deps: &EngineDeps,
) -> Result<Option<&'a FlowEvent>, EngineError> {
    for event in &node.events {
        let Some(rule) = event.condition_rule.as_deref() else {
            continue;
        };
        let matched = deps
            .evaluator
            .evaluate(rule, &context.business_data)
            .await
            .map_err(|source| EngineError::ConditionEvaluation {
                node_id: node.id.clone(),
                source,
            })?;
        if matched {
            return Ok(Some(event));
        }
    }
    Ok(None)
}
