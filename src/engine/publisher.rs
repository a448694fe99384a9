//! The live publisher graph: one publisher per node, one subscription per
//! event, frontier-at-a-time execution.

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

use super::filters::{BatchSizeFilter, FilterChain, SubscriptionFilter, TransBatchSizeFilter};
use super::processor::{self, OwnedContext};
use super::{EngineDeps, EngineError};
use crate::context::FlowContext;
use crate::definition::{FlowDefinition, FlowEvent, FlowNode};
use crate::events::EngineEvent;
use crate::types::NodeType;
use crate::utils::id_generator::IdGenerator;

/// Summary of one trigger pass through the graph.
///
/// Everything offered ends up in exactly one bucket: completed (reached an
/// End node), retried (dispatch failure, parked in the retry subsystem),
/// rejected (lock contention or invalidation), aborted (condition
/// evaluation failed or no branch matched), held (buffered in a batch
/// filter), or dropped (surplus of a capped fork batch). Fork passes also
/// count the source contexts they consumed.
#[derive(Debug, Default)]
pub struct OfferReport {
    pub completed: Vec<FlowContext>,
    pub retried: Vec<String>,
    pub rejected: Vec<String>,
    pub aborted: Vec<String>,
    pub held: usize,
    pub dropped: usize,
    pub forked: usize,
}

impl OfferReport {
    fn merge(&mut self, other: OfferReport) {
        self.completed.extend(other.completed);
        self.retried.extend(other.retried);
        self.rejected.extend(other.rejected);
        self.aborted.extend(other.aborted);
        self.dropped += other.dropped;
        self.forked += other.forked;
        // `held` is recomputed from filter state after every run.
    }
}

struct Subscription {
    event: FlowEvent,
    filter: Option<Arc<FilterChain>>,
}

struct NodePublisher {
    node: FlowNode,
    subscriptions: Vec<Subscription>,
}

#[derive(Default)]
struct EntryOutcome {
    report: OfferReport,
    next: Vec<(String, FlowContext)>,
}

impl EntryOutcome {
    fn forward(&mut self, node_id: String, context: FlowContext) {
        self.next.push((node_id, context));
    }
}

/// Executable form of one activated definition.
///
/// Built once per activation and memoized by the
/// [`FlowCache`](crate::cache::FlowCache): repeated triggers reuse the same
/// instance, so filter state (held batches, fan-in counters) survives
/// between external calls.
pub struct FlowPublisher {
    definition: Arc<FlowDefinition>,
    nodes: FxHashMap<String, NodePublisher>,
    /// Entry filters shared by every subscription targeting a node.
    filters: FxHashMap<String, Arc<FilterChain>>,
    deps: EngineDeps,
    ids: IdGenerator,
}

impl fmt::Debug for FlowPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowPublisher")
            .field("definition", &self.definition.definition_id)
            .field("nodes", &self.nodes.len())
            .field("filters", &self.filters.len())
            .finish_non_exhaustive()
    }
}

impl FlowPublisher {
    /// Wire a validated definition into its live publisher graph.
    #[must_use]
    pub fn new(definition: Arc<FlowDefinition>, deps: EngineDeps) -> Self {
        let mut filters: FxHashMap<String, Arc<FilterChain>> = FxHashMap::default();
        for (id, node) in &definition.nodes {
            let mut chain: Vec<Box<dyn SubscriptionFilter>> = Vec::new();
            if let Some(threshold) = node.trans_batch_size {
                chain.push(Box::new(TransBatchSizeFilter::new(threshold)));
            }
            if let Some(threshold) = node.batch_size {
                chain.push(Box::new(BatchSizeFilter::new(threshold)));
            }
            if !chain.is_empty() {
                filters.insert(id.clone(), Arc::new(FilterChain::new(chain)));
            }
        }

        let nodes = definition
            .nodes
            .iter()
            .map(|(id, node)| {
                let subscriptions = node
                    .events
                    .iter()
                    .map(|event| Subscription {
                        event: event.clone(),
                        filter: filters.get(&event.to).cloned(),
                    })
                    .collect();
                (
                    id.clone(),
                    NodePublisher {
                        node: node.clone(),
                        subscriptions,
                    },
                )
            })
            .collect();

        Self {
            definition,
            nodes,
            filters,
            deps,
            ids: IdGenerator::new(),
        }
    }

    #[must_use]
    pub fn definition(&self) -> &Arc<FlowDefinition> {
        &self.definition
    }

    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.definition.stream_id
    }

    /// Total contexts currently held back by batch filters.
    #[must_use]
    pub fn held_contexts(&self) -> usize {
        self.filters.values().map(|f| f.held()).sum()
    }

    /// Offer a batch of contexts at the definition's Start node and advance
    /// until everything has settled.
    pub async fn offer(&self, contexts: Vec<FlowContext>) -> Result<OfferReport, EngineError> {
        let start = self
            .definition
            .start_node()
            .ok_or(EngineError::NoStartNode)?;
        let positioned = contexts
            .into_iter()
            .map(|mut context| {
                context.move_to(start.id.as_str());
                context
            })
            .collect();
        self.run(vec![(start.id.clone(), positioned)]).await
    }

    /// Offer a batch directly at a given node (retry re-entry, tests).
    pub async fn offer_at(
        &self,
        node_id: &str,
        contexts: Vec<FlowContext>,
    ) -> Result<OfferReport, EngineError> {
        self.run(vec![(node_id.to_string(), contexts)]).await
    }

    /// Forcibly release every batch filter's held contexts and advance
    /// them. Manual escape hatch; there is no timeout-based flush.
    pub async fn flush_held(&self) -> Result<OfferReport, EngineError> {
        let mut frontier: Vec<(String, Vec<FlowContext>)> = Vec::new();
        for (node_id, filter) in &self.filters {
            let drained = filter.drain();
            if !drained.is_empty() {
                frontier.push((node_id.clone(), drained));
            }
        }
        self.run(frontier).await
    }

    /// Frontier loop: process every entry of the current frontier
    /// concurrently, gather the next frontier, repeat until quiescent.
    async fn run(
        &self,
        mut frontier: Vec<(String, Vec<FlowContext>)>,
    ) -> Result<OfferReport, EngineError> {
        let mut report = OfferReport::default();
        while !frontier.is_empty() {
            let entries = std::mem::take(&mut frontier);
            let results = futures_util::future::join_all(
                entries
                    .into_iter()
                    .map(|(node_id, batch)| self.process_entry(node_id, batch)),
            )
            .await;

            let mut grouped: FxHashMap<String, Vec<FlowContext>> = FxHashMap::default();
            for result in results {
                let outcome = result?;
                report.merge(outcome.report);
                for (node_id, context) in outcome.next {
                    grouped.entry(node_id).or_default().push(context);
                }
            }
            let mut next: Vec<(String, Vec<FlowContext>)> = grouped.into_iter().collect();
            next.sort_by(|a, b| a.0.cmp(&b.0));
            frontier = next;
        }
        report.held = self.held_contexts();
        Ok(report)
    }

    /// Process one (node, batch) frontier entry through the node protocol:
    /// lock, jober, callback, route, persist, forward.
    async fn process_entry(
        &self,
        node_id: String,
        batch: Vec<FlowContext>,
    ) -> Result<EntryOutcome, EngineError> {
        let publisher = self
            .nodes
            .get(&node_id)
            .ok_or_else(|| EngineError::UnknownNode {
                node_id: node_id.clone(),
            })?;
        let node = &publisher.node;
        self.deps.emitter.emit(EngineEvent::NodeEntered {
            stream_id: self.definition.stream_id.clone(),
            node_id: node_id.clone(),
            batch_size: batch.len(),
        });

        let mut outcome = EntryOutcome::default();

        // Single-writer discipline: only contexts whose lock this worker
        // wins are processed; the rest are rejected, never blocked on.
        let mut owned: Vec<OwnedContext> = Vec::new();
        for context in batch {
            let lock = self.deps.lock_manager.get_lock(&context.id);
            if lock.try_acquire().await {
                owned.push((context, lock));
            } else {
                tracing::debug!(context = %context.id, "lock contended; rejecting from this pass");
                outcome.report.rejected.push(context.id);
            }
        }

        if node.node_type == NodeType::End {
            processor::terminate_batch(owned, &self.deps, &mut outcome.report.completed).await?;
            self.emit_completed(&node_id, 0);
            return Ok(outcome);
        }

        let survivors =
            processor::run_jober_stage(node, owned, &self.deps, &mut outcome.report.retried)
                .await?;

        if let Some(callback) = &node.callback {
            for (context, _) in &survivors {
                super::dispatch::raise_callback(callback, context, &node.id, &self.deps);
            }
        }

        match node.node_type {
            NodeType::Condition => {
                for (context, lock) in survivors {
                    match processor::select_branch(node, &context, &self.deps).await {
                        Ok(Some(event)) => {
                            let meta_id = event.meta_id.clone();
                            let subscription = publisher
                                .subscriptions
                                .iter()
                                .find(|s| s.event.meta_id == meta_id)
                                .ok_or_else(|| EngineError::UnknownNode {
                                    node_id: event.to.clone(),
                                })?;
                            self.deliver(subscription, context, &lock, &mut outcome)
                                .await?;
                            lock.release().await;
                        }
                        Ok(None) => {
                            tracing::warn!(
                                node = %node.id,
                                context = %context.id,
                                "no condition branch matched; aborting transition"
                            );
                            outcome.report.aborted.push(context.id);
                            lock.release().await;
                        }
                        Err(e) => {
                            tracing::error!(
                                node = %node.id,
                                context = %context.id,
                                error = %e,
                                "condition evaluation failed; aborting transition"
                            );
                            self.deps.emitter.emit(EngineEvent::diagnostic(
                                "condition",
                                format!("aborted {}: {e}", context.id),
                            ));
                            outcome.report.aborted.push(context.id);
                            lock.release().await;
                        }
                    }
                }
            }
            NodeType::Fork => {
                for (context, lock) in survivors {
                    // Branch copies correlate on the source context id.
                    let batch_id = context.id.clone();
                    for subscription in &publisher.subscriptions {
                        let branch =
                            context.fork_branch(&batch_id, subscription.event.to.as_str());
                        self.deliver(subscription, branch, &lock, &mut outcome)
                            .await?;
                    }
                    // The source is consumed by the fork; its branches carry
                    // the lineage from here.
                    self.deps.context_repo.save(&context).await?;
                    outcome.report.forked += 1;
                    lock.release().await;
                }
            }
            _ => {
                for (context, lock) in survivors {
                    if publisher.subscriptions.is_empty() {
                        // Sink node without events: the context parks here.
                        self.deps.context_repo.save(&context).await?;
                        lock.release().await;
                        continue;
                    }
                    for (i, subscription) in publisher.subscriptions.iter().enumerate() {
                        let mut travelling = context.clone();
                        if i > 0 {
                            // Uncorrelated fan-out: extra branches get their
                            // own identity.
                            travelling.id = self.ids.generate_context_id();
                        }
                        self.deliver(subscription, travelling, &lock, &mut outcome)
                            .await?;
                    }
                    lock.release().await;
                }
            }
        }

        let forwarded = outcome.next.len();
        self.emit_completed(&node_id, forwarded);
        Ok(outcome)
    }

    /// Persist a context at its new position, pass it through the target's
    /// entry filter, and forward whatever travels.
    async fn deliver(
        &self,
        subscription: &Subscription,
        mut context: FlowContext,
        lock: &Arc<crate::lock::DistributedLock>,
        outcome: &mut EntryOutcome,
    ) -> Result<(), EngineError> {
        if lock.is_invalidated() {
            tracing::warn!(
                context = %context.id,
                "lock invalidated mid-transition; abandoning critical section"
            );
            outcome.report.rejected.push(context.id);
            return Ok(());
        }

        context.move_to(subscription.event.to.as_str());
        self.deps.context_repo.save(&context).await?;

        match &subscription.filter {
            None => outcome.forward(subscription.event.to.clone(), context),
            Some(filter) => {
                let held_before = filter.held();
                let passed = filter.offer(vec![context]);
                let held_after = filter.held();
                let passed_len = passed.len();
                for travelling in passed {
                    outcome.forward(subscription.event.to.clone(), travelling);
                }
                // One context went in: if it neither travelled nor is held,
                // a fan-in cap dropped it.
                let delta = held_after as isize - held_before as isize;
                if passed_len == 0 && delta <= 0 {
                    outcome.report.dropped += 1;
                }
            }
        }
        Ok(())
    }

    fn emit_completed(&self, node_id: &str, forwarded: usize) {
        self.deps.emitter.emit(EngineEvent::NodeCompleted {
            stream_id: self.definition.stream_id.clone(),
            node_id: node_id.to_string(),
            forwarded,
        });
    }
}
