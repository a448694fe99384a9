mod common;

use std::sync::Arc;

use common::fixtures::{
    callback_flow, condition_flow, fork_join_flow, harness, linear_flow, wait_for,
};
use flowmesh::config::LockConfig;
use flowmesh::context::{ContextStatus, FlowContext};
use flowmesh::definition::{DefinitionBuilder, FlowEvent};
use flowmesh::events::EventEmitter;
use flowmesh::lock::LockManager;
use flowmesh::retry::RetryStore;
use flowmesh::stores::ContextRepo;
use serde_json::json;

fn seeded_context(stream_id: &str, amount: i64) -> FlowContext {
    let mut context = FlowContext::new(stream_id, "start");
    context.put_business_data("amount", json!(amount));
    context
}

#[tokio::test(flavor = "multi_thread")]
async fn linear_flow_runs_to_completion() {
    let h = harness();
    h.definition_repo.insert(linear_flow("linrun"));
    let publisher = h.cache.get_publisher("linrun-1.0.0").await.unwrap();

    let context = seeded_context("linrun-1.0.0", 1);
    let context_id = context.id.clone();
    let report = publisher.offer(vec![context]).await.unwrap();

    assert_eq!(report.completed.len(), 1);
    assert!(report.retried.is_empty());
    assert!(report.rejected.is_empty());
    assert_eq!(report.held, 0);

    let done = &report.completed[0];
    assert_eq!(done.id, context_id);
    assert_eq!(done.position, "end");
    assert_eq!(done.status, ContextStatus::Terminated);
    // The jober's structured result was merged back into business data.
    assert_eq!(done.business_data.get("handled_by"), Some(&json!("fit.work")));

    // The terminal state is what was persisted last.
    let persisted = h.context_repo.find(&context_id).await.unwrap().unwrap();
    assert_eq!(persisted.status, ContextStatus::Terminated);
    assert_eq!(persisted.position, "end");

    assert_eq!(h.invoker.calls_to("fit.work").len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn positions_are_persisted_along_the_way() {
    let h = harness();
    h.definition_repo.insert(linear_flow("steps1"));
    let publisher = h.cache.get_publisher("steps1-1.0.0").await.unwrap();

    let report = publisher
        .offer(vec![seeded_context("steps1-1.0.0", 1)])
        .await
        .unwrap();
    assert_eq!(report.completed.len(), 1);

    // Every hop persisted through the repository: start -> work -> end all
    // touched the same row, one row total.
    assert_eq!(h.context_repo.len(), 1);
    assert_eq!(
        h.context_repo.count_by_node("steps1-1.0.0", "end").await.unwrap(),
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn condition_routes_by_rule() {
    let h = harness();
    h.definition_repo.insert(condition_flow("branch"));
    let publisher = h.cache.get_publisher("branch-1.0.0").await.unwrap();

    let report = publisher
        .offer(vec![seeded_context("branch-1.0.0", 20)])
        .await
        .unwrap();
    assert_eq!(report.completed.len(), 1);
    assert_eq!(
        report.completed[0].business_data.get("handled_by"),
        Some(&json!("fit.high"))
    );

    let report = publisher
        .offer(vec![seeded_context("branch-1.0.0", 5)])
        .await
        .unwrap();
    assert_eq!(
        report.completed[0].business_data.get("handled_by"),
        Some(&json!("fit.low"))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn condition_takes_first_declared_match() {
    let h = harness();
    // Both rules hold; declaration order decides.
    let definition = DefinitionBuilder::new("overlap", "overlp", "1.0.0")
        .start_node("start")
        .condition_node("decide")
        .state_node("first", None)
        .state_node("second", None)
        .end_node("end")
        .event(FlowEvent::new("ev0001", "start", "decide"))
        .event(FlowEvent::new("ev0002", "decide", "first").with_condition_rule("true"))
        .event(FlowEvent::new("ev0003", "decide", "second").with_condition_rule("true"))
        .event(FlowEvent::new("ev0004", "first", "end"))
        .event(FlowEvent::new("ev0005", "second", "end"))
        .build();
    h.definition_repo.insert(definition);
    let publisher = h.cache.get_publisher("overlp-1.0.0").await.unwrap();

    let context = seeded_context("overlp-1.0.0", 1);
    let context_id = context.id.clone();
    let report = publisher.offer(vec![context]).await.unwrap();

    assert_eq!(report.completed.len(), 1);
    // Exactly one branch ran; the context travelled through "first".
    let persisted = h.context_repo.find(&context_id).await.unwrap().unwrap();
    assert_eq!(persisted.position, "end");
    assert_eq!(h.context_repo.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn evaluator_failure_aborts_the_transition() {
    let h = harness();
    let definition = DefinitionBuilder::new("broken-rule", "brkrul", "1.0.0")
        .start_node("start")
        .condition_node("decide")
        .state_node("a", None)
        .state_node("b", None)
        .end_node("end")
        .event(FlowEvent::new("ev0001", "start", "decide"))
        .event(FlowEvent::new("ev0002", "decide", "a").with_condition_rule("boom"))
        .event(FlowEvent::new("ev0003", "decide", "b").with_condition_rule("true"))
        .event(FlowEvent::new("ev0004", "a", "end"))
        .event(FlowEvent::new("ev0005", "b", "end"))
        .build();
    h.definition_repo.insert(definition);
    let publisher = h.cache.get_publisher("brkrul-1.0.0").await.unwrap();

    let context = seeded_context("brkrul-1.0.0", 1);
    let context_id = context.id.clone();
    let report = publisher.offer(vec![context]).await.unwrap();

    // No silent default branch: the context aborted at the condition node.
    assert!(report.completed.is_empty());
    assert_eq!(report.aborted, vec![context_id.clone()]);
    let persisted = h.context_repo.find(&context_id).await.unwrap().unwrap();
    assert_eq!(persisted.position, "decide");
}

#[tokio::test(flavor = "multi_thread")]
async fn dispatch_failure_parks_context_for_retry() {
    let h = harness();
    h.definition_repo.insert(linear_flow("fails1"));
    h.invoker.fail("fit.work");
    let publisher = h.cache.get_publisher("fails1-1.0.0").await.unwrap();

    let context = seeded_context("fails1-1.0.0", 1);
    let context_id = context.id.clone();
    let report = publisher.offer(vec![context]).await.unwrap();

    // The failure never reaches the trigger caller.
    assert!(report.completed.is_empty());
    assert_eq!(report.retried, vec![context_id.clone()]);

    let persisted = h.context_repo.find(&context_id).await.unwrap().unwrap();
    assert_eq!(persisted.status, ContextStatus::Retryable);
    assert_eq!(persisted.position, "work");

    let retry = h.retry_store.find(&context_id).await.unwrap().unwrap();
    assert_eq!(retry.retry_count, 0);
    assert_eq!(retry.version, 0);

    // A later sweep re-offers at the failed node; recovery completes it.
    h.invoker.recover("fit.work");
    let parked = h.context_repo.find(&context_id).await.unwrap().unwrap();
    let report = publisher.offer_at("work", vec![parked]).await.unwrap();
    assert_eq!(report.completed.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn fork_joins_on_batch_threshold() {
    let h = harness();
    h.definition_repo.insert(fork_join_flow("forkjn"));
    let publisher = h.cache.get_publisher("forkjn-1.0.0").await.unwrap();

    let context = seeded_context("forkjn-1.0.0", 1);
    let root_id = context.root_id.clone();
    let report = publisher.offer(vec![context]).await.unwrap();

    assert_eq!(report.forked, 1);
    // Both branches crossed the join (batch_size 2) and terminated.
    assert_eq!(report.completed.len(), 2);
    assert_eq!(report.held, 0);

    let mut handlers: Vec<String> = report
        .completed
        .iter()
        .map(|c| c.business_data["handled_by"].as_str().unwrap().to_string())
        .collect();
    handlers.sort();
    assert_eq!(handlers, vec!["fit.left", "fit.right"]);

    for branch in &report.completed {
        assert_eq!(branch.root_id, root_id);
        assert!(branch.batch_id.is_some());
    }
    assert_eq!(
        report.completed[0].batch_id, report.completed[1].batch_id,
        "fork branches share one correlation id"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn held_batch_waits_for_more_arrivals() {
    let h = harness();
    let definition = DefinitionBuilder::new("gather", "gathr1", "1.0.0")
        .start_node("start")
        .state_node("gather", None)
        .batch_size(3)
        .end_node("end")
        .event(FlowEvent::new("ev0001", "start", "gather"))
        .event(FlowEvent::new("ev0002", "gather", "end"))
        .build();
    h.definition_repo.insert(definition);
    let publisher = h.cache.get_publisher("gathr1-1.0.0").await.unwrap();

    let report = publisher
        .offer(vec![
            seeded_context("gathr1-1.0.0", 1),
            seeded_context("gathr1-1.0.0", 2),
        ])
        .await
        .unwrap();
    assert!(report.completed.is_empty());
    assert_eq!(report.held, 2);

    // The third arrival releases the whole buffer.
    let report = publisher
        .offer(vec![seeded_context("gathr1-1.0.0", 3)])
        .await
        .unwrap();
    assert_eq!(report.completed.len(), 3);
    assert_eq!(report.held, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn flush_held_releases_partial_batches() {
    let h = harness();
    let definition = DefinitionBuilder::new("gather", "gathr2", "1.0.0")
        .start_node("start")
        .state_node("gather", None)
        .batch_size(5)
        .end_node("end")
        .event(FlowEvent::new("ev0001", "start", "gather"))
        .event(FlowEvent::new("ev0002", "gather", "end"))
        .build();
    h.definition_repo.insert(definition);
    let publisher = h.cache.get_publisher("gathr2-1.0.0").await.unwrap();

    let report = publisher
        .offer(vec![
            seeded_context("gathr2-1.0.0", 1),
            seeded_context("gathr2-1.0.0", 2),
        ])
        .await
        .unwrap();
    assert_eq!(report.held, 2);

    let report = publisher.flush_held().await.unwrap();
    assert_eq!(report.completed.len(), 2);
    assert_eq!(publisher.held_contexts(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn fan_in_cap_drops_surplus_branches() {
    let h = harness();
    let definition = DefinitionBuilder::new("capped", "capped", "1.0.0")
        .start_node("start")
        .fork_node("fork")
        .state_node("a", None)
        .state_node("b", None)
        .state_node("c", None)
        .state_node("join", None)
        .trans_batch_size(2)
        .end_node("end")
        .event(FlowEvent::new("ev0001", "start", "fork"))
        .event(FlowEvent::new("ev0002", "fork", "a"))
        .event(FlowEvent::new("ev0003", "fork", "b"))
        .event(FlowEvent::new("ev0004", "fork", "c"))
        .event(FlowEvent::new("ev0005", "a", "join"))
        .event(FlowEvent::new("ev0006", "b", "join"))
        .event(FlowEvent::new("ev0007", "c", "join"))
        .event(FlowEvent::new("ev0008", "join", "end"))
        .build();
    h.definition_repo.insert(definition);
    let publisher = h.cache.get_publisher("capped-1.0.0").await.unwrap();

    let report = publisher
        .offer(vec![seeded_context("capped-1.0.0", 1)])
        .await
        .unwrap();

    assert_eq!(report.forked, 1);
    assert_eq!(report.completed.len(), 2);
    assert_eq!(report.dropped, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn callback_notifies_with_filtered_payload() {
    let h = harness();
    h.definition_repo.insert(callback_flow("callbk"));
    let publisher = h.cache.get_publisher("callbk-1.0.0").await.unwrap();

    let report = publisher
        .offer(vec![seeded_context("callbk-1.0.0", 42)])
        .await
        .unwrap();
    assert_eq!(report.completed.len(), 1);

    // Fire-and-forget leg: give the spawned notification a moment.
    let invoker = Arc::clone(&h.invoker);
    wait_for(move || !invoker.calls_to("fit.notify").is_empty()).await;

    let calls = h.invoker.calls_to("fit.notify");
    assert_eq!(calls.len(), 1);
    let payload = &calls[0].args[0];
    assert_eq!(payload["operator"], json!("system"));
    assert_eq!(payload["business_data"], json!({"amount": 42}));
    assert_eq!(calls[0].genericable_id, "gen.callback");
}

#[tokio::test(flavor = "multi_thread")]
async fn contended_context_is_rejected_not_blocked() {
    let h = harness();
    h.definition_repo.insert(linear_flow("locked"));
    let publisher = h.cache.get_publisher("locked-1.0.0").await.unwrap();

    let context = seeded_context("locked-1.0.0", 1);
    let context_id = context.id.clone();

    // Another worker holds this context's lock.
    let other = LockManager::new(
        Arc::clone(&h.lease_store) as Arc<_>,
        LockConfig::default(),
        "worker-other",
        EventEmitter::disconnected(),
    );
    let foreign = other.get_lock(&context_id);
    assert!(foreign.try_acquire().await);

    let report = publisher.offer(vec![context]).await.unwrap();
    assert!(report.completed.is_empty());
    assert_eq!(report.rejected, vec![context_id.clone()]);
    // Nothing was persisted for the rejected context.
    assert!(h.context_repo.find(&context_id).await.unwrap().is_none());

    foreign.release().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn start_node_backlog_is_queryable() {
    let h = harness();
    h.definition_repo.insert(linear_flow("backlg"));

    // Two contexts parked at the start node, persisted but not yet run.
    let mut first = seeded_context("backlg-1.0.0", 1);
    first.id = "ctx-a".to_string();
    let mut second = seeded_context("backlg-1.0.0", 2);
    second.id = "ctx-b".to_string();
    h.context_repo.save(&second).await.unwrap();
    h.context_repo.save(&first).await.unwrap();

    let backlog = h
        .context_repo
        .find_by_start_node("backlg", "1.0.0")
        .await
        .unwrap();
    let ids: Vec<&str> = backlog.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["ctx-a", "ctx-b"]);

    // Once run to completion they leave the backlog.
    let publisher = h.cache.get_publisher("backlg-1.0.0").await.unwrap();
    publisher.offer(backlog).await.unwrap();
    assert!(
        h.context_repo
            .find_by_start_node("backlg", "1.0.0")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn engine_emits_lifecycle_events() {
    let h = harness();
    h.definition_repo.insert(linear_flow("events"));
    let publisher = h.cache.get_publisher("events-1.0.0").await.unwrap();

    publisher
        .offer(vec![seeded_context("events-1.0.0", 1)])
        .await
        .unwrap();

    let sink = h.sink.clone();
    wait_for(move || !sink.of_kind("context_terminated").is_empty()).await;
    assert!(!h.sink.of_kind("node_entered").is_empty());
    assert!(!h.sink.of_kind("node_completed").is_empty());
}
