mod common;

use std::sync::Arc;

use common::fixtures::{harness, linear_flow};
use flowmesh::cache::CacheError;
use flowmesh::definition::{DefinitionBuilder, FlowEvent};

#[tokio::test]
async fn repeated_lookup_returns_identical_publisher() {
    let h = harness();
    h.definition_repo.insert(linear_flow("cache1"));

    let first = h.cache.get_publisher("cache1-1.0.0").await.unwrap();
    let second = h.cache.get_publisher("cache1-1.0.0").await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    h.cache.clear();
    let rebuilt = h.cache.get_publisher("cache1-1.0.0").await.unwrap();
    assert!(!Arc::ptr_eq(&first, &rebuilt));
}

#[tokio::test]
async fn definition_lookups_share_one_activation() {
    let h = harness();
    let definition = linear_flow("share1");
    let definition_id = definition.definition_id.clone();
    h.definition_repo.insert(definition);

    let by_stream = h.cache.get_definition_by_stream_id("share1-1.0.0").await.unwrap();
    let by_id = h.cache.get_definition_by_id(&definition_id).await.unwrap();
    assert!(Arc::ptr_eq(&by_stream, &by_id));
    assert_eq!(h.cache.len(), 1);
}

#[tokio::test]
async fn invalid_definition_is_never_cached() {
    let h = harness();
    // Start node with two outgoing events: fails "start node event size".
    let broken = DefinitionBuilder::new("broken", "broke1", "1.0.0")
        .start_node("start")
        .state_node("a", None)
        .state_node("b", None)
        .end_node("end")
        .event(FlowEvent::new("ev0001", "start", "a"))
        .event(FlowEvent::new("ev0002", "start", "b"))
        .event(FlowEvent::new("ev0003", "a", "end"))
        .event(FlowEvent::new("ev0004", "b", "end"))
        .build();
    h.definition_repo.insert(broken);

    let err = h.cache.get_publisher("broke1-1.0.0").await.unwrap_err();
    assert!(matches!(err, CacheError::Validation(_)));
    assert!(h.cache.is_empty());

    // Re-activation is idempotent: same rejection, still nothing cached.
    let err = h.cache.get_publisher("broke1-1.0.0").await.unwrap_err();
    assert!(matches!(err, CacheError::Validation(_)));
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn unknown_stream_is_a_store_error() {
    let h = harness();
    let err = h.cache.get_publisher("ghost1-1.0.0").await.unwrap_err();
    assert!(matches!(err, CacheError::Store(_)));
}

#[tokio::test]
async fn cached_publisher_preserves_filter_state() {
    let h = harness();
    let definition = DefinitionBuilder::new("buffered", "buffd1", "1.0.0")
        .start_node("start")
        .state_node("gather", None)
        .batch_size(3)
        .end_node("end")
        .event(FlowEvent::new("ev0001", "start", "gather"))
        .event(FlowEvent::new("ev0002", "gather", "end"))
        .build();
    h.definition_repo.insert(definition);

    let publisher = h.cache.get_publisher("buffd1-1.0.0").await.unwrap();
    let report = publisher
        .offer(vec![flowmesh::context::FlowContext::new("buffd1-1.0.0", "start")])
        .await
        .unwrap();
    assert_eq!(report.held, 1);

    // A second lookup sees the same instance, held batch included.
    let again = h.cache.get_publisher("buffd1-1.0.0").await.unwrap();
    assert_eq!(again.held_contexts(), 1);
}
