//! Shared fixtures: mock collaborators and canned definitions.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use flowmesh::cache::FlowCache;
use flowmesh::config::{EngineConfig, LockConfig};
use flowmesh::definition::{
    Callback, DefinitionBuilder, Fitable, FlowDefinition, FlowEvent, Jober, JoberType,
};
use flowmesh::engine::EngineDeps;
use flowmesh::events::{EventBus, MemorySink};
use flowmesh::lock::{InMemoryLeaseStore, LockManager};
use flowmesh::retry::{InMemoryRetryStore, RetryPolicy, RetryService};
use flowmesh::stores::{
    ConditionEvaluator, EvaluatorError, InMemoryContextRepo, InMemoryDefinitionRepo, RpcError,
    RpcInvoker,
};
use flowmesh::types::{CommunicationType, FlowData, SerializationFormat};

/// One recorded RPC call.
#[derive(Clone, Debug)]
pub struct CallRecord {
    pub genericable_id: String,
    pub fitable_id: String,
    pub args: Vec<Value>,
}

/// Invoker that records calls and answers with the handling fitable id.
/// Fitables registered via [`fail`](Self::fail) error instead.
#[derive(Default)]
pub struct MockInvoker {
    calls: Mutex<Vec<CallRecord>>,
    failing: Mutex<HashSet<String>>,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fitable_id: &str) {
        self.failing.lock().insert(fitable_id.to_string());
    }

    pub fn recover(&self, fitable_id: &str) {
        self.failing.lock().remove(fitable_id);
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, fitable_id: &str) -> Vec<CallRecord> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.fitable_id == fitable_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RpcInvoker for MockInvoker {
    async fn invoke(
        &self,
        genericable_id: &str,
        fitable_id: &str,
        _communication_type: CommunicationType,
        _serialization_format: SerializationFormat,
        args: Vec<Value>,
    ) -> Result<Value, RpcError> {
        self.calls.lock().push(CallRecord {
            genericable_id: genericable_id.to_string(),
            fitable_id: fitable_id.to_string(),
            args,
        });
        if self.failing.lock().contains(fitable_id) {
            return Err(RpcError::Invocation {
                fitable_id: fitable_id.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(json!({ "handled_by": fitable_id }))
    }
}

/// Tiny rule evaluator: `true`, `false`, or `<field> <op> <number>` with
/// ops `>`, `<`, `>=`, `<=`, `==`. Anything else is an evaluator error.
pub struct TinyRuleEvaluator;

#[async_trait]
impl ConditionEvaluator for TinyRuleEvaluator {
    async fn evaluate(&self, rule: &str, data: &FlowData) -> Result<bool, EvaluatorError> {
        let rule = rule.trim();
        match rule {
            "true" => return Ok(true),
            "false" => return Ok(false),
            _ => {}
        }
        let parts: Vec<&str> = rule.split_whitespace().collect();
        let [field, op, rhs] = parts.as_slice() else {
            return Err(EvaluatorError::failed(format!("unparseable rule: {rule}")));
        };
        let lhs = data
            .get(*field)
            .and_then(Value::as_f64)
            .ok_or_else(|| EvaluatorError::failed(format!("missing numeric field: {field}")))?;
        let rhs: f64 = rhs
            .parse()
            .map_err(|_| EvaluatorError::failed(format!("bad number: {rhs}")))?;
        match *op {
            ">" => Ok(lhs > rhs),
            "<" => Ok(lhs < rhs),
            ">=" => Ok(lhs >= rhs),
            "<=" => Ok(lhs <= rhs),
            "==" => Ok((lhs - rhs).abs() < f64::EPSILON),
            other => Err(EvaluatorError::failed(format!("unknown operator: {other}"))),
        }
    }
}

/// Everything an engine test needs, wired together.
pub struct TestHarness {
    pub context_repo: Arc<InMemoryContextRepo>,
    pub definition_repo: Arc<InMemoryDefinitionRepo>,
    pub lease_store: Arc<InMemoryLeaseStore>,
    pub retry_store: Arc<InMemoryRetryStore>,
    pub invoker: Arc<MockInvoker>,
    pub lock_manager: Arc<LockManager>,
    pub retry_service: Arc<RetryService>,
    pub sink: MemorySink,
    pub bus: EventBus,
    pub deps: EngineDeps,
    pub cache: FlowCache,
}

pub fn harness() -> TestHarness {
    let context_repo = Arc::new(InMemoryContextRepo::new());
    let definition_repo = Arc::new(InMemoryDefinitionRepo::new());
    let lease_store = Arc::new(InMemoryLeaseStore::new());
    let retry_store = Arc::new(InMemoryRetryStore::new());
    let invoker = Arc::new(MockInvoker::new());

    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    bus.listen();
    let emitter = bus.emitter();

    let config = EngineConfig::new(Some("worker-test".to_string()))
        .with_lock(
            LockConfig::default()
                .with_renew_schedule_rate(Duration::from_millis(50)),
        )
        .with_retry(RetryPolicy::default().without_jitter());

    let lock_manager = Arc::new(LockManager::new(
        Arc::clone(&lease_store) as Arc<_>,
        config.lock.clone(),
        config.worker_id.clone(),
        emitter.clone(),
    ));
    let retry_service = Arc::new(RetryService::new(
        Arc::clone(&retry_store) as _,
        config.retry.clone(),
        emitter.clone(),
    ));

    let deps = EngineDeps {
        context_repo: Arc::clone(&context_repo) as _,
        invoker: Arc::clone(&invoker) as _,
        evaluator: Arc::new(TinyRuleEvaluator) as _,
        lock_manager: Arc::clone(&lock_manager),
        retry_service: Arc::clone(&retry_service),
        emitter,
        config,
    };

    let cache = FlowCache::new(Arc::clone(&definition_repo) as _, deps.clone());

    TestHarness {
        context_repo,
        definition_repo,
        lease_store,
        retry_store,
        invoker,
        lock_manager,
        retry_service,
        sink,
        bus,
        deps,
        cache,
    }
}

fn general_jober(name: &str, fitable_id: &str) -> Jober {
    Jober::new(name, JoberType::General).with_fitable(Fitable::new("gen.task", fitable_id))
}

/// start -> work(jober) -> end
pub fn linear_flow(meta_id: &str) -> FlowDefinition {
    DefinitionBuilder::new("linear", meta_id, "1.0.0")
        .start_node("start")
        .state_node("work", Some(general_jober("work step", "fit.work")))
        .end_node("end")
        .event(FlowEvent::new("ev0001", "start", "work"))
        .event(FlowEvent::new("ev0002", "work", "end"))
        .build()
}

/// start -> decide -> (high | low) -> end, branching on `amount`.
pub fn condition_flow(meta_id: &str) -> FlowDefinition {
    DefinitionBuilder::new("condition", meta_id, "1.0.0")
        .start_node("start")
        .condition_node("decide")
        .state_node("high", Some(general_jober("high step", "fit.high")))
        .state_node("low", Some(general_jober("low step", "fit.low")))
        .end_node("end")
        .event(FlowEvent::new("ev0001", "start", "decide"))
        .event(FlowEvent::new("ev0002", "decide", "high").with_condition_rule("amount > 10"))
        .event(FlowEvent::new("ev0003", "decide", "low").with_condition_rule("amount <= 10"))
        .event(FlowEvent::new("ev0004", "high", "end"))
        .event(FlowEvent::new("ev0005", "low", "end"))
        .build()
}

/// start -> fork -> (left | right) -> join(batch_size=2) -> end
pub fn fork_join_flow(meta_id: &str) -> FlowDefinition {
    DefinitionBuilder::new("fork-join", meta_id, "1.0.0")
        .start_node("start")
        .fork_node("fork")
        .state_node("left", Some(general_jober("left step", "fit.left")))
        .state_node("right", Some(general_jober("right step", "fit.right")))
        .state_node("join", None)
        .batch_size(2)
        .end_node("end")
        .event(FlowEvent::new("ev0001", "start", "fork"))
        .event(FlowEvent::new("ev0002", "fork", "left"))
        .event(FlowEvent::new("ev0003", "fork", "right"))
        .event(FlowEvent::new("ev0004", "left", "join"))
        .event(FlowEvent::new("ev0005", "right", "join"))
        .event(FlowEvent::new("ev0006", "join", "end"))
        .build()
}

/// start -> notify(callback) -> end
pub fn callback_flow(meta_id: &str) -> FlowDefinition {
    let callback = Callback::new("on notify")
        .with_fitable(Fitable::new("gen.callback", "fit.notify"))
        .with_filtered_key("amount");
    DefinitionBuilder::new("callback", meta_id, "1.0.0")
        .start_node("start")
        .state_node_with_callback("notify", Some(general_jober("notify step", "fit.notify_job")), callback)
        .end_node("end")
        .event(FlowEvent::new("ev0001", "start", "notify"))
        .event(FlowEvent::new("ev0002", "notify", "end"))
        .build()
}

/// Poll until `cond` holds or the deadline passes.
pub async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within deadline");
}
