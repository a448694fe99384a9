//! Jober RPC dispatch and the fire-and-forget callback leg.

use serde_json::{Map, Value, json};
use std::sync::Arc;

use super::EngineDeps;
use crate::context::FlowContext;
use crate::definition::{Callback, Jober, JoberType};
use crate::events::EngineEvent;
use crate::stores::{RpcError, RpcInvoker};
use crate::types::{CommunicationType, SerializationFormat};

/// Genericable the tool store exposes; Store jobers address a tool by its
/// unique name as the fitable coordinate under this interface.
const TOOL_STORE_GENERICABLE_ID: &str = "flowmesh.jober.tool.store";

/// Invoke a node's jober for one context and merge the result.
///
/// Success mutates the context in place; failure leaves the context's data
/// untouched so the retry attempt starts from the persisted state.
pub(crate) async fn dispatch_jober(
    jober: &Jober,
    context: &mut FlowContext,
    deps: &EngineDeps,
) -> Result<(), RpcError> {
    match jober.jober_type {
        // Echo loops the business data back unchanged; nothing to call.
        JoberType::Echo => Ok(()),
        JoberType::General => {
            let fitable = jober.fitables.first().ok_or_else(|| RpcError::UnknownFitable {
                fitable_id: format!("{} (no fitable configured)", jober.name),
            })?;
            let args = vec![business_args(context)];
            let result = deps
                .invoker
                .invoke(
                    &fitable.genericable_id,
                    &fitable.fitable_id,
                    jober.communication_type,
                    jober.serialization_format,
                    args,
                )
                .await?;
            context.merge_business_data(result);
            Ok(())
        }
        JoberType::Store => {
            let tool = jober.tool_unique_name().unwrap_or_default().to_string();
            let args = vec![json!({
                "tool": tool,
                "args": declared_args(jober, context),
            })];
            let result = deps
                .invoker
                .invoke(
                    TOOL_STORE_GENERICABLE_ID,
                    &tool,
                    jober.communication_type,
                    jober.serialization_format,
                    args,
                )
                .await?;
            context.merge_business_data(result);
            Ok(())
        }
    }
}

/// Raise a node's callback for one context.
///
/// The notification is asynchronous and fire-and-forget: each configured
/// fitable is invoked on a spawned task, no return value is awaited, and a
/// failure on this leg is logged but never retried.
pub(crate) fn raise_callback(
    callback: &Callback,
    context: &FlowContext,
    node_id: &str,
    deps: &EngineDeps,
) {
    let payload = filtered_payload(callback, context, &deps.config.operator);
    for fitable in &callback.fitables {
        let invoker: Arc<dyn RpcInvoker> = Arc::clone(&deps.invoker);
        let genericable_id = fitable.genericable_id.clone();
        let fitable_id = fitable.fitable_id.clone();
        let args = vec![payload.clone()];
        tokio::spawn(async move {
            if let Err(e) = invoker
                .invoke(
                    &genericable_id,
                    &fitable_id,
                    CommunicationType::Async,
                    SerializationFormat::Json,
                    args,
                )
                .await
            {
                tracing::warn!(
                    fitable = %fitable_id,
                    error = %e,
                    "callback notification failed (not retried)"
                );
            }
        });
    }
    deps.emitter.emit(EngineEvent::CallbackRaised {
        stream_id: context.stream_id.clone(),
        node_id: node_id.to_string(),
        context_id: context.id.clone(),
    });
}

/// The whole business-data map as a single structured argument.
fn business_args(context: &FlowContext) -> Value {
    let map: Map<String, Value> = context
        .business_data
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Value::Object(map)
}

/// Business data narrowed to a Store jober's declared parameter names.
fn declared_args(jober: &Jober, context: &FlowContext) -> Value {
    let mut args = Map::new();
    if let Some(params) = jober.declared_params() {
        for param in params {
            if let Some(name) = param.as_str() {
                if let Some(value) = context.business_data.get(name) {
                    args.insert(name.to_string(), value.clone());
                }
            }
        }
    }
    Value::Object(args)
}

/// Business data narrowed to the callback's declared key set, with the
/// operator identity attached.
fn filtered_payload(callback: &Callback, context: &FlowContext, operator: &str) -> Value {
    let mut business = Map::new();
    for key in &callback.filtered_keys {
        if let Some(value) = context.business_data.get(key) {
            business.insert(key.clone(), value.clone());
        }
    }
    json!({
        "context_id": context.id,
        "stream_id": context.stream_id,
        "operator": operator,
        "business_data": Value::Object(business),
    })
}
