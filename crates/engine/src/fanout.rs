//! Output fan-out: forward a function result to every configured sink.
//!
//! Delivery is concurrent and independent. A failing sink never cancels its
//! siblings; once every attempt has settled, the first failure in topology
//! order is the one reported.

use config::{ComponentType, OutputTopology};
use context::InvocationContext;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("output '{sink}' failed: {message}")]
pub struct FanoutError {
    pub sink: String,
    pub message: String,
}

/// Deliver `result` to every output. The payload is wrapped once before
/// fan-out so all sinks observe the identical document.
pub async fn deliver(
    context: &InvocationContext,
    outputs: &[OutputTopology],
    result: &Value,
) -> Result<(), FanoutError> {
    if outputs.is_empty() {
        return Ok(());
    }

    let payload = json!({ "data": result });
    let attempts = outputs.iter().map(|output| deliver_one(context, output, &payload));
    let settled = futures_util::future::join_all(attempts).await;

    for (output, outcome) in outputs.iter().zip(settled) {
        if let Err(err) = outcome {
            tracing::error!("delivery to output '{}' failed: {err}", output.name);
            return Err(FanoutError {
                sink: output.name.clone(),
                message: err.to_string(),
            });
        }
        tracing::debug!("delivered result to output '{}'", output.name);
    }
    Ok(())
}

async fn deliver_one(
    context: &InvocationContext,
    output: &OutputTopology,
    payload: &Value,
) -> Result<(), context::SidecarError> {
    match output.params.component_type {
        ComponentType::Pubsub => context.publish(&output.name, &output.uri, payload).await,
        ComponentType::Bindings => {
            let operation = output.params.operation.as_deref().unwrap_or_default();
            context.binding_send(&output.name, operation, payload).await
        }
        ComponentType::Invoke => Err(context::SidecarError::UnsupportedSink(
            output.name.clone(),
        )),
    }
}
