//! Signature routing: one of five request-handling variants, selected once
//! at startup from the configured signature and mode.

use config::{FunctionMode, SignatureConfig, SignatureType};
use context::InvocationContext;
use loader::{CallShape, FunctionHandle};
use serde_json::{json, Map, Value};

use crate::cloudevent;
use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::fanout;

/// The request-handling variant. Fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Http,
    CloudEvent,
    General,
    Subscribe,
    BindingReceive,
}

impl Variant {
    pub fn select(source: SignatureType, mode: Option<FunctionMode>) -> Self {
        match (source, mode) {
            (SignatureType::Http, _) => Self::Http,
            (SignatureType::CloudEvent, _) => Self::CloudEvent,
            (SignatureType::OpenFunction, None) => Self::General,
            (SignatureType::OpenFunction, Some(FunctionMode::Subscribe)) => Self::Subscribe,
            (SignatureType::OpenFunction, Some(FunctionMode::BindingReceive)) => {
                Self::BindingReceive
            }
        }
    }
}

/// How the user callable is invoked for a given signature. The loader needs
/// this before the router exists.
pub fn call_shape(source: SignatureType) -> CallShape {
    match source {
        SignatureType::Http => CallShape::RequestResponse,
        SignatureType::CloudEvent => CallShape::EventOnly,
        SignatureType::OpenFunction => CallShape::DataInOut,
    }
}

pub struct SignatureRouter {
    variant: Variant,
    handle: FunctionHandle,
    context: InvocationContext,
    config: SignatureConfig,
}

impl SignatureRouter {
    pub fn new(
        config: SignatureConfig,
        handle: FunctionHandle,
        context: InvocationContext,
    ) -> Self {
        let variant = Variant::select(config.source, config.mode);
        Self {
            variant,
            handle,
            context,
            config,
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Pubsub topic subscriptions advertised to the sidecar's discovery
    /// endpoint. Non-empty only for the subscribe variant.
    pub fn subscriptions(&self) -> Value {
        match (self.variant, &self.config.input) {
            (Variant::Subscribe, Some(input)) => json!([{
                "pubsubname": input.name,
                "topic": input.uri,
                "route": "/",
            }]),
            _ => json!([]),
        }
    }

    /// Handle one request. Never fails outward: every handler-caught error
    /// is already mapped to its 415 response here.
    pub async fn handle(&self, request: RequestEnvelope) -> ResponseEnvelope {
        match self.variant {
            Variant::Http => self.handle_http(request).await,
            Variant::CloudEvent => self.handle_cloudevent(request).await,
            Variant::General | Variant::BindingReceive => {
                let payload = request.json_body().unwrap_or(Value::Null);
                self.invoke_and_fan_out(payload).await
            }
            Variant::Subscribe => {
                // The inbound body is an event envelope; the callable sees
                // only its data field.
                let payload = match request.json_body() {
                    Some(Value::Object(mut event)) => {
                        event.remove("data").unwrap_or(Value::Null)
                    }
                    Some(other) => other,
                    None => Value::Null,
                };
                self.invoke_and_fan_out(payload).await
            }
        }
    }

    async fn handle_http(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let payload = http_payload(&request);
        match self.handle.invoke(payload).await {
            Ok(value) => ResponseEnvelope::from_value(value).unwrap_or_else(|err| {
                tracing::error!("malformed response from http callable: {err}");
                ResponseEnvelope::error_unsupported(&err.to_string(), None)
            }),
            Err(err) => ResponseEnvelope::error_unsupported(&err.to_string(), None),
        }
    }

    async fn handle_cloudevent(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let mode = cloudevent::classify(&request);
        let event = match cloudevent::decode(&request, mode) {
            Ok(event) => event,
            Err(err) => return ResponseEnvelope::error_unsupported(&err.to_string(), None),
        };
        match self.handle.invoke(Value::Object(event)).await {
            Ok(result) => ResponseEnvelope::ok_json(&result),
            Err(err) => ResponseEnvelope::error_unsupported(&err.to_string(), None),
        }
    }

    async fn invoke_and_fan_out(&self, payload: Value) -> ResponseEnvelope {
        let result = match self.handle.invoke(payload).await {
            Ok(result) => result,
            Err(err) => return ResponseEnvelope::error_unsupported(&err.to_string(), None),
        };
        if self.config.outputs.is_empty() {
            return ResponseEnvelope::ok_json(&json!({ "data": result }));
        }
        match fanout::deliver(&self.context, &self.config.outputs, &result).await {
            Ok(()) => ResponseEnvelope::ok_empty(),
            Err(err) => {
                ResponseEnvelope::error_unsupported(&err.message, Some(&err.sink))
            }
        }
    }
}

/// Flatten a request into the plain object the `(req, res)` callable sees.
fn http_payload(request: &RequestEnvelope) -> Value {
    let mut headers = Map::new();
    for (name, value) in &request.headers {
        headers.insert(name.clone(), Value::String(value.clone()));
    }

    let mut query = Map::new();
    if let Some((_, raw)) = request.url.split_once('?') {
        for pair in raw.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            query.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    json!({
        "url": request.url,
        "method": request.method,
        "headers": headers,
        "query": query,
        "body": request.json_body().unwrap_or(Value::Null),
    })
}
