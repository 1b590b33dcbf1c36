//! CloudEvents HTTP binding codec.
//!
//! Pure: classification and decoding work on the request envelope alone, no
//! I/O and no shared state.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::envelope::RequestEnvelope;

/// Metadata headers whose simultaneous presence marks binary content mode.
/// https://github.com/cloudevents/spec/blob/master/http-protocol-binding.md#3-http-message-mapping
const BINARY_REQUIRED_HEADERS: [&str; 4] = ["ce-type", "ce-specversion", "ce-source", "ce-id"];

const CE_PREFIX: &str = "ce-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMode {
    Binary,
    Structured,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("structured cloudevent body is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("structured cloudevent body is not a mapping")]
    NotAMapping,
}

/// A canonical event: attribute name to value, plus `data` for the payload.
pub type CanonicalEvent = Map<String, Value>;

/// Binary mode requires all four metadata headers; any one missing forces
/// structured interpretation.
pub fn classify(request: &RequestEnvelope) -> EventMode {
    let binary = BINARY_REQUIRED_HEADERS
        .iter()
        .all(|name| request.header(name).is_some_and(|value| !value.is_empty()));
    if binary {
        EventMode::Binary
    } else {
        EventMode::Structured
    }
}

/// Build the canonical event from the request. A missing content-type never
/// rejects: interpretation defaults to JSON.
pub fn decode(request: &RequestEnvelope, mode: EventMode) -> Result<CanonicalEvent, CodecError> {
    match mode {
        EventMode::Binary => {
            let mut event = Map::new();
            for (name, value) in &request.headers {
                if let Some(attribute) = name.strip_prefix(CE_PREFIX) {
                    event.insert(attribute.to_string(), Value::String(value.clone()));
                }
            }
            event.insert(
                "datacontenttype".to_string(),
                Value::String(
                    request
                        .content_type()
                        .unwrap_or("application/json")
                        .to_string(),
                ),
            );
            event.insert(
                "data".to_string(),
                request.json_body().unwrap_or(Value::Null),
            );
            Ok(event)
        }
        EventMode::Structured => match request.body.as_deref() {
            None | Some("") => Ok(Map::new()),
            Some(body) => {
                let value: Value = serde_json::from_str(body)
                    .map_err(|err| CodecError::InvalidJson(err.to_string()))?;
                match value {
                    Value::Object(event) => Ok(event),
                    _ => Err(CodecError::NotAMapping),
                }
            }
        },
    }
}
