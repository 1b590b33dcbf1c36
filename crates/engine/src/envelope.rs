//! Transport-neutral request/response pair. The http crate flattens the
//! axum request into a `RequestEnvelope`; everything inside the engine works
//! on these instead of transport types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub url: String,
    pub method: String,
    /// Header names are lowercased by the transport.
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RequestEnvelope {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Body parsed as JSON; a missing body is `None`, a non-JSON body is a
    /// JSON string of the raw bytes.
    pub fn json_body(&self) -> Option<Value> {
        let body = self.body.as_deref()?;
        Some(
            serde_json::from_str(body)
                .unwrap_or_else(|_| Value::String(body.to_string())),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
}

impl ResponseEnvelope {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Empty 200 acknowledgement.
    pub fn ok_empty() -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: String::new(),
        }
    }

    pub fn ok_json(value: &Value) -> Self {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self {
            status: 200,
            headers,
            body: value.to_string(),
        }
    }

    /// The catch-and-415 policy: any handler-caught error becomes an
    /// unsupported-media-type response carrying the serialized error.
    pub fn error_unsupported(message: &str, sink: Option<&str>) -> Self {
        let mut payload = serde_json::Map::new();
        payload.insert("error".to_string(), Value::String(message.to_string()));
        if let Some(sink) = sink {
            payload.insert("sink".to_string(), Value::String(sink.to_string()));
        }
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self {
            status: 415,
            headers,
            body: Value::Object(payload).to_string(),
        }
    }
}
