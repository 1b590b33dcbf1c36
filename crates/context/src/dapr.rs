//! HTTP client for the Dapr sidecar. The sidecar owns the actual state,
//! pub/sub and binding I/O; this client only speaks its local HTTP API and
//! never retries.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::SidecarError;

pub const DEFAULT_DAPR_HOST: &str = "127.0.0.1";
pub const DEFAULT_DAPR_PORT: u16 = 3500;

/// Capability surface of the sidecar collaborator. A trait so tests can
/// inject a recording fake instead of a live sidecar.
#[async_trait]
pub trait Sidecar: Send + Sync {
    async fn save_state(&self, store: &str, pairs: Vec<StatePair>) -> Result<(), SidecarError>;
    async fn get_state(&self, store: &str, key: &str) -> Result<Option<Value>, SidecarError>;
    async fn delete_state(&self, store: &str, key: &str) -> Result<(), SidecarError>;
    async fn publish(&self, pubsub: &str, topic: &str, payload: &Value)
        -> Result<(), SidecarError>;
    async fn invoke_binding(
        &self,
        name: &str,
        operation: &str,
        payload: &Value,
    ) -> Result<(), SidecarError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatePair {
    pub key: String,
    pub value: Value,
}

pub struct DaprClient {
    client: reqwest::Client,
    base_url: String,
}

impl DaprClient {
    /// Connect to the sidecar on its fixed local address. The port comes
    /// from `DAPR_HTTP_PORT`, defaulting to 3500.
    pub fn from_env() -> Self {
        let port = std::env::var("DAPR_HTTP_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_DAPR_PORT);
        Self::new(DEFAULT_DAPR_HOST, port)
    }

    pub fn new(host: &str, port: u16) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://{host}:{port}/v1.0"),
        }
    }

    fn check_status(response: &reqwest::Response) -> Result<(), SidecarError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SidecarError::Status {
                code: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl Sidecar for DaprClient {
    async fn save_state(&self, store: &str, pairs: Vec<StatePair>) -> Result<(), SidecarError> {
        let response = self
            .client
            .post(format!("{}/state/{store}", self.base_url))
            .json(&pairs)
            .send()
            .await?;
        Self::check_status(&response)
    }

    async fn get_state(&self, store: &str, key: &str) -> Result<Option<Value>, SidecarError> {
        let response = self
            .client
            .get(format!("{}/state/{store}/{key}", self.base_url))
            .send()
            .await?;
        if response.status().as_u16() == 204 {
            return Ok(None);
        }
        Self::check_status(&response)?;
        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(None);
        }
        // Dapr returns the raw stored document; fall back to a JSON string
        // for non-JSON payloads.
        match serde_json::from_slice(&body) {
            Ok(value) => Ok(Some(value)),
            Err(_) => Ok(Some(Value::String(
                String::from_utf8_lossy(&body).into_owned(),
            ))),
        }
    }

    async fn delete_state(&self, store: &str, key: &str) -> Result<(), SidecarError> {
        let response = self
            .client
            .delete(format!("{}/state/{store}/{key}", self.base_url))
            .send()
            .await?;
        Self::check_status(&response)
    }

    async fn publish(
        &self,
        pubsub: &str,
        topic: &str,
        payload: &Value,
    ) -> Result<(), SidecarError> {
        let response = self
            .client
            .post(format!("{}/publish/{pubsub}/{topic}", self.base_url))
            .json(payload)
            .send()
            .await?;
        Self::check_status(&response)
    }

    async fn invoke_binding(
        &self,
        name: &str,
        operation: &str,
        payload: &Value,
    ) -> Result<(), SidecarError> {
        let response = self
            .client
            .post(format!("{}/bindings/{name}", self.base_url))
            .json(&serde_json::json!({ "operation": operation, "data": payload }))
            .send()
            .await?;
        Self::check_status(&response)
    }
}
