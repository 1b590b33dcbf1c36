//! The invocation context: state, pub/sub and binding capabilities exposed
//! to both the user callable (through deno_core ops) and the output fan-out.
//! All I/O is delegated to the Dapr sidecar; nothing here retries.

pub mod dapr;
pub mod ops;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use config::SignatureConfig;
pub use dapr::{DaprClient, Sidecar, StatePair};

#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("'{resource}' name must be configured before using '{operation}'")]
    Unconfigured {
        operation: &'static str,
        resource: &'static str,
    },
    #[error("sidecar request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sidecar responded with status {code}")]
    Status { code: u16 },
    #[error("unsupported sink type: {0}")]
    UnsupportedSink(String),
}

/// Capability record handed to request handlers. Constructed once at
/// startup with an explicitly injected sidecar client; immutable after.
#[derive(Clone)]
pub struct InvocationContext {
    sidecar: Arc<dyn Sidecar>,
    state_name: String,
    pubsub_name: String,
    binding_name: String,
}

impl InvocationContext {
    pub fn new(sidecar: Arc<dyn Sidecar>, config: &SignatureConfig) -> Self {
        Self {
            sidecar,
            state_name: config.state_name.clone(),
            pubsub_name: config.pubsub_name().to_string(),
            binding_name: config.binding_name().to_string(),
        }
    }

    #[doc(hidden)]
    pub fn with_names(
        sidecar: Arc<dyn Sidecar>,
        state_name: &str,
        pubsub_name: &str,
        binding_name: &str,
    ) -> Self {
        Self {
            sidecar,
            state_name: state_name.to_string(),
            pubsub_name: pubsub_name.to_string(),
            binding_name: binding_name.to_string(),
        }
    }

    pub async fn state_save(&self, key: String, value: Value) -> Result<(), SidecarError> {
        let store = self.require(&self.state_name, "state.save", "statestore")?;
        self.sidecar
            .save_state(store, vec![StatePair { key, value }])
            .await
    }

    pub async fn state_get(&self, key: &str) -> Result<Option<Value>, SidecarError> {
        let store = self.require(&self.state_name, "state.get", "statestore")?;
        self.sidecar.get_state(store, key).await
    }

    pub async fn state_delete(&self, key: &str) -> Result<(), SidecarError> {
        let store = self.require(&self.state_name, "state.delete", "statestore")?;
        self.sidecar.delete_state(store, key).await
    }

    /// Publish to a pub/sub topic. An empty `name` falls back to the
    /// configured pubsub component.
    pub async fn publish(
        &self,
        name: &str,
        topic: &str,
        payload: &Value,
    ) -> Result<(), SidecarError> {
        let name = if name.is_empty() {
            self.require(&self.pubsub_name, "pubsub.publish", "pubsub")?
        } else {
            name
        };
        self.sidecar.publish(name, topic, payload).await
    }

    /// Send through an output binding. An empty `name` falls back to the
    /// configured binding component.
    pub async fn binding_send(
        &self,
        name: &str,
        operation: &str,
        payload: &Value,
    ) -> Result<(), SidecarError> {
        let name = if name.is_empty() {
            self.require(&self.binding_name, "bindings.send", "binding")?
        } else {
            name
        };
        self.sidecar.invoke_binding(name, operation, payload).await
    }

    fn require<'a>(
        &self,
        name: &'a str,
        operation: &'static str,
        resource: &'static str,
    ) -> Result<&'a str, SidecarError> {
        if name.is_empty() {
            tracing::error!(
                "{resource} name should be specified in env or config.json before using '{operation}'"
            );
            Err(SidecarError::Unconfigured {
                operation,
                resource,
            })
        } else {
            Ok(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSidecar {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Sidecar for RecordingSidecar {
        async fn save_state(
            &self,
            store: &str,
            pairs: Vec<StatePair>,
        ) -> Result<(), SidecarError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("save {store} {}", pairs.len()));
            Ok(())
        }

        async fn get_state(&self, store: &str, key: &str) -> Result<Option<Value>, SidecarError> {
            self.calls.lock().unwrap().push(format!("get {store} {key}"));
            Ok(Some(Value::String("v".into())))
        }

        async fn delete_state(&self, store: &str, key: &str) -> Result<(), SidecarError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("delete {store} {key}"));
            Ok(())
        }

        async fn publish(
            &self,
            pubsub: &str,
            topic: &str,
            _payload: &Value,
        ) -> Result<(), SidecarError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("publish {pubsub} {topic}"));
            Ok(())
        }

        async fn invoke_binding(
            &self,
            name: &str,
            operation: &str,
            _payload: &Value,
        ) -> Result<(), SidecarError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("binding {name} {operation}"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn state_ops_fail_without_configured_store() {
        let ctx = InvocationContext::with_names(Arc::new(RecordingSidecar::default()), "", "", "");
        let err = ctx.state_get("k").await.unwrap_err();
        assert!(matches!(err, SidecarError::Unconfigured { .. }));
        let err = ctx.state_save("k".into(), Value::Null).await.unwrap_err();
        assert!(matches!(err, SidecarError::Unconfigured { .. }));
        let err = ctx.state_delete("k").await.unwrap_err();
        assert!(matches!(err, SidecarError::Unconfigured { .. }));
    }

    #[tokio::test]
    async fn unconfigured_ops_never_reach_the_sidecar() {
        let sidecar = Arc::new(RecordingSidecar::default());
        let ctx = InvocationContext::with_names(sidecar.clone(), "", "", "");
        let _ = ctx.publish("", "t", &Value::Null).await;
        let _ = ctx.binding_send("", "create", &Value::Null).await;
        assert!(sidecar.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn explicit_names_bypass_the_configured_fallback() {
        let sidecar = Arc::new(RecordingSidecar::default());
        let ctx = InvocationContext::with_names(sidecar.clone(), "kv", "", "");
        ctx.publish("pb", "orders", &Value::Null).await.unwrap();
        ctx.binding_send("kafka", "create", &Value::Null)
            .await
            .unwrap();
        ctx.state_save("k".into(), Value::Bool(true)).await.unwrap();
        let calls = sidecar.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            ["publish pb orders", "binding kafka create", "save kv 1"]
        );
    }
}
