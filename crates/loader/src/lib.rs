//! Dynamic loading of the user-supplied callable.
//!
//! `load` resolves a code location, detects the module's packaging format,
//! evaluates it inside a deno_core `JsRuntime`, binds a possibly dot-nested
//! exported symbol, and validates that it is callable. The result is a
//! [`FunctionHandle`], the process-wide handle to the loaded function.
//! Loading is a one-time, non-retryable operation performed before any
//! request is accepted.

mod esm;
mod ops;
mod resolve;
mod worker;

use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

pub use resolve::{detect_module_format, resolve_code_location, ModuleFormat};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("provided code '{0}' is not a loadable module")]
    ModuleNotFound(String),
    #[error(
        "function '{target}' is not defined in the provided module; \
         did you specify the correct target function to execute?"
    )]
    TargetNotFound { target: String },
    #[error("'{target}' needs to be of type function, got: {actual}")]
    TargetNotCallable { target: String, actual: String },
    #[error("provided module can't be loaded: {0}")]
    ModuleLoadError(String),
    #[error("loader worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Error)]
pub enum InvokeError {
    /// The user callable (or its module graph) threw or rejected.
    #[error("{0}")]
    Function(String),
    /// The isolate worker is unavailable; nothing user code did.
    #[error("function runtime unavailable: {0}")]
    Runtime(String),
}

/// The call shape the bound function is invoked with. Determined once at
/// load time from the configured signature, not inferred per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    /// `(req, res)`: request/response pair with a recorder response.
    RequestResponse,
    /// `(cloudevent)`: canonical event in, result out.
    EventOnly,
    /// `(data, context)`: decoded payload in, result out.
    DataInOut,
}

impl CallShape {
    pub(crate) fn invoke_script(self) -> &'static str {
        match self {
            Self::RequestResponse => "globalThis.__fount.invokeHttp()",
            Self::EventOnly => "globalThis.__fount.invokeCloudEvent()",
            Self::DataInOut => "globalThis.__fount.invokeData()",
        }
    }
}

pub struct LoadSpec {
    pub code_location: PathBuf,
    pub target: String,
    pub shape: CallShape,
    /// Capability record bridged into the isolate for the data-in/data-out
    /// shape. `None` keeps the ops installed but unusable.
    pub context: Option<context::InvocationContext>,
}

/// Exclusively-owned reference to the loaded callable. Exactly one exists
/// per process; it is immutable after creation and dropped at exit.
pub struct FunctionHandle {
    shape: CallShape,
    format: ModuleFormat,
    tx: mpsc::UnboundedSender<worker::Invocation>,
}

impl FunctionHandle {
    pub fn shape(&self) -> CallShape {
        self.shape
    }

    pub fn format(&self) -> ModuleFormat {
        self.format
    }

    /// Invoke the bound callable with a payload shaped for the handle's
    /// [`CallShape`]. Errors carry the serialized user-code failure.
    pub async fn invoke(&self, payload: Value) -> Result<Value, InvokeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(worker::Invocation {
                payload,
                reply: reply_tx,
            })
            .map_err(|_| InvokeError::Runtime("isolate worker has shut down".to_string()))?;
        reply_rx
            .await
            .map_err(|_| InvokeError::Runtime("isolate worker dropped the invocation".to_string()))?
    }
}

/// Load the user function. Any exception raised while evaluating the user
/// module is reported as a [`LoadError`], never a crash; the caller decides
/// to terminate the process.
pub async fn load(spec: LoadSpec) -> Result<FunctionHandle, LoadError> {
    let LoadSpec {
        code_location,
        target,
        shape,
        context,
    } = spec;

    let module_path = resolve::resolve_code_location(&code_location)?;
    let format = resolve::detect_module_format(&module_path);
    tracing::info!(
        "loading {} ({}) target '{}'",
        module_path.display(),
        match format {
            ModuleFormat::EsModule => "es module",
            ModuleFormat::Classic => "classic module",
        },
        target
    );

    let (tx, ready) = worker::spawn(worker::WorkerSpec {
        module_path,
        format,
        target,
        shape,
        context,
    });

    match ready.await {
        Ok(Ok(())) => Ok(FunctionHandle { shape, format, tx }),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(LoadError::Worker(
            "worker exited before reporting readiness".to_string(),
        )),
    }
}
