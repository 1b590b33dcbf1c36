//! The dedicated thread that owns the process's only `JsRuntime`.
//!
//! `JsRuntime` is `!Send`, so the isolate lives on its own OS thread with a
//! current-thread tokio runtime; the rest of the process talks to it through
//! an mpsc channel and per-invocation oneshot replies.

use std::path::PathBuf;
use std::rc::Rc;

use deno_core::v8;
use deno_core::{
    serde_v8, JsRuntime, ModuleCodeString, ModuleSpecifier, PollEventLoopOptions, RuntimeOptions,
};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::esm::FsModuleLoader;
use crate::resolve::ModuleFormat;
use crate::{CallShape, InvokeError, LoadError};

const BOOTSTRAP: &str = include_str!("bootstrap.js");

pub(crate) struct Invocation {
    pub payload: Value,
    pub reply: oneshot::Sender<Result<Value, InvokeError>>,
}

pub(crate) struct WorkerSpec {
    pub module_path: PathBuf,
    pub format: ModuleFormat,
    pub target: String,
    pub shape: CallShape,
    pub context: Option<context::InvocationContext>,
}

pub(crate) fn spawn(
    spec: WorkerSpec,
) -> (
    mpsc::UnboundedSender<Invocation>,
    oneshot::Receiver<Result<(), LoadError>>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("fount-isolate".to_string())
        .spawn(move || run(spec, rx, ready_tx))
        .expect("failed to spawn isolate worker thread");
    (tx, ready_rx)
}

fn run(
    spec: WorkerSpec,
    rx: mpsc::UnboundedReceiver<Invocation>,
    ready_tx: oneshot::Sender<Result<(), LoadError>>,
) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to create tokio runtime for isolate worker");

    rt.block_on(async move {
        let module_loader: Option<Rc<dyn deno_core::ModuleLoader>> = match spec.format {
            ModuleFormat::EsModule => Some(Rc::new(FsModuleLoader)),
            ModuleFormat::Classic => None,
        };
        let mut runtime = JsRuntime::new(RuntimeOptions {
            extensions: vec![context::ops::init(), crate::ops::init()],
            module_loader,
            ..Default::default()
        });
        if let Some(ctx) = spec.context.clone() {
            context::ops::install(&runtime.op_state(), ctx);
        }

        if let Err(err) = runtime.execute_script(
            "fount:bootstrap.js",
            ModuleCodeString::from(BOOTSTRAP.to_string()),
        ) {
            let _ = ready_tx.send(Err(LoadError::ModuleLoadError(format!(
                "bootstrap failed: {err}"
            ))));
            return;
        }

        if let Err(err) = load_and_bind(&mut runtime, &spec).await {
            let _ = ready_tx.send(Err(err));
            return;
        }
        if ready_tx.send(Ok(())).is_err() {
            return;
        }

        serve(runtime, spec.shape, rx).await;
    });
}

/// Evaluate the user module with the mechanism matching its format and bind
/// the dot-nested target symbol.
async fn load_and_bind(runtime: &mut JsRuntime, spec: &WorkerSpec) -> Result<(), LoadError> {
    let exports = match spec.format {
        ModuleFormat::EsModule => {
            let specifier = ModuleSpecifier::from_file_path(&spec.module_path).map_err(|_| {
                LoadError::ModuleLoadError(format!(
                    "invalid module path: {}",
                    spec.module_path.display()
                ))
            })?;
            let module_id = runtime
                .load_main_es_module(&specifier)
                .await
                .map_err(|err| LoadError::ModuleLoadError(err.to_string()))?;
            let eval = runtime.mod_evaluate(module_id);
            runtime
                .run_event_loop(PollEventLoopOptions::default())
                .await
                .map_err(|err| LoadError::ModuleLoadError(err.to_string()))?;
            eval.await
                .map_err(|err| LoadError::ModuleLoadError(err.to_string()))?;
            let namespace = runtime
                .get_module_namespace(module_id)
                .map_err(|err| LoadError::ModuleLoadError(err.to_string()))?;
            deno_core::scope!(scope, &mut *runtime);
            let local = v8::Local::new(scope, &namespace);
            let value: v8::Local<v8::Value> = local.into();
            v8::Global::new(scope, value)
        }
        ModuleFormat::Classic => {
            let path = spec.module_path.to_str().ok_or_else(|| {
                LoadError::ModuleLoadError(format!(
                    "invalid utf-8 path: {}",
                    spec.module_path.display()
                ))
            })?;
            let code = format!(
                "globalThis.__fount.requireEntry({})",
                serde_json::to_string(path)
                    .map_err(|err| LoadError::ModuleLoadError(err.to_string()))?
            );
            runtime
                .execute_script("fount:require.js", ModuleCodeString::from(code))
                .map_err(|err| LoadError::ModuleLoadError(err.to_string()))?
        }
    };

    bind_target(runtime, &exports, &spec.target)
}

/// Walk the exported mapping depth-first along the dot-separated target and
/// publish the bound callable to `globalThis.__fountTarget`.
fn bind_target(
    runtime: &mut JsRuntime,
    exports: &v8::Global<v8::Value>,
    target: &str,
) -> Result<(), LoadError> {
    deno_core::scope!(scope, runtime);
    let mut current: v8::Local<v8::Value> = v8::Local::new(scope, exports);
    for segment in target.split('.') {
        let object: v8::Local<v8::Object> = match current.try_into() {
            Ok(object) => object,
            Err(_) => {
                return Err(LoadError::TargetNotFound {
                    target: target.to_string(),
                })
            }
        };
        let key = v8::String::new(scope, segment).ok_or_else(|| {
            LoadError::ModuleLoadError(format!("target segment '{segment}' is not representable"))
        })?;
        current = match object.get(scope, key.into()) {
            Some(value) if !value.is_undefined() => value,
            _ => {
                return Err(LoadError::TargetNotFound {
                    target: target.to_string(),
                })
            }
        };
    }
    if !current.is_function() {
        let actual = current.type_of(scope).to_rust_string_lossy(scope);
        return Err(LoadError::TargetNotCallable {
            target: target.to_string(),
            actual,
        });
    }

    let context = scope.get_current_context();
    let global = context.global(scope);
    let key = v8::String::new(scope, "__fountTarget")
        .ok_or_else(|| LoadError::ModuleLoadError("failed to allocate v8 string".to_string()))?;
    global.set(scope, key.into(), current);
    Ok(())
}

async fn serve(mut runtime: JsRuntime, shape: CallShape, mut rx: mpsc::UnboundedReceiver<Invocation>) {
    while let Some(invocation) = rx.recv().await {
        let result = invoke_once(&mut runtime, shape, invocation.payload).await;
        let _ = invocation.reply.send(result);
    }
}

async fn invoke_once(
    runtime: &mut JsRuntime,
    shape: CallShape,
    payload: Value,
) -> Result<Value, InvokeError> {
    {
        deno_core::scope!(scope, &mut *runtime);
        let value = serde_v8::to_v8(scope, payload)
            .map_err(|err| InvokeError::Runtime(format!("failed to encode request: {err}")))?;
        let context = scope.get_current_context();
        let global = context.global(scope);
        let key = v8::String::new(scope, "__fountRequest")
            .ok_or_else(|| InvokeError::Runtime("failed to allocate v8 string".to_string()))?;
        global.set(scope, key.into(), value);
    }

    let result = runtime
        .execute_script(
            "fount:invoke.js",
            ModuleCodeString::from(shape.invoke_script().to_string()),
        )
        .map_err(|err| InvokeError::Function(err.to_string()))?;

    let mut pending = false;
    {
        deno_core::scope!(scope, &mut *runtime);
        let local = v8::Local::new(scope, &result);
        if let Ok(promise) = v8::Local::<v8::Promise>::try_from(local) {
            pending = matches!(promise.state(), v8::PromiseState::Pending);
        }
    }

    let mut event_loop_error = None;
    if pending {
        if let Err(err) = runtime
            .run_event_loop(PollEventLoopOptions::default())
            .await
        {
            event_loop_error = Some(err.to_string());
        }
    }

    deno_core::scope!(scope, runtime);
    let local = v8::Local::new(scope, &result);
    let settled = if let Ok(promise) = v8::Local::<v8::Promise>::try_from(local) {
        match promise.state() {
            v8::PromiseState::Fulfilled => {
                if let Some(err) = event_loop_error.take() {
                    // A failure surfacing after the invocation promise has
                    // settled came from a detached callback; it cannot be
                    // attributed to this request, so it is only logged.
                    tracing::error!("uncaught async error from user code: {err}");
                }
                Ok(promise.result(scope))
            }
            v8::PromiseState::Rejected => {
                let reason = promise.result(scope);
                Err(InvokeError::Function(reason.to_rust_string_lossy(scope)))
            }
            v8::PromiseState::Pending => Err(InvokeError::Function(
                event_loop_error
                    .take()
                    .unwrap_or_else(|| "function promise still pending after event loop".to_string()),
            )),
        }
    } else {
        Ok(local)
    };

    let value = settled?;
    serde_v8::from_v8::<Value>(scope, value).map_err(|err| {
        InvokeError::Function(format!("function returned non-serializable result: {err}"))
    })
}
