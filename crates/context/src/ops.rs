//! deno_core bridge for the invocation context.
//!
//! The user callable sees a plain `context` object (built by the loader's
//! bootstrap script from `Deno.core.ops`):
//!
//! ```javascript
//! await context.state.save(key, value);
//! const v = await context.state.get(key);
//! await context.pubsub.publish(pubsubName, topic, data);
//! await context.bindings.send(bindingName, operation, data);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use deno_core::{error::CoreError, op2, OpState};
use serde_json::Value;

use crate::InvocationContext;

deno_core::extension!(
    fount_context,
    ops = [
        op_fount_state_save,
        op_fount_state_get,
        op_fount_state_delete,
        op_fount_pubsub_publish,
        op_fount_binding_send,
    ],
);

pub fn init() -> deno_core::Extension {
    fount_context::init()
}

/// Make the context available to the ops of one runtime.
pub fn install(op_state: &Rc<RefCell<OpState>>, context: InvocationContext) {
    op_state.borrow_mut().put(context);
}

fn op_err(message: String) -> CoreError {
    CoreError::from(std::io::Error::other(message))
}

fn context_from(state: &Rc<RefCell<OpState>>) -> Result<InvocationContext, CoreError> {
    state
        .borrow()
        .try_borrow::<InvocationContext>()
        .cloned()
        .ok_or_else(|| op_err("invocation context is not installed".to_string()))
}

#[op2]
async fn op_fount_state_save(
    state: Rc<RefCell<OpState>>,
    #[string] key: String,
    #[serde] value: Value,
) -> Result<(), CoreError> {
    let ctx = context_from(&state)?;
    ctx.state_save(key, value)
        .await
        .map_err(|err| op_err(err.to_string()))
}

#[op2]
#[serde]
async fn op_fount_state_get(
    state: Rc<RefCell<OpState>>,
    #[string] key: String,
) -> Result<Value, CoreError> {
    let ctx = context_from(&state)?;
    let value = ctx
        .state_get(&key)
        .await
        .map_err(|err| op_err(err.to_string()))?;
    Ok(value.unwrap_or(Value::Null))
}

#[op2]
async fn op_fount_state_delete(
    state: Rc<RefCell<OpState>>,
    #[string] key: String,
) -> Result<(), CoreError> {
    let ctx = context_from(&state)?;
    ctx.state_delete(&key)
        .await
        .map_err(|err| op_err(err.to_string()))
}

#[op2]
async fn op_fount_pubsub_publish(
    state: Rc<RefCell<OpState>>,
    #[string] name: String,
    #[string] topic: String,
    #[serde] payload: Value,
) -> Result<(), CoreError> {
    let ctx = context_from(&state)?;
    ctx.publish(&name, &topic, &payload)
        .await
        .map_err(|err| op_err(err.to_string()))
}

#[op2]
async fn op_fount_binding_send(
    state: Rc<RefCell<OpState>>,
    #[string] name: String,
    #[string] operation: String,
    #[serde] payload: Value,
) -> Result<(), CoreError> {
    let ctx = context_from(&state)?;
    ctx.binding_send(&name, &operation, &payload)
        .await
        .map_err(|err| op_err(err.to_string()))
}
