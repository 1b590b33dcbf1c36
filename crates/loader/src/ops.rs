//! Synchronous ops backing the bootstrap script's CommonJS host.

use deno_core::{error::CoreError, op2};

use crate::resolve::resolve_classic_specifier;

deno_core::extension!(
    fount_loader,
    ops = [op_fount_module_resolve, op_fount_module_read],
);

pub fn init() -> deno_core::Extension {
    fount_loader::init_ops()
}

fn op_err(message: String) -> CoreError {
    CoreError::from(std::io::Error::other(message))
}

#[op2]
#[string]
fn op_fount_module_resolve(
    #[string] specifier: String,
    #[string] referrer: String,
) -> Result<String, CoreError> {
    let resolved =
        resolve_classic_specifier(&specifier, &referrer).map_err(|err| op_err(err.to_string()))?;
    resolved
        .to_str()
        .map(str::to_string)
        .ok_or_else(|| op_err(format!("invalid utf-8 path: {}", resolved.display())))
}

#[op2]
#[string]
fn op_fount_module_read(#[string] path: String) -> Result<String, CoreError> {
    std::fs::read_to_string(&path).map_err(|err| op_err(format!("failed to read {path}: {err}")))
}
