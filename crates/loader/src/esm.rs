//! File-system module loader for ES-module user code.
//!
//! Only `file://` specifiers are loadable. Relative imports without an
//! extension are probed the same way the entry location is, so user modules
//! written for Node-style resolution keep working.

use std::path::PathBuf;

use deno_core::{
    resolve_import, ModuleLoadOptions, ModuleLoadReferrer, ModuleLoadResponse, ModuleLoader,
    ModuleSource, ModuleSourceCode, ModuleSpecifier, ModuleType, ResolutionKind,
};
use deno_error::JsErrorBox;

pub struct FsModuleLoader;

impl FsModuleLoader {
    fn load_source(specifier: &ModuleSpecifier) -> Result<ModuleSource, JsErrorBox> {
        let path = specifier
            .to_file_path()
            .map_err(|_| JsErrorBox::generic("only file:// modules are supported"))?;
        let source = std::fs::read_to_string(&path)
            .map_err(|err| JsErrorBox::generic(format!("failed to read {}: {err}", path.display())))?;
        let module_type = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => ModuleType::Json,
            _ => ModuleType::JavaScript,
        };
        Ok(ModuleSource::new(
            module_type,
            ModuleSourceCode::String(source.into()),
            specifier,
            None,
        ))
    }

    fn probe(path: PathBuf) -> PathBuf {
        if path.is_file() || path.extension().is_some() {
            return path;
        }
        for ext in ["js", "mjs", "cjs", "json"] {
            let candidate = path.with_extension(ext);
            if candidate.is_file() {
                return candidate;
            }
        }
        path
    }
}

impl ModuleLoader for FsModuleLoader {
    fn resolve(
        &self,
        specifier: &str,
        referrer: &str,
        _kind: ResolutionKind,
    ) -> Result<ModuleSpecifier, JsErrorBox> {
        let resolved = resolve_import(specifier, referrer).map_err(JsErrorBox::from_err)?;
        if resolved.scheme() != "file" {
            return Err(JsErrorBox::generic(format!(
                "unable to resolve module '{specifier}' (only file modules are loadable)"
            )));
        }
        let path = resolved
            .to_file_path()
            .map_err(|_| JsErrorBox::generic("invalid module path"))?;
        ModuleSpecifier::from_file_path(Self::probe(path))
            .map_err(|_| JsErrorBox::generic("invalid module path"))
    }

    fn load(
        &self,
        module_specifier: &ModuleSpecifier,
        _maybe_referrer: Option<&ModuleLoadReferrer>,
        _options: ModuleLoadOptions,
    ) -> ModuleLoadResponse {
        ModuleLoadResponse::Sync(Self::load_source(module_specifier))
    }
}
