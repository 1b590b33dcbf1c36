//! Module path resolution and packaging-format detection.
//!
//! Resolution is deliberately small: absolute and relative file specifiers
//! with extension probing and `index.*` directory entries. Bare npm-style
//! specifiers are not resolvable here; this runtime ships no node_modules
//! walker.

use std::path::{Path, PathBuf};

use crate::LoadError;

/// How the module will be loaded. Decided once per process, cached in the
/// handle, never re-evaluated per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleFormat {
    EsModule,
    Classic,
}

const ENTRY_EXTENSIONS: [&str; 3] = ["js", "mjs", "cjs"];
const CLASSIC_EXTENSIONS: [&str; 3] = ["js", "cjs", "json"];

/// Resolve the configured code location to a concrete module file.
pub fn resolve_code_location(code_location: &Path) -> Result<PathBuf, LoadError> {
    let absolute = if code_location.is_absolute() {
        code_location.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|err| LoadError::ModuleLoadError(err.to_string()))?
            .join(code_location)
    };
    probe(&absolute, &ENTRY_EXTENSIONS)
        .ok_or_else(|| LoadError::ModuleNotFound(code_location.display().to_string()))
}

/// Resolve a `require()` specifier against the requiring file. Only
/// relative and absolute specifiers are supported.
pub fn resolve_classic_specifier(specifier: &str, referrer: &str) -> Result<PathBuf, LoadError> {
    let path = if specifier.starts_with('/') {
        PathBuf::from(specifier)
    } else if specifier.starts_with("./") || specifier.starts_with("../") {
        let base = Path::new(referrer)
            .parent()
            .unwrap_or_else(|| Path::new("/"));
        base.join(specifier)
    } else {
        return Err(LoadError::ModuleNotFound(format!(
            "bare specifier '{specifier}' (only relative and absolute paths are loadable)"
        )));
    };
    probe(&path, &CLASSIC_EXTENSIONS)
        .ok_or_else(|| LoadError::ModuleNotFound(specifier.to_string()))
}

fn probe(path: &Path, extensions: &[&str]) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    if path.is_dir() {
        for ext in extensions {
            let candidate = path.join(format!("index.{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        return None;
    }
    if path.extension().is_none() {
        for ext in extensions {
            let candidate = path.with_extension(ext);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Determine the packaging format of a resolved module file.
///
/// `.mjs` forces ES-module interpretation, `.cjs` forces classic; otherwise
/// the nearest enclosing `package.json`'s `"type"` field decides, defaulting
/// to classic.
pub fn detect_module_format(module_path: &Path) -> ModuleFormat {
    match module_path.extension().and_then(|ext| ext.to_str()) {
        Some("mjs") => return ModuleFormat::EsModule,
        Some("cjs") => return ModuleFormat::Classic,
        _ => {}
    }

    let start = module_path.parent().unwrap_or_else(|| Path::new("/"));
    for dir in start.ancestors() {
        let manifest = dir.join("package.json");
        if !manifest.is_file() {
            continue;
        }
        let declared = std::fs::read_to_string(&manifest)
            .ok()
            .and_then(|contents| serde_json::from_str::<serde_json::Value>(&contents).ok())
            .and_then(|pkg| {
                pkg.get("type")
                    .and_then(|value| value.as_str())
                    .map(str::to_string)
            });
        return if declared.as_deref() == Some("module") {
            ModuleFormat::EsModule
        } else {
            ModuleFormat::Classic
        };
    }
    ModuleFormat::Classic
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn resolves_exact_file_and_extension_probe() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "fn.js", "");
        assert_eq!(resolve_code_location(&file).unwrap(), file);
        assert_eq!(
            resolve_code_location(&dir.path().join("fn")).unwrap(),
            file
        );
    }

    #[test]
    fn resolves_directory_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = write(dir.path(), "index.js", "");
        assert_eq!(resolve_code_location(dir.path()).unwrap(), index);
    }

    #[test]
    fn missing_module_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_code_location(&dir.path().join("nope.js")).unwrap_err();
        assert!(matches!(err, LoadError::ModuleNotFound(_)));
    }

    #[test]
    fn extension_overrides_win_over_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "package.json", r#"{"type":"module"}"#);
        let cjs = write(dir.path(), "a.cjs", "");
        let mjs = write(dir.path(), "b.mjs", "");
        assert_eq!(detect_module_format(&cjs), ModuleFormat::Classic);
        assert_eq!(detect_module_format(&mjs), ModuleFormat::EsModule);
    }

    #[test]
    fn nearest_manifest_decides_plain_js() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "package.json", r#"{"type":"module"}"#);
        let nested = write(dir.path(), "sub/package.json", r#"{"type":"commonjs"}"#);
        let _ = nested;
        let top = write(dir.path(), "top.js", "");
        let inner = write(dir.path(), "sub/inner.js", "");
        assert_eq!(detect_module_format(&top), ModuleFormat::EsModule);
        assert_eq!(detect_module_format(&inner), ModuleFormat::Classic);
    }

    #[test]
    fn no_manifest_means_classic() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "plain.js", "");
        assert_eq!(detect_module_format(&file), ModuleFormat::Classic);
    }

    #[test]
    fn classic_specifier_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let lib = write(dir.path(), "lib.js", "");
        let main = write(dir.path(), "main.js", "");
        let resolved =
            resolve_classic_specifier("./lib", main.to_str().unwrap()).unwrap();
        assert_eq!(resolved, lib);
        let err = resolve_classic_specifier("express", main.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, LoadError::ModuleNotFound(_)));
    }
}
