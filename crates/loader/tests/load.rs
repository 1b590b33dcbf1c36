//! End-to-end loader tests against a real `JsRuntime` and fixture modules
//! written to a temp dir.

use std::path::{Path, PathBuf};

use loader::{load, CallShape, InvokeError, LoadError, LoadSpec, ModuleFormat};
use serde_json::{json, Value};

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

fn spec(path: PathBuf, target: &str, shape: CallShape) -> LoadSpec {
    LoadSpec {
        code_location: path,
        target: target.to_string(),
        shape,
        context: None,
    }
}

fn http_request() -> Value {
    json!({
        "url": "/anything",
        "method": "GET",
        "headers": {},
        "query": {},
        "body": null,
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn classic_hello_http_responds_200() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write(
        dir.path(),
        "index.js",
        "exports.helloHttp = (req, res) => { res.send('Hello HTTP!') }\n",
    );

    let handle = load(spec(entry, "helloHttp", CallShape::RequestResponse))
        .await
        .unwrap();
    assert_eq!(handle.format(), ModuleFormat::Classic);

    let response = handle.invoke(http_request()).await.unwrap();
    assert_eq!(response["status"], 200);
    assert_eq!(response["body"], "Hello HTTP!");
}

#[tokio::test(flavor = "multi_thread")]
async fn es_module_detected_from_manifest() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "package.json", r#"{"type":"module"}"#);
    let entry = write(
        dir.path(),
        "index.js",
        "export const echo = (event) => event\n",
    );

    let handle = load(spec(entry, "echo", CallShape::EventOnly)).await.unwrap();
    assert_eq!(handle.format(), ModuleFormat::EsModule);

    let event = json!({"id": "1", "type": "t", "data": {"x": 1}});
    let result = handle.invoke(event.clone()).await.unwrap();
    assert_eq!(result, event);
}

#[tokio::test(flavor = "multi_thread")]
async fn mjs_extension_forces_es_module() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write(
        dir.path(),
        "fn.mjs",
        "export default (event) => ({ got: event })\n",
    );

    let handle = load(spec(entry, "default", CallShape::EventOnly))
        .await
        .unwrap();
    assert_eq!(handle.format(), ModuleFormat::EsModule);
    let result = handle.invoke(json!("payload")).await.unwrap();
    assert_eq!(result, json!({"got": "payload"}));
}

#[tokio::test(flavor = "multi_thread")]
async fn cjs_extension_forces_classic_despite_manifest() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "package.json", r#"{"type":"module"}"#);
    let entry = write(
        dir.path(),
        "fn.cjs",
        "module.exports = { f: (data) => data }\n",
    );

    let handle = load(spec(entry, "f", CallShape::DataInOut)).await.unwrap();
    assert_eq!(handle.format(), ModuleFormat::Classic);
    let result = handle.invoke(json!({"n": 3})).await.unwrap();
    assert_eq!(result, json!({"n": 3}));
}

#[tokio::test(flavor = "multi_thread")]
async fn nested_dot_target_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write(
        dir.path(),
        "index.js",
        "exports.helloNestedObj = {\n\
         \x20 notFunctional: 'plain value',\n\
         \x20 helloWorld: (req, res) => { res.send('Hello World!') },\n\
         }\n",
    );

    let handle = load(spec(
        entry,
        "helloNestedObj.helloWorld",
        CallShape::RequestResponse,
    ))
    .await
    .unwrap();
    let response = handle.invoke(http_request()).await.unwrap();
    assert_eq!(response["body"], "Hello World!");
}

#[tokio::test(flavor = "multi_thread")]
async fn undefined_intermediate_is_target_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write(dir.path(), "index.js", "exports.a = { b: () => {} }\n");

    let err = load(spec(entry, "a.missing.b", CallShape::EventOnly))
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::TargetNotFound { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn non_function_target_reports_observed_type() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write(
        dir.path(),
        "index.js",
        "exports.notFunctional = 'this is not a function'\n",
    );

    let err = load(spec(entry, "notFunctional", CallShape::EventOnly))
        .await
        .unwrap_err();
    match err {
        LoadError::TargetNotCallable { target, actual } => {
            assert_eq!(target, "notFunctional");
            assert_eq!(actual, "string");
        }
        other => panic!("expected TargetNotCallable, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_module_is_module_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = load(spec(
        dir.path().join("absent.js"),
        "f",
        CallShape::EventOnly,
    ))
    .await
    .unwrap_err();
    assert!(matches!(err, LoadError::ModuleNotFound(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn throwing_module_is_load_error_not_a_crash() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write(
        dir.path(),
        "index.js",
        "throw new Error('syntax trouble at load time')\n",
    );

    let err = load(spec(entry, "f", CallShape::EventOnly)).await.unwrap_err();
    match err {
        LoadError::ModuleLoadError(message) => {
            assert!(message.contains("syntax trouble"), "got: {message}");
        }
        other => panic!("expected ModuleLoadError, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn classic_require_resolves_relative_and_json_modules() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "lib/greeting.js", "module.exports = { word: 'hi' }\n");
    write(dir.path(), "limits.json", r#"{"max": 3}"#);
    let entry = write(
        dir.path(),
        "index.js",
        "const greeting = require('./lib/greeting')\n\
         const limits = require('./limits.json')\n\
         exports.f = () => greeting.word + ':' + limits.max\n",
    );

    let handle = load(spec(entry, "f", CallShape::DataInOut)).await.unwrap();
    let result = handle.invoke(Value::Null).await.unwrap();
    assert_eq!(result, json!("hi:3"));
}

#[tokio::test(flavor = "multi_thread")]
async fn bare_require_specifier_fails_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write(
        dir.path(),
        "index.js",
        "const express = require('express')\nexports.f = () => {}\n",
    );

    let err = load(spec(entry, "f", CallShape::EventOnly)).await.unwrap_err();
    assert!(matches!(err, LoadError::ModuleLoadError(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn loading_twice_yields_behaviorally_identical_handles() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write(
        dir.path(),
        "index.js",
        "exports.double = (data) => data * 2\n",
    );

    let first = load(spec(entry.clone(), "double", CallShape::DataInOut))
        .await
        .unwrap();
    let second = load(spec(entry, "double", CallShape::DataInOut))
        .await
        .unwrap();

    assert_eq!(first.invoke(json!(21)).await.unwrap(), json!(42));
    assert_eq!(second.invoke(json!(21)).await.unwrap(), json!(42));
}

#[tokio::test(flavor = "multi_thread")]
async fn throwing_callable_surfaces_as_invoke_error() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write(
        dir.path(),
        "index.js",
        "exports.f = () => { throw new Error('boom') }\n",
    );

    let handle = load(spec(entry, "f", CallShape::EventOnly)).await.unwrap();
    let err = handle.invoke(json!({})).await.unwrap_err();
    match err {
        InvokeError::Function(message) => assert!(message.contains("boom"), "got: {message}"),
        other => panic!("expected Function error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn async_callable_resolves_through_the_event_loop() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write(
        dir.path(),
        "index.js",
        "exports.f = async (data) => { return Promise.resolve(data + 1) }\n",
    );

    let handle = load(spec(entry, "f", CallShape::DataInOut)).await.unwrap();
    assert_eq!(handle.invoke(json!(1)).await.unwrap(), json!(2));
}

#[tokio::test(flavor = "multi_thread")]
async fn null_return_from_cloudevent_callable_becomes_empty_object() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write(dir.path(), "index.js", "exports.f = () => null\n");

    let handle = load(spec(entry, "f", CallShape::EventOnly)).await.unwrap();
    assert_eq!(handle.invoke(json!({})).await.unwrap(), json!({}));
}
