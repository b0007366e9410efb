//! Embedding surface: conversions, JSON, environments, configuration

mod common;

use common::*;
use lunaris_config::global::GlobalConfig;
use lunaris_config::project::{ModulesConfig, ProjectConfig, VmConfig};
use lunaris_runtime::api::json::{from_json, to_json};
use lunaris_runtime::{ByteCodeBuilder, OpCode, Runtime, RuntimeConfig, Value};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;

#[test]
fn test_map_conversion_round_trip() {
    let runtime = Runtime::new();
    let mut scores = HashMap::new();
    scores.insert("alice".to_string(), 3.0);
    scores.insert("bob".to_string(), 5.0);
    runtime.set_global("scores", scores.clone());

    let back: HashMap<String, f64> = runtime.get_global("scores").unwrap();
    assert_eq!(back, scores);
}

#[test]
fn test_conversion_failure_is_reported() {
    let runtime = Runtime::new();
    runtime.set_global("name", "lunaris");
    let result: Result<f64, _> = runtime.get_global("name");
    assert!(result.is_err());
}

#[test]
fn test_optional_global() {
    let runtime = Runtime::new();
    let missing: Option<f64> = runtime.get_global("nothing").unwrap();
    assert_eq!(missing, None);
}

#[test]
fn test_json_into_script_and_back() {
    // config.limits[2] * 10
    let runtime = Runtime::new();
    let config = from_json(
        &json!({"name": "demo", "limits": [1, 2, 3]}),
        runtime.shared().ids(),
    );
    runtime.set_global("config", config);

    let result = run(&runtime, |b| {
        b.begin_fn(0);
        load_field(b, "config", "limits");
        b.literal(2.0);
        b.op(OpCode::Index);
        b.literal(10.0);
        b.op(OpCode::Mul);
        b.ret(1);
    });
    assert_number(result, 20.0);

    let back = to_json(&runtime.globals().get_str("config")).unwrap();
    assert_eq!(back, json!({"name": "demo", "limits": [1, 2, 3]}));
}

#[test]
fn test_json_rejects_functions() {
    let runtime = Runtime::new();
    let print = runtime.globals().get_str("print");
    let err = to_json(&print).unwrap_err();
    assert!(err.to_string().contains("cannot convert to JSON"), "{}", err);
}

#[test]
fn test_custom_environment_isolates_globals() {
    let runtime = Runtime::new();
    let env = runtime.new_table();
    env.set_str("x", Value::from(5.0));
    runtime.set_global("x", 1.0);

    let mut b = ByteCodeBuilder::new("sandboxed");
    b.begin_fn(0);
    b.load(global("x"));
    b.ret(1);
    let chunk = runtime.load_with_env(b.build(), Value::Table(env)).unwrap();
    assert_eq!(runtime.call_function(&chunk, vec![]).unwrap(), Value::from(5.0));
}

#[test]
fn test_state_persists_between_chunks() {
    let runtime = Runtime::new();
    run(&runtime, |b| {
        b.begin_fn(0);
        b.literal("kept");
        b.store_pop(global("saved"));
        b.ret(0);
    })
    .unwrap();
    let result = run(&runtime, |b| {
        b.begin_fn(0);
        b.load(global("saved"));
        b.ret(1);
    });
    assert_eq!(result.unwrap(), Value::from("kept"));
}

#[test]
fn test_project_config_drives_runtime() {
    let project = ProjectConfig {
        vm: Some(VmConfig {
            max_call_depth: Some(10),
            ..Default::default()
        }),
        modules: Some(ModulesConfig {
            table: Some(false),
            coroutine: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    };
    let config = RuntimeConfig::resolve(&GlobalConfig::default(), &project);
    let runtime = Runtime::with_config(&config);
    assert!(runtime.globals().get_str("table").is_nil());
    assert!(runtime.globals().get_str("coroutine").is_nil());
    assert!(runtime.globals().get_str("pcall").is_callable());
    assert_eq!(runtime.shared().config().max_call_depth, 10);
}
