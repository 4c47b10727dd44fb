//! Test harness for end-to-end tests
//!
//! Every runtime comes with the fixture assembly imported and the `i32`,
//! `i64`, `f64` and `string` primitive type objects bound as globals.

use tandem_runtime::tandem_engine::{primitive, BridgeConfig, HostTypeRef, Primitive, Value};
use tandem_runtime::Runtime;

use super::fixtures::demo_assembly;

pub use tandem_runtime::tandem_engine::BridgeError;

/// Fresh runtime with the fixture types imported
pub fn runtime() -> Runtime {
    runtime_with(BridgeConfig::default())
}

pub fn runtime_with(config: BridgeConfig) -> Runtime {
    let rt = Runtime::with_config(config).expect("runtime creation failed");
    rt.import_assembly(&demo_assembly()).expect("assembly import failed");
    for p in [Primitive::I32, Primitive::I64, Primitive::F64, Primitive::String] {
        rt.import_type(&primitive(p)).expect("primitive import failed");
    }
    rt
}

/// Run `source` and return its results, panicking on error
pub fn run(rt: &Runtime, source: &str) -> Vec<Value> {
    match rt.run(source) {
        Ok(values) => values,
        Err(e) => panic!("script failed: {}\n{}", e, source),
    }
}

/// The first result of `source`
pub fn first(rt: &Runtime, source: &str) -> Value {
    run(rt, source).into_iter().next().unwrap_or(Value::Nil)
}

/// Run `source` expecting a runtime error, returning its message
pub fn run_error(rt: &Runtime, source: &str) -> String {
    match rt.run(source) {
        Ok(values) => panic!("expected an error, got {:?}\n{}", values, source),
        Err(BridgeError::Runtime(message)) => message,
        Err(other) => panic!("expected a runtime error, got {:?}", other),
    }
}

pub fn expect_int(rt: &Runtime, source: &str, expected: i64) {
    match first(rt, source) {
        Value::Integer(v) => assert_eq!(v, expected, "{}", source),
        other => panic!("expected integer {}, got {:?}\n{}", expected, other, source),
    }
}

pub fn expect_number(rt: &Runtime, source: &str, expected: f64) {
    let actual = match first(rt, source) {
        Value::Number(v) => v,
        Value::Integer(v) => v as f64,
        other => panic!("expected number {}, got {:?}\n{}", expected, other, source),
    };
    assert!((actual - expected).abs() < 1e-9, "expected {}, got {}\n{}", expected, actual, source);
}

pub fn expect_bool(rt: &Runtime, source: &str, expected: bool) {
    assert_eq!(first(rt, source), Value::Boolean(expected), "{}", source);
}

pub fn expect_string(rt: &Runtime, source: &str, expected: &str) {
    let value = first(rt, source);
    match value.to_str() {
        Ok(actual) => assert_eq!(actual, expected, "{}", source),
        Err(_) => panic!("expected string {:?}, got {:?}\n{}", expected, value, source),
    }
}

pub fn expect_nil(rt: &Runtime, source: &str) {
    assert_eq!(first(rt, source), Value::Nil, "{}", source);
}

/// The error message must equal `expected` exactly
pub fn expect_error(rt: &Runtime, source: &str, expected: &str) {
    assert_eq!(run_error(rt, source), expected, "{}", source);
}

pub fn expect_error_contains(rt: &Runtime, source: &str, pattern: &str) {
    let message = run_error(rt, source);
    assert!(
        message.contains(pattern),
        "expected error containing {:?}, got {:?}\n{}",
        pattern,
        message,
        source
    );
}

/// The imported type reachable at `path`, e.g. `Geometry.Point`
pub fn host_type(rt: &Runtime, path: &str) -> HostTypeRef {
    let mut parts = path.split('.');
    let mut value = rt
        .get_global(parts.next().unwrap_or_default())
        .expect("global lookup failed");
    for part in parts {
        value = value
            .to_table()
            .and_then(|t| t.get_field(part))
            .expect("namespace lookup failed");
    }
    value.to_host_types().expect("not a type").primary().clone()
}
