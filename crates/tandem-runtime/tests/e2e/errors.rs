//! Host exceptions, panics and construction errors

use tandem_runtime::tandem_engine::Value;

use super::harness::*;

// ============================================================================
// Host exceptions
// ============================================================================

#[test]
fn test_host_exception_becomes_script_error() {
    let rt = runtime();
    expect_error(
        &rt,
        "Demo.Counter():Fail()",
        "uncaught host exception: InvalidOperationException: counter is sealed",
    );
}

#[test]
fn test_host_exception_is_catchable() {
    let rt = runtime();
    let results = run(&rt, "return pcall(function() Demo.Counter():Fail() end)");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0], Value::Boolean(false));
    assert_eq!(
        results[1].to_str().unwrap(),
        "uncaught host exception: InvalidOperationException: counter is sealed"
    );
}

#[test]
fn test_panic_becomes_script_error() {
    let rt = runtime();
    expect_error(
        &rt,
        "Demo.Counter():Explode()",
        "uncaught host exception: panic: boom",
    );
}

#[test]
fn test_runtime_survives_panics() {
    let rt = runtime();
    expect_bool(&rt, "return (pcall(function() Demo.Counter():Explode() end))", false);
    expect_int(&rt, "return Demo.Counter():Add(2)", 2);
}

#[test]
fn test_dispatch_errors_are_catchable() {
    let rt = runtime();
    expect_string(
        &rt,
        "local ok, err = pcall(function() return Demo.Counter().Missing end) return err",
        "attempt to get invalid member `Demo.Counter.Missing`",
    );
}

#[test]
fn test_script_error_position() {
    let rt = runtime();
    let err = rt.eval("\n\nerror('bad')", "setup").unwrap_err();
    assert_eq!(err, BridgeError::Runtime("setup:3: bad".to_string()));
}

#[test]
fn test_syntax_error_is_load_error() {
    let rt = runtime();
    match rt.eval("return +", "broken") {
        Err(BridgeError::Load { chunk, line, .. }) => {
            assert_eq!(chunk, "broken");
            assert_eq!(line, 1);
        }
        other => panic!("expected a load error, got {:?}", other),
    }
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_cannot_construct_interface() {
    let rt = runtime();
    expect_error(&rt, "return Demo.INamed()", "cannot construct interface `Demo.INamed`");
}

#[test]
fn test_cannot_construct_abstract_type() {
    let rt = runtime();
    expect_error(&rt, "return Demo.Shape()", "cannot construct abstract type `Demo.Shape`");
}

#[test]
fn test_cannot_construct_enum() {
    let rt = runtime();
    expect_error(&rt, "return Demo.Color()", "cannot construct enum `Demo.Color`");
}

#[test]
fn test_cannot_construct_primitive() {
    let rt = runtime();
    expect_error(&rt, "return i32()", "cannot construct built-in type `i32`");
}

#[test]
fn test_type_without_constructor() {
    let rt = runtime();
    expect_error(&rt, "return Demo.Formatter()", "`Demo.Formatter` has no public constructor");
}

#[test]
fn test_constructor_overloads() {
    let rt = runtime();
    expect_string(&rt, "return Demo.Counter('x').Label", "x");
    expect_string(&rt, "return Demo.Counter().Label", "");
    expect_error(
        &rt,
        "return Demo.Counter(1, 2)",
        "no overload of `Demo.Counter` accepts (integer, integer)",
    );
}

// ============================================================================
// Stale and foreign receivers
// ============================================================================

#[test]
fn test_adapter_rejects_foreign_receiver() {
    let rt = runtime();
    expect_error(
        &rt,
        "local c = Demo.Counter() local get = getmetatable(c).__index return get({}, 'Count')",
        "expected `Demo.Counter` instance, got table",
    );
}
