//! Environment lifecycle, handles, anchors and configuration

use tandem_runtime::tandem_engine::{BridgeConfig, HostObject, TextEncoding, ThreadStatus, Value};
use tandem_runtime::Runtime;

use super::fixtures::Counter;
use super::harness::*;

// ============================================================================
// Globals and handles
// ============================================================================

#[test]
fn test_globals_round_trip() {
    let rt = runtime();
    rt.set_global("limit", &Value::from(10)).unwrap();
    expect_int(&rt, "return limit * 2", 20);
    run(&rt, "answer = 'yes'");
    assert_eq!(rt.get_global("answer").unwrap(), Value::from_string("yes"));
    assert_eq!(rt.get_global("nothing").unwrap(), Value::Nil);
}

#[test]
fn test_table_handle() {
    let rt = runtime();
    let table = rt.create_table().unwrap();
    table.set_field("x", &Value::from(1)).unwrap();
    table.set(&Value::from(1), &Value::from("first")).unwrap();
    rt.set_global("t", &table.value()).unwrap();

    expect_int(&rt, "return t.x", 1);
    expect_string(&rt, "return t[1]", "first");
    assert_eq!(table.len().unwrap(), 1);
    assert_eq!(table.pairs().unwrap().len(), 2);
}

#[test]
fn test_function_handle() {
    let rt = runtime();
    let f = first(&rt, "return function(a, b) return a + b, a * b end")
        .to_function()
        .unwrap();
    let results = f.call(&[Value::from(3), Value::from(4)]).unwrap();
    assert_eq!(results, vec![Value::from(7), Value::from(12)]);
}

#[test]
fn test_function_handle_errors() {
    let rt = runtime();
    let f = first(&rt, "return function() error('nope', 0) end").to_function().unwrap();
    assert_eq!(f.call(&[]).unwrap_err(), BridgeError::Runtime("nope".to_string()));
}

#[test]
fn test_thread_handle_runs_once() {
    let rt = runtime();
    let f = first(&rt, "return function(a) return a * 2, 'done' end")
        .to_function()
        .unwrap();
    let thread = rt.create_thread(&f).unwrap();
    assert_eq!(thread.status().unwrap(), ThreadStatus::Suspended);

    let results = thread.resume(&[Value::from(21)]).unwrap();
    assert_eq!(results, vec![Value::from(42), Value::from("done")]);
    assert_eq!(thread.status().unwrap(), ThreadStatus::Dead);
    assert_eq!(
        thread.resume(&[]).unwrap_err(),
        BridgeError::Runtime("cannot resume dead coroutine".to_string())
    );
}

#[test]
fn test_values_from_another_environment_are_rejected() {
    let a = runtime();
    let b = runtime();
    let table = a.create_table().unwrap();
    let err = b.set_global("t", &table.value()).unwrap_err();
    assert_eq!(err, BridgeError::Argument("table belongs to a different environment".to_string()));
}

#[test]
fn test_host_objects_cross_environments() {
    let a = runtime();
    let b = runtime();
    let counter = HostObject::new(&host_type(&a, "Demo.Counter"), Counter::default());
    a.set_global_object("c", counter.clone()).unwrap();
    b.set_global_object("c", counter.clone()).unwrap();
    run(&a, "c:Add(1)");
    run(&b, "c:Add(2)");
    assert_eq!(counter.with(|c: &Counter| c.count), Some(3));
}

// ============================================================================
// Disposal
// ============================================================================

#[test]
fn test_disposed_environment_rejects_calls() {
    let rt = runtime();
    let table = rt.create_table().unwrap();
    let f = first(&rt, "return function() return 1 end").to_function().unwrap();
    let thread = rt.create_thread(&f).unwrap();
    rt.dispose();

    assert!(rt.is_disposed());
    assert_eq!(rt.run("return 1").unwrap_err(), BridgeError::Disposed);
    assert_eq!(rt.get_global("x").unwrap_err(), BridgeError::Disposed);
    assert_eq!(table.get_field("x").unwrap_err(), BridgeError::Disposed);
    assert_eq!(f.call(&[]).unwrap_err(), BridgeError::Disposed);
    assert_eq!(thread.resume(&[]).unwrap_err(), BridgeError::Disposed);
    assert_eq!(thread.status().unwrap_err(), BridgeError::Disposed);
    assert_eq!(rt.create_thread(&f).unwrap_err(), BridgeError::Disposed);
}

#[test]
fn test_thread_handle_outlives_the_environment() {
    let thread = {
        let rt = runtime();
        let f = first(&rt, "return function() return 1 end").to_function().unwrap();
        rt.create_thread(&f).unwrap()
    };
    assert_eq!(thread.status().unwrap_err(), BridgeError::Disposed);
    assert_eq!(thread.resume(&[Value::from(1)]).unwrap_err(), BridgeError::Disposed);
}

#[test]
fn test_handles_outlive_the_environment() {
    let table = {
        let rt = runtime();
        rt.create_table().unwrap()
    };
    assert_eq!(table.len().unwrap_err(), BridgeError::Disposed);
    drop(table);
}

#[test]
fn test_dispose_twice() {
    let rt = runtime();
    rt.dispose();
    rt.dispose();
    assert!(rt.is_disposed());
}

// ============================================================================
// Anchors
// ============================================================================

#[test]
fn test_same_object_is_anchored_once() {
    let rt = runtime();
    let counter = HostObject::new(&host_type(&rt, "Demo.Counter"), Counter::default());
    let before = rt.anchored_count();
    rt.set_global_object("a", counter.clone()).unwrap();
    rt.set_global_object("b", counter.clone()).unwrap();
    assert_eq!(rt.anchored_count(), before + 1);
    expect_bool(&rt, "return rawequal(a, b)", true);
}

#[test]
fn test_release_drops_the_anchor() {
    let rt = runtime();
    let counter = HostObject::new(&host_type(&rt, "Demo.Counter"), Counter::default());
    rt.set_global_object("c", counter.clone()).unwrap();
    let before = rt.anchored_count();

    assert!(rt.release(&Value::from(counter.clone())).unwrap());
    assert_eq!(rt.anchored_count(), before - 1);
    assert!(!rt.release(&Value::from(counter.clone())).unwrap());
    expect_error(&rt, "return c.Count", "expected `Demo.Counter` instance, got userdata");
}

#[test]
fn test_dropped_objects_are_unanchored() {
    let rt = runtime();
    let before = rt.anchored_count();
    run(&rt, "for i = 1, 1000 do local p = Geometry.Point(i, i) end");
    let after_first = rt.anchored_count();
    run(&rt, "for i = 1, 1000 do local p = Geometry.Point(i, i) end");
    assert_eq!(rt.anchored_count(), after_first);
    assert!(after_first <= before + 1, "{} anchors after one loop, {} before", after_first, before);
}

#[test]
fn test_dropped_object_is_anchored_afresh() {
    let rt = runtime();
    let counter = HostObject::new(&host_type(&rt, "Demo.Counter"), Counter::default());
    let before = rt.anchored_count();
    rt.set_global_object("c", counter.clone()).unwrap();
    assert_eq!(rt.anchored_count(), before + 1);

    run(&rt, "c = nil");
    assert_eq!(rt.anchored_count(), before);

    rt.set_global_object("c", counter.clone()).unwrap();
    run(&rt, "c:Add(5)");
    assert_eq!(counter.with(|c: &Counter| c.count), Some(5));
}

#[test]
fn test_live_object_keeps_its_identity() {
    let rt = runtime();
    let counter = HostObject::new(&host_type(&rt, "Demo.Counter"), Counter::default());
    rt.set_global_object("a", counter.clone()).unwrap();
    run(&rt, "for i = 1, 100 do local p = Geometry.Point(i, i) end");
    rt.set_global_object("b", counter).unwrap();
    expect_bool(&rt, "return rawequal(a, b)", true);
}

#[test]
fn test_release_ignores_plain_values() {
    let rt = runtime();
    assert!(!rt.release(&Value::from(1)).unwrap());
}

#[test]
fn test_released_object_can_be_pushed_again() {
    let rt = runtime();
    let counter = HostObject::new(&host_type(&rt, "Demo.Counter"), Counter::default());
    rt.set_global_object("c", counter.clone()).unwrap();
    rt.release(&Value::from(counter.clone())).unwrap();
    rt.set_global_object("c", counter).unwrap();
    expect_int(&rt, "return c:Add(4)", 4);
}

// ============================================================================
// Adapter cache
// ============================================================================

#[test]
fn test_adapters_are_cached_per_type() {
    let rt = runtime();
    run(&rt, "local c = Demo.Counter() local _ = c.Count");
    let after_first = rt.adapter_count();
    run(&rt, "local c = Demo.Counter() local d = Demo.Counter() local _ = c.Count + d.Count");
    assert_eq!(rt.adapter_count(), after_first);

    run(&rt, "local g = Demo.Grid(1)");
    assert!(rt.adapter_count() > after_first);
}

// ============================================================================
// Imports
// ============================================================================

#[test]
fn test_import_type_merges_same_name() {
    let rt = Runtime::new().unwrap();
    rt.import_type(&super::fixtures::box_type()).unwrap();
    rt.import_type(&super::fixtures::generic_box_type()).unwrap();
    rt.import_type(&tandem_runtime::tandem_engine::primitive(
        tandem_runtime::tandem_engine::Primitive::I32,
    ))
    .unwrap();

    expect_string(&rt, "return Box():Kind()", "plain");
    expect_string(&rt, "return Box(i32)(1):Kind()", "generic");
}

#[test]
fn test_import_type_refuses_to_shadow_values() {
    let rt = Runtime::new().unwrap();
    rt.set_global("Box", &Value::from(5)).unwrap();
    let err = rt.import_type(&super::fixtures::box_type()).unwrap_err();
    assert!(matches!(err, BridgeError::Argument(ref m) if m.contains("already bound")), "{:?}", err);
}

#[test]
fn test_import_assembly_refuses_namespace_clash() {
    let rt = Runtime::new().unwrap();
    rt.set_global("Demo", &Value::from(1)).unwrap();
    let err = rt.import_assembly(&super::fixtures::demo_assembly()).unwrap_err();
    assert!(matches!(err, BridgeError::Argument(_)), "{:?}", err);
}

#[test]
fn test_assembly_namespaces_are_tables() {
    let rt = runtime();
    expect_string(&rt, "return type(Demo)", "table");
    expect_string(&rt, "return type(Demo.Counter)", "userdata");
    expect_string(&rt, "return tostring(Demo.Counter)", "type: Demo.Counter");
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_receiver_stripping_disabled() {
    let config = BridgeConfig {
        strip_receiver: false,
        ..BridgeConfig::default()
    };
    let rt = runtime_with(config);
    expect_int(&rt, "local c = Demo.Counter() return c.Add(2)", 2);
    expect_error(
        &rt,
        "local c = Demo.Counter() return c:Add(2)",
        "no overload of `Demo.Counter.Add` accepts (Demo.Counter, integer)",
    );
}

#[test]
fn test_latin1_encoding() {
    let config = BridgeConfig {
        encoding: TextEncoding::Latin1,
        ..BridgeConfig::default()
    };
    let rt = runtime_with(config);
    rt.set_global("s", &Value::from_bytes(&[b'c', 0xe9])).unwrap();
    let result = first(&rt, "return Demo.Formatter.Show(s)");
    assert_eq!(result.to_bytes().unwrap(), b"string:c\xe9");
}

#[test]
fn test_invalid_utf8_does_not_convert_to_string() {
    let rt = runtime();
    rt.set_global("s", &Value::from_bytes(&[b'c', 0xe9])).unwrap();
    expect_error(
        &rt,
        "return Demo.Formatter.Show(s)",
        "no overload of `Demo.Formatter.Show` accepts (string)",
    );
}

#[test]
fn test_default_chunk_name() {
    let config = BridgeConfig {
        default_chunk_name: "main".to_string(),
        ..BridgeConfig::default()
    };
    let rt = runtime_with(config);
    assert_eq!(rt.run("error('x')").unwrap_err(), BridgeError::Runtime("main:1: x".to_string()));
}
