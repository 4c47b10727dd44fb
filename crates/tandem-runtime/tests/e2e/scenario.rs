//! Whole-bridge scenarios mixing arrays, overloads and errors

use tandem_runtime::tandem_engine::{primitive, HostArray, HostObject, HostValue, Primitive, Value};

use super::fixtures::Counter;
use super::harness::*;

#[test]
fn test_integer_array_and_arity_overloads() {
    let rt = runtime();
    let items = vec![HostValue::I32(10), HostValue::I32(20), HostValue::I32(30)];
    let array = HostObject::array(&primitive(Primitive::I32), items);
    rt.set_global_object("arr", array.clone()).unwrap();
    rt.set_global_object("counter", HostObject::new(&host_type(&rt, "Demo.Counter"), Counter::default()))
        .unwrap();

    expect_int(&rt, "return arr[0]", 10);

    expect_error(
        &rt,
        "arr[-1] = 1",
        "index -1 is out of bounds for `i32[]` of length 3",
    );

    expect_error(
        &rt,
        "arr[1] = 'x'",
        "cannot convert string to i32 for `i32[][1]`",
    );
    let items = array.with(|a: &HostArray| a.items.clone()).unwrap();
    assert_eq!(items[1], HostValue::I32(20));

    expect_int(&rt, "return counter:Add(4, 5)", 9);
}

#[test]
fn test_failed_write_leaves_target_unmodified() {
    let rt = runtime();
    run(&rt, "c = Demo.Counter('kept')");
    expect_error(
        &rt,
        "c.Label = {}",
        "cannot convert table to string for `Demo.Counter.Label`",
    );
    expect_string(&rt, "return c.Label", "kept");
}

#[test]
fn test_script_drives_host_objects_through_callbacks() {
    let rt = runtime();
    let results = run(
        &rt,
        r#"
        local log = {}
        local grid = Demo.Grid(3)
        local counter = Demo.Counter('cells')
        counter.Changed:Add(function(n) grid[n - 1] = n * 10 log[#log + 1] = n end)
        for _ = 1, 3 do counter:Increment() end
        return grid[0] + grid[1] + grid[2], #log, counter:Describe()
        "#,
    );
    assert_eq!(
        results,
        vec![Value::from(60), Value::from(3), Value::from("count=3")]
    );
}

#[test]
fn test_primitive_values_round_trip_through_host_members() {
    let rt = runtime();
    for source in ["return Demo.Formatter.Echo(true)", "return Demo.Formatter.Echo('text')"] {
        let direct = first(&rt, &source.replace("Demo.Formatter.Echo", ""));
        assert_eq!(first(&rt, source), direct, "{}", source);
    }
    expect_int(&rt, "return Demo.Formatter.Echo(9007199254740993)", 9007199254740993);
}
