//! Value-type semantics, operators and host arrays

use tandem_runtime::tandem_engine::{primitive, HostArray, HostObject, HostObjectRef, HostValue, Primitive, Value};
use tandem_runtime::Runtime;

use super::fixtures::{Counter, Point};
use super::harness::*;

fn point_x(value: &HostValue) -> f64 {
    value
        .as_object()
        .and_then(|obj| obj.with(|p: &Point| p.x))
        .unwrap_or(f64::NAN)
}

// ============================================================================
// Structs
// ============================================================================

#[test]
fn test_struct_default_construction() {
    let rt = runtime();
    expect_number(&rt, "local p = Geometry.Point() return p.X + p.Y", 0.0);
}

#[test]
fn test_struct_display() {
    let rt = runtime();
    expect_string(&rt, "return tostring(Geometry.Point(1, 2))", "(1, 2)");
}

#[test]
fn test_struct_is_copied_into_the_runtime() {
    let rt = runtime();
    let point = HostObject::new(&host_type(&rt, "Geometry.Point"), Point { x: 1.0, y: 2.0 });
    rt.set_global_object("p", point.clone()).unwrap();

    run(&rt, "p.X = 5");
    expect_number(&rt, "return p.X", 5.0);
    assert_eq!(point.with(|p: &Point| p.x), Some(1.0));
}

#[test]
fn test_struct_is_copied_out_of_the_runtime() {
    let rt = runtime();
    run(&rt, "p = Geometry.Point(1, 2)");
    let copy = rt.get_global("p").unwrap().to_host_object().unwrap();
    copy.with_mut(|p: &mut Point| p.x = 40.0);
    expect_number(&rt, "return p.X", 1.0);
}

#[test]
fn test_struct_is_copied_into_host_parameters() {
    let rt = runtime();
    expect_number(
        &rt,
        "local p = Geometry.Point(1, 2) local q = Demo.Formatter.Echo(p) q.X = 9 return p.X",
        1.0,
    );
}

#[test]
fn test_class_is_shared() {
    let rt = runtime();
    let counter = HostObject::new(&host_type(&rt, "Demo.Counter"), Counter::default());
    rt.set_global_object("c", counter.clone()).unwrap();
    run(&rt, "c:Add(3)");
    assert_eq!(counter.with(|c: &Counter| c.count), Some(3));
}

// ============================================================================
// Operators
// ============================================================================

#[test]
fn test_add_operator() {
    let rt = runtime();
    expect_number(&rt, "return (Geometry.Point(1, 2) + Geometry.Point(3, 4)).Y", 6.0);
}

#[test]
fn test_unary_minus_operator() {
    let rt = runtime();
    expect_number(&rt, "return (-Geometry.Point(1, 2)).X", -1.0);
}

#[test]
fn test_equality_operator() {
    let rt = runtime();
    expect_bool(&rt, "return Geometry.Point(1, 2) == Geometry.Point(1, 2)", true);
    expect_bool(&rt, "return Geometry.Point(1, 2) == Geometry.Point(2, 1)", false);
}

#[test]
fn test_missing_operator() {
    let rt = runtime();
    expect_error_contains(&rt, "return Demo.Counter() + 1", "attempt to perform arithmetic on a userdata value");
}

#[test]
fn test_call_on_instance_without_operator() {
    let rt = runtime();
    expect_error(
        &rt,
        "local c = Demo.Counter() return c()",
        "attempt to call an instance of `Demo.Counter`",
    );
}

#[test]
fn test_operator_operand_conversion() {
    let rt = runtime();
    expect_error(
        &rt,
        "return Geometry.Point(1, 2) + 1",
        "no overload of `Geometry.Point.op_Addition` accepts (Geometry.Point, integer)",
    );
}

// ============================================================================
// Arrays
// ============================================================================

fn int_array(rt: &Runtime, name: &str, items: &[i32]) -> HostObjectRef {
    let items = items.iter().map(|&i| HostValue::I32(i)).collect();
    let array = HostObject::array(&primitive(Primitive::I32), items);
    rt.set_global_object(name, array.clone()).unwrap();
    array
}

#[test]
fn test_array_elements_are_zero_based() {
    let rt = runtime();
    int_array(&rt, "arr", &[10, 20, 30]);
    expect_int(&rt, "return arr[0]", 10);
    expect_int(&rt, "return arr[2]", 30);
}

#[test]
fn test_array_length() {
    let rt = runtime();
    int_array(&rt, "arr", &[10, 20, 30]);
    expect_int(&rt, "return #arr", 3);
    expect_int(&rt, "return arr.Length", 3);
    expect_int(&rt, "return arr.Rank", 1);
}

#[test]
fn test_array_write_reaches_host() {
    let rt = runtime();
    let array = int_array(&rt, "arr", &[10, 20, 30]);
    run(&rt, "arr[1] = 21");
    let items = array.with(|a: &HostArray| a.items.clone()).unwrap();
    assert_eq!(items[1], HostValue::I32(21));
}

#[test]
fn test_array_bounds() {
    let rt = runtime();
    int_array(&rt, "arr", &[10, 20, 30]);
    expect_error(
        &rt,
        "return arr[3]",
        "index 3 is out of bounds for `i32[]` of length 3",
    );
    expect_error(
        &rt,
        "arr[-1] = 1",
        "index -1 is out of bounds for `i32[]` of length 3",
    );
}

#[test]
fn test_array_element_conversion() {
    let rt = runtime();
    int_array(&rt, "arr", &[10, 20, 30]);
    expect_error(
        &rt,
        "arr[1] = 'x'",
        "cannot convert string to i32 for `i32[][1]`",
    );
}

#[test]
fn test_array_non_integer_index() {
    let rt = runtime();
    int_array(&rt, "arr", &[10, 20, 30]);
    expect_error(&rt, "return arr[0.5]", "cannot index `i32[]` with number");
}

#[test]
fn test_multidimensional_array() {
    let rt = runtime();
    let grid = HostObject::array_nd(&primitive(Primitive::I32), &[2, 3]);
    rt.set_global_object("m", grid.clone()).unwrap();

    run(&rt, "m:Set(1, 2, 5)");
    expect_int(&rt, "return m:Get(1, 2)", 5);
    expect_int(&rt, "return m:Get(0, 0)", 0);
    expect_int(&rt, "return #m", 6);
    expect_int(&rt, "return m.Rank", 2);

    let items = grid.with(|a: &HostArray| a.items.clone()).unwrap();
    assert_eq!(items[5], HostValue::I32(5));
}

#[test]
fn test_multidimensional_array_errors() {
    let rt = runtime();
    let grid = HostObject::array_nd(&primitive(Primitive::I32), &[2, 3]);
    rt.set_global_object("m", grid).unwrap();

    expect_error(&rt, "return m:Get(1)", "`i32[,].Get` expects 2 indices, got 1");
    expect_error(
        &rt,
        "return m:Get(2, 0)",
        "index [2, 0] is out of bounds for `i32[,]` of length 6",
    );
}

#[test]
fn test_struct_array_elements_alias() {
    let rt = runtime();
    let point_ty = host_type(&rt, "Geometry.Point");
    let points = vec![
        HostValue::Object(HostObject::new(&point_ty, Point { x: 1.0, y: 1.0 })),
        HostValue::Object(HostObject::new(&point_ty, Point { x: 2.0, y: 2.0 })),
    ];
    let array = HostObject::array(&point_ty, points);
    rt.set_global_object("points", array.clone()).unwrap();

    run(&rt, "points[0].X = 9");
    let first = array.with(|a: &HostArray| a.items[0].clone()).unwrap();
    assert_eq!(point_x(&first), 9.0);
}

#[test]
fn test_array_element_write_copies_struct() {
    let rt = runtime();
    let point_ty = host_type(&rt, "Geometry.Point");
    let array = HostObject::array(&point_ty, vec![HostValue::Object(HostObject::new(&point_ty, Point::default()))]);
    rt.set_global_object("points", array.clone()).unwrap();

    run(&rt, "local p = Geometry.Point(3, 3) points[0] = p p.X = 7");
    let first = array.with(|a: &HostArray| a.items[0].clone()).unwrap();
    assert_eq!(point_x(&first), 3.0);
}

// ============================================================================
// Host objects as bridge values
// ============================================================================

#[test]
fn test_host_object_global_round_trip() {
    let rt = runtime();
    let counter = HostObject::new(&host_type(&rt, "Demo.Counter"), Counter::default());
    rt.set_global("c", &Value::from(counter.clone())).unwrap();

    let back = rt.get_global("c").unwrap().to_host_object().unwrap();
    assert!(std::rc::Rc::ptr_eq(&back, &counter));
}
