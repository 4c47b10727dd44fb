//! Member resolution: fields, properties, methods, nested types, visibility

use super::harness::*;

// ============================================================================
// Fields
// ============================================================================

#[test]
fn test_constant_field() {
    let rt = runtime();
    expect_int(&rt, "return Demo.Counter.Max", 100);
}

#[test]
fn test_constant_field_rejects_writes() {
    let rt = runtime();
    expect_error(
        &rt,
        "Demo.Counter.Max = 5",
        "attempt to set constant `Demo.Counter.Max`",
    );
}

#[test]
fn test_static_field_round_trip() {
    let rt = runtime();
    expect_int(&rt, "Demo.Counter.Instances = 5 return Demo.Counter.Instances", 5);
}

#[test]
fn test_static_field_rejects_wrong_type() {
    let rt = runtime();
    expect_error(
        &rt,
        "Demo.Counter.Instances = 'many'",
        "cannot convert string to i32 for `Demo.Counter.Instances`",
    );
}

#[test]
fn test_read_only_field() {
    let rt = runtime();
    expect_int(&rt, "return Demo.Counter().Id", 7);
    expect_error(
        &rt,
        "Demo.Counter().Id = 8",
        "attempt to set read-only field `Demo.Counter.Id`",
    );
}

#[test]
fn test_instance_field_is_not_static() {
    let rt = runtime();
    expect_error(
        &rt,
        "return Demo.Counter.Id",
        "attempt to get invalid member `Demo.Counter.Id`",
    );
}

#[test]
fn test_struct_fields() {
    let rt = runtime();
    expect_number(&rt, "local p = Geometry.Point(3, 4) p.X = 6 return p.X + p.Y", 10.0);
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_property_getter() {
    let rt = runtime();
    expect_int(&rt, "local c = Demo.Counter() c:Increment() c:Increment() return c.Count", 2);
}

#[test]
fn test_property_setter() {
    let rt = runtime();
    expect_string(&rt, "local c = Demo.Counter('a') c.Label = 'b' return c.Label", "b");
}

#[test]
fn test_property_without_setter() {
    let rt = runtime();
    expect_error(
        &rt,
        "Demo.Counter().Count = 3",
        "attempt to set property without setter `Demo.Counter.Count`",
    );
}

#[test]
fn test_property_without_getter() {
    let rt = runtime();
    expect_error(
        &rt,
        "local c = Demo.Counter() c.Password = 'x' return c.Password",
        "attempt to get property without getter `Demo.Counter.Password`",
    );
}

#[test]
fn test_write_only_property_still_writes() {
    let rt = runtime();
    expect_bool(&rt, "local c = Demo.Counter() c.Password = 'x' return c.Checked", true);
}

#[test]
fn test_private_setter_is_not_writable() {
    let rt = runtime();
    expect_bool(&rt, "return Demo.Counter().Checked", false);
    expect_error(
        &rt,
        "Demo.Counter().Checked = true",
        "attempt to set property without setter `Demo.Counter.Checked`",
    );
}

// ============================================================================
// Methods
// ============================================================================

#[test]
fn test_method_colon_call() {
    let rt = runtime();
    expect_int(&rt, "local c = Demo.Counter() return c:Add(5)", 5);
}

#[test]
fn test_method_dot_call() {
    let rt = runtime();
    expect_int(&rt, "local c = Demo.Counter() return c.Add(5)", 5);
}

#[test]
fn test_bound_method_keeps_receiver() {
    let rt = runtime();
    expect_int(
        &rt,
        "local c = Demo.Counter() local add = c.Add add(2) add(3) return c.Count",
        5,
    );
}

#[test]
fn test_void_method_returns_nothing() {
    let rt = runtime();
    expect_int(&rt, "return select('#', Demo.Counter():Increment())", 0);
}

#[test]
fn test_method_returning_self_type_keeps_identity() {
    let rt = runtime();
    expect_bool(&rt, "local c = Demo.Counter() return rawequal(c:Identity(), c)", true);
}

#[test]
fn test_static_method_with_colon() {
    let rt = runtime();
    expect_int(&rt, "return Demo.Counter:Sum(1, 2, 3)", 6);
}

#[test]
fn test_methods_are_read_only() {
    let rt = runtime();
    expect_error(
        &rt,
        "Demo.Counter().Add = 1",
        "attempt to set method `Demo.Counter.Add`",
    );
}

#[test]
fn test_long_member_names() {
    let rt = runtime();
    expect_string(
        &rt,
        "return Demo.Counter():AVeryLongMethodNameThatDoesNotFitTheInternLimit()",
        "long",
    );
}

// ============================================================================
// Nested types, visibility, unknown members
// ============================================================================

#[test]
fn test_nested_type() {
    let rt = runtime();
    expect_int(&rt, "return Demo.Counter.Settings.Version", 3);
    expect_string(&rt, "return tostring(Demo.Counter.Settings)", "type: Demo.Settings");
}

#[test]
fn test_nested_type_is_read_only() {
    let rt = runtime();
    expect_error(
        &rt,
        "Demo.Counter.Settings = 1",
        "attempt to set nested type `Demo.Counter.Settings`",
    );
}

#[test]
fn test_private_method_is_invisible() {
    let rt = runtime();
    expect_error(
        &rt,
        "return Demo.Counter():Hidden()",
        "attempt to get invalid member `Demo.Counter.Hidden`",
    );
}

#[test]
fn test_unknown_member() {
    let rt = runtime();
    expect_error(
        &rt,
        "return Demo.Counter().Missing",
        "attempt to get invalid member `Demo.Counter.Missing`",
    );
    expect_error(
        &rt,
        "Demo.Counter().Missing = 1",
        "attempt to set invalid member `Demo.Counter.Missing`",
    );
}

#[test]
fn test_member_lookup_is_case_sensitive() {
    let rt = runtime();
    expect_error(
        &rt,
        "return Demo.Counter().count",
        "attempt to get invalid member `Demo.Counter.count`",
    );
}

// ============================================================================
// Inheritance and interfaces
// ============================================================================

#[test]
fn test_inherited_members() {
    let rt = runtime();
    expect_string(&rt, "return Demo.Circle(1):Kind()", "shape");
    expect_string(&rt, "return Demo.Circle(1).Name", "shape");
}

#[test]
fn test_derived_member_hides_base() {
    let rt = runtime();
    expect_number(&rt, "return Demo.Circle(2):Area()", std::f64::consts::PI * 4.0);
}

#[test]
fn test_derived_object_converts_to_base_parameter() {
    let rt = runtime();
    expect_string(&rt, "return Demo.Measure.TypeOf(Demo.Circle(1))", "Demo.Circle");
    expect_string(&rt, "return Demo.Measure.TypeOf(nil)", "null");
}

#[test]
fn test_unrelated_object_does_not_convert() {
    let rt = runtime();
    expect_error(
        &rt,
        "return Demo.Measure.TypeOf(Demo.Counter())",
        "no overload of `Demo.Measure.TypeOf` accepts (Demo.Counter)",
    );
}
