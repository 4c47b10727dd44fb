//! Generic types and generic methods

use super::harness::*;

// ============================================================================
// Generic types
// ============================================================================

#[test]
fn test_non_generic_type_shares_the_name() {
    let rt = runtime();
    expect_string(&rt, "return Demo.Box():Kind()", "plain");
    expect_string(&rt, "return tostring(Demo.Box)", "type: Demo.Box");
}

#[test]
fn test_close_generic_type() {
    let rt = runtime();
    expect_string(&rt, "return tostring(Demo.Box(i32))", "type: Demo.Box<i32>");
}

#[test]
fn test_construct_closed_generic_type() {
    let rt = runtime();
    expect_int(&rt, "local IntBox = Demo.Box(i32) return IntBox(41):Get() + 1", 42);
    expect_string(&rt, "return Demo.Box(i64)(1):Kind()", "generic");
}

#[test]
fn test_closed_generic_type_converts_arguments() {
    let rt = runtime();
    expect_error(
        &rt,
        "return Demo.Box(i32)('x')",
        "no overload of `Demo.Box<i32>` accepts (string)",
    );
}

#[test]
fn test_closing_twice_yields_the_same_type() {
    let rt = runtime();
    expect_bool(&rt, "return Demo.Box(i32) == Demo.Box(i32)", true);
}

#[test]
fn test_generic_constraint_violation() {
    let rt = runtime();
    expect_error_contains(
        &rt,
        "return Demo.Box(string)",
        "type argument `string` violates constraint `struct` on `T`",
    );
}

// ============================================================================
// Generic methods
// ============================================================================

#[test]
fn test_generic_method_with_explicit_type_arguments() {
    let rt = runtime();
    expect_string(&rt, "return Demo.Factory.Make(i32)()", "i32");
    expect_string(&rt, "return Demo.Factory.Make(Demo.Counter)()", "Demo.Counter");
}

#[test]
fn test_generic_method_needs_type_arguments() {
    let rt = runtime();
    expect_error(
        &rt,
        "return Demo.Factory.Make()",
        "`Demo.Factory.Make` is generic and needs explicit type arguments",
    );
}

#[test]
fn test_generic_method_wrong_arity() {
    let rt = runtime();
    expect_error(
        &rt,
        "return Demo.Factory.Make(i32, string)",
        "no generic overload of `Demo.Factory.Make` takes 2 type arguments",
    );
}

#[test]
fn test_generic_method_constraint() {
    let rt = runtime();
    expect_string(&rt, "return Demo.Factory.MakeRef(string)()", "string");
    expect_error_contains(
        &rt,
        "return Demo.Factory.MakeRef(i32)",
        "type argument `i32` violates constraint `class` on `T` of `Demo.Factory.MakeRef`",
    );
}

#[test]
fn test_generic_method_parameter_types_follow_arguments() {
    let rt = runtime();
    expect_int(&rt, "return Demo.Factory.Pick(i64)(5)", 5);
    expect_string(&rt, "return Demo.Factory.Pick(string)('s')", "s");
    expect_error(
        &rt,
        "return Demo.Factory.Pick(i64)('s')",
        "no overload of `Demo.Factory.Pick` accepts (string)",
    );
}
