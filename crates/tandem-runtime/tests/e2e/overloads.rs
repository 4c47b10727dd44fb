//! Overload selection and argument conversion

use super::harness::*;

// ============================================================================
// Selection by type
// ============================================================================

#[test]
fn test_integer_prefers_i64_overload() {
    let rt = runtime();
    expect_string(&rt, "return Demo.Formatter.Show(3)", "int:3");
}

#[test]
fn test_float_selects_f64_overload() {
    let rt = runtime();
    expect_string(&rt, "return Demo.Formatter.Show(2.5)", "float:2.5");
}

#[test]
fn test_string_selects_string_overload() {
    let rt = runtime();
    expect_string(&rt, "return Demo.Formatter.Show('x')", "string:x");
}

#[test]
fn test_nil_selects_reference_overload() {
    let rt = runtime();
    expect_string(&rt, "return Demo.Formatter.Show(nil)", "string:null");
}

#[test]
fn test_equal_cost_overloads_are_ambiguous() {
    let rt = runtime();
    expect_error(
        &rt,
        "return Demo.Formatter.Mix(1)",
        "ambiguous call to `Demo.Formatter.Mix` with (integer)",
    );
}

#[test]
fn test_no_overload_accepts() {
    let rt = runtime();
    expect_error(
        &rt,
        "return Demo.Formatter.Show({})",
        "no overload of `Demo.Formatter.Show` accepts (table)",
    );
}

// ============================================================================
// Selection by arity
// ============================================================================

#[test]
fn test_overload_by_argument_count() {
    let rt = runtime();
    expect_int(&rt, "local c = Demo.Counter() return c:Add(1)", 1);
    expect_int(&rt, "local c = Demo.Counter() return c:Add(1, 2)", 3);
}

#[test]
fn test_too_many_arguments() {
    let rt = runtime();
    expect_error(
        &rt,
        "return Demo.Counter():Add(1, 2, 3)",
        "no overload of `Demo.Counter.Add` accepts (integer, integer, integer)",
    );
}

#[test]
fn test_default_argument() {
    let rt = runtime();
    expect_string(&rt, "return Demo.Formatter.Greet('ann')", "hello, ann");
    expect_string(&rt, "return Demo.Formatter.Greet('ann', 'hi')", "hi, ann");
}

#[test]
fn test_default_argument_on_instance_method() {
    let rt = runtime();
    expect_string(&rt, "local c = Demo.Counter() c:Add(4) return c:Describe()", "count=4");
    expect_string(&rt, "local c = Demo.Counter() return c:Describe('n')", "n=0");
}

#[test]
fn test_variadic_parameters() {
    let rt = runtime();
    expect_string(&rt, "return Demo.Formatter.Join(', ', 'a', 'b', 'c')", "a, b, c");
    expect_string(&rt, "return Demo.Formatter.Join('-')", "");
    expect_int(&rt, "return Demo.Counter.Sum()", 0);
    expect_int(&rt, "return Demo.Counter.Sum(4, 5)", 9);
}

#[test]
fn test_variadic_parameter_rejects_wrong_element() {
    let rt = runtime();
    expect_error(
        &rt,
        "return Demo.Counter.Sum(1, 'x')",
        "no overload of `Demo.Counter.Sum` accepts (integer, string)",
    );
}

// ============================================================================
// Conversions
// ============================================================================

#[test]
fn test_integral_float_converts_to_integer() {
    let rt = runtime();
    expect_int(&rt, "return Demo.Formatter.Narrow(3.0)", 3);
}

#[test]
fn test_fractional_float_does_not_convert_to_integer() {
    let rt = runtime();
    expect_error(
        &rt,
        "return Demo.Formatter.Narrow(2.5)",
        "no overload of `Demo.Formatter.Narrow` accepts (number)",
    );
}

#[test]
fn test_out_of_range_integer() {
    let rt = runtime();
    expect_int(&rt, "return Demo.Formatter.Narrow(-128)", -128);
    expect_error(
        &rt,
        "return Demo.Formatter.Narrow(300)",
        "no overload of `Demo.Formatter.Narrow` accepts (integer)",
    );
}

#[test]
fn test_large_unsigned_results() {
    let rt = runtime();
    expect_number(&rt, "return Demo.Formatter.HighBit()", 9_223_372_036_854_775_808.0);
    expect_error_contains(&rt, "return Demo.Formatter.Largest()", "u64 value 18446744073709551615");
}

#[test]
fn test_char_parameter() {
    let rt = runtime();
    expect_int(&rt, "return Demo.Formatter.Code('A')", 65);
    expect_int(&rt, "return Demo.Formatter.Code(66)", 66);
    expect_error(
        &rt,
        "return Demo.Formatter.Code('AB')",
        "no overload of `Demo.Formatter.Code` accepts (string)",
    );
}

#[test]
fn test_enum_parameter() {
    let rt = runtime();
    expect_int(&rt, "return Demo.Palette.Code(Demo.Color.Blue)", 4);
    expect_int(&rt, "return Demo.Palette.Code('Green')", 2);
    expect_error(
        &rt,
        "return Demo.Palette.Code('Purple')",
        "no overload of `Demo.Palette.Code` accepts (string)",
    );
}

#[test]
fn test_enum_values_and_results_are_integers() {
    let rt = runtime();
    expect_int(&rt, "return Demo.Color.Red", 1);
    expect_int(&rt, "return Demo.Palette.Favorite()", 2);
    expect_error(
        &rt,
        "Demo.Color.Red = 3",
        "attempt to set constant `Demo.Color.Red`",
    );
}

#[test]
fn test_object_parameter_keeps_values() {
    let rt = runtime();
    expect_int(&rt, "return Demo.Formatter.Echo(7)", 7);
    expect_number(&rt, "return Demo.Formatter.Echo(1.5)", 1.5);
    expect_nil(&rt, "return Demo.Formatter.Echo(nil)");
    expect_bool(&rt, "local t = {} return rawequal(Demo.Formatter.Echo(t), t)", true);
    expect_bool(&rt, "local c = Demo.Counter() return rawequal(Demo.Formatter.Echo(c), c)", true);
}

#[test]
fn test_value_parameter_sees_script_values() {
    let rt = runtime();
    expect_string(&rt, "return Demo.Formatter.Kind({})", "table");
    expect_string(&rt, "return Demo.Formatter.Kind(print)", "function");
    expect_string(&rt, "return Demo.Formatter.Kind(1)", "integer");
    expect_string(&rt, "return Demo.Formatter.Kind(Demo.Counter())", "host object");
}
