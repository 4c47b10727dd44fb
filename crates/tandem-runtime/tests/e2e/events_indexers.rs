//! Events and indexers

use super::harness::*;

// ============================================================================
// Events
// ============================================================================

#[test]
fn test_event_handler_is_called() {
    let rt = runtime();
    expect_int(
        &rt,
        r#"
        local c = Demo.Counter()
        local seen = 0
        c.Changed:Add(function(n) seen = seen + n end)
        c:Increment()
        c:Increment()
        return seen
        "#,
        3,
    );
}

#[test]
fn test_event_add_with_dot_syntax() {
    let rt = runtime();
    expect_int(
        &rt,
        r#"
        local c = Demo.Counter()
        local last = 0
        c.Changed.Add(function(n) last = n end)
        c:Add(9)
        c:Increment()
        return last
        "#,
        10,
    );
}

#[test]
fn test_event_handler_removal() {
    let rt = runtime();
    expect_int(
        &rt,
        r#"
        local c = Demo.Counter()
        local calls = 0
        local function handler() calls = calls + 1 end
        c.Changed:Add(handler)
        c:Increment()
        c.Changed:Remove(handler)
        c:Increment()
        return calls
        "#,
        1,
    );
}

#[test]
fn test_event_rejects_non_functions() {
    let rt = runtime();
    expect_error(
        &rt,
        "Demo.Counter().Changed:Add(1)",
        "cannot convert integer to a handler for `Demo.Counter.Changed`",
    );
}

#[test]
fn test_event_is_read_only() {
    let rt = runtime();
    expect_error(
        &rt,
        "Demo.Counter().Changed = print",
        "attempt to set event `Demo.Counter.Changed`",
    );
}

#[test]
fn test_handler_errors_reach_the_caller() {
    let rt = runtime();
    let message = run_error(
        &rt,
        r#"
        local c = Demo.Counter()
        c.Changed:Add(function() error('handler failed', 0) end)
        c:Increment()
        "#,
    );
    assert_eq!(
        message,
        "uncaught host exception: ScriptError: handler failed"
    );
}

// ============================================================================
// Indexers
// ============================================================================

#[test]
fn test_integer_indexer() {
    let rt = runtime();
    expect_int(&rt, "local g = Demo.Grid(4) g[2] = 7 return g[2]", 7);
}

#[test]
fn test_indexer_accessor_table() {
    let rt = runtime();
    expect_int(&rt, "local g = Demo.Grid(4) g.Item:Set(1, 5) return g.Item:Get(1)", 5);
    expect_int(&rt, "local g = Demo.Grid(4) g.Item.Set(3, 6) return g.Item.Get(3)", 6);
}

#[test]
fn test_members_win_over_indexer() {
    let rt = runtime();
    expect_int(&rt, "return Demo.Grid(4).Size", 4);
}

#[test]
fn test_indexer_host_exception() {
    let rt = runtime();
    expect_error(
        &rt,
        "return Demo.Grid(2)[5]",
        "uncaught host exception: ArgumentException: cell 5 is outside the grid",
    );
}

#[test]
fn test_indexer_key_conversion() {
    let rt = runtime();
    expect_error(
        &rt,
        "return Demo.Grid(2)[true]",
        "no overload of `Demo.Grid.Item` accepts (boolean)",
    );
}

#[test]
fn test_string_keyed_indexer_catches_unknown_names() {
    let rt = runtime();
    expect_string(&rt, "return Demo.Catalog().apple", "item:apple");
    expect_string(&rt, "return Demo.Catalog()['pear']", "item:pear");
}

#[test]
fn test_indexer_without_setter() {
    let rt = runtime();
    expect_error(
        &rt,
        "Demo.Catalog().apple = 1",
        "attempt to set indexer without setter `Demo.Catalog.Item`",
    );
}

#[test]
fn test_unmatched_string_key_on_integer_indexer() {
    let rt = runtime();
    expect_error(
        &rt,
        "return Demo.Grid(2).nothing",
        "attempt to get invalid member `Demo.Grid.nothing`",
    );
}

#[test]
fn test_indexer_member_is_read_only() {
    let rt = runtime();
    expect_error(
        &rt,
        "Demo.Grid(2).Item = 1",
        "attempt to set indexer `Demo.Grid.Item`",
    );
}
