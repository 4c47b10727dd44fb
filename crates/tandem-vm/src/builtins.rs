//! Base library

use std::rc::Rc;

use tandem_sdk::{ScriptError, ScriptResult};

use crate::interp::{exact_integer, parse_number};
use crate::state::Vm;
use crate::value::{BuiltinFn, Function, ScriptValue};

type Results = ScriptResult<Vec<ScriptValue>>;

const BASE_LIBRARY: &[(&str, BuiltinFn)] = &[
    ("assert", base_assert),
    ("error", base_error),
    ("getmetatable", base_getmetatable),
    ("ipairs", base_ipairs),
    ("next", base_next),
    ("pairs", base_pairs),
    ("pcall", base_pcall),
    ("print", base_print),
    ("rawequal", base_rawequal),
    ("rawget", base_rawget),
    ("rawlen", base_rawlen),
    ("rawset", base_rawset),
    ("select", base_select),
    ("setmetatable", base_setmetatable),
    ("tonumber", base_tonumber),
    ("tostring", base_tostring),
    ("type", base_type),
];

/// Register the base library in the globals table
pub fn open_base(vm: &mut Vm) {
    for (name, function) in BASE_LIBRARY {
        vm.set_global_value(name, builtin(*name, *function));
    }
    let globals = ScriptValue::Table(vm.globals());
    vm.set_global_value("_G", globals);
    let version = vm.new_string(b"Tandem 5.4");
    vm.set_global_value("_VERSION", version);
}

fn builtin(name: &'static str, function: BuiltinFn) -> ScriptValue {
    ScriptValue::Function(Rc::new(Function::Builtin(name, function)))
}

// ============================================================================
// Argument helpers
// ============================================================================

fn arg(args: &[ScriptValue], n: usize) -> ScriptValue {
    args.get(n).cloned().unwrap_or_default()
}

fn arg_error(n: usize, function: &str, message: impl AsRef<str>) -> ScriptError {
    ScriptError::runtime(format!("bad argument #{} to '{}' ({})", n + 1, function, message.as_ref()))
}

fn type_error(args: &[ScriptValue], n: usize, function: &str, expected: &str) -> ScriptError {
    let got = args.get(n).map(|v| v.type_name()).unwrap_or("no value");
    arg_error(n, function, format!("{} expected, got {}", expected, got))
}

fn check_any(args: &[ScriptValue], n: usize, function: &str) -> ScriptResult<ScriptValue> {
    args.get(n)
        .cloned()
        .ok_or_else(|| arg_error(n, function, "value expected"))
}

fn check_table(args: &[ScriptValue], n: usize, function: &str) -> ScriptResult<ScriptValue> {
    match args.get(n) {
        Some(value @ ScriptValue::Table(_)) => Ok(value.clone()),
        _ => Err(type_error(args, n, function, "table")),
    }
}

// ============================================================================
// Functions
// ============================================================================

fn base_print(vm: &mut Vm, args: Vec<ScriptValue>) -> Results {
    let mut line = Vec::new();
    for (i, value) in args.iter().enumerate() {
        if i > 0 {
            line.push(b'\t');
        }
        line.extend(vm.tostring(value)?);
    }
    println!("{}", String::from_utf8_lossy(&line));
    Ok(Vec::new())
}

fn base_type(vm: &mut Vm, args: Vec<ScriptValue>) -> Results {
    let value = check_any(&args, 0, "type")?;
    Ok(vec![vm.new_string(value.type_name().as_bytes())])
}

fn base_tostring(vm: &mut Vm, args: Vec<ScriptValue>) -> Results {
    let value = check_any(&args, 0, "tostring")?;
    let bytes = vm.tostring(&value)?;
    Ok(vec![vm.new_string(&bytes)])
}

fn base_tonumber(_vm: &mut Vm, args: Vec<ScriptValue>) -> Results {
    let value = check_any(&args, 0, "tonumber")?;
    let base = arg(&args, 1);
    if base.is_nil() {
        let result = match &value {
            ScriptValue::Integer(_) | ScriptValue::Number(_) => value.clone(),
            ScriptValue::String(s) => parse_number(s).unwrap_or_default(),
            _ => ScriptValue::Nil,
        };
        return Ok(vec![result]);
    }

    let radix = exact_integer(&base).ok_or_else(|| type_error(&args, 1, "tonumber", "number"))?;
    if !(2..=36).contains(&radix) {
        return Err(arg_error(1, "tonumber", "base out of range"));
    }
    let text = match &value {
        ScriptValue::String(s) => String::from_utf8_lossy(s).trim().to_lowercase(),
        _ => return Err(type_error(&args, 0, "tonumber", "string")),
    };
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.to_string()),
        None => (false, text),
    };
    if digits.is_empty() {
        return Ok(vec![ScriptValue::Nil]);
    }
    let mut result = 0i64;
    for c in digits.chars() {
        match c.to_digit(radix as u32) {
            Some(d) => result = result.wrapping_mul(radix).wrapping_add(d as i64),
            None => return Ok(vec![ScriptValue::Nil]),
        }
    }
    Ok(vec![ScriptValue::Integer(if negative { result.wrapping_neg() } else { result })])
}

fn base_error(vm: &mut Vm, args: Vec<ScriptValue>) -> Results {
    let value = arg(&args, 0);
    let level = exact_integer(&arg(&args, 1)).unwrap_or(1);
    let message = match &value {
        ScriptValue::String(s) => {
            let text = String::from_utf8_lossy(s).into_owned();
            if level > 0 {
                format!("{}:{}: {}", vm.chunk, vm.line, text)
            } else {
                text
            }
        }
        ScriptValue::Nil => "nil".to_string(),
        ScriptValue::Integer(_) | ScriptValue::Number(_) => crate::interp::format_value(&value),
        other => format!("({} error object is not a string)", other.type_name()),
    };
    Err(ScriptError::runtime(message))
}

fn base_assert(vm: &mut Vm, args: Vec<ScriptValue>) -> Results {
    let value = check_any(&args, 0, "assert")?;
    if value.is_truthy() {
        return Ok(args);
    }
    match arg(&args, 1) {
        ScriptValue::Nil => Err(ScriptError::runtime("assertion failed!")),
        message => {
            let bytes = vm.tostring(&message)?;
            Err(ScriptError::runtime(String::from_utf8_lossy(&bytes).into_owned()))
        }
    }
}

fn base_pcall(vm: &mut Vm, mut args: Vec<ScriptValue>) -> Results {
    let function = check_any(&args, 0, "pcall")?;
    args.remove(0);
    match vm.call_value(function, args) {
        Ok(mut results) => {
            results.insert(0, ScriptValue::Boolean(true));
            Ok(results)
        }
        Err(err) => {
            let message = vm.new_string(err.to_string().as_bytes());
            Ok(vec![ScriptValue::Boolean(false), message])
        }
    }
}

fn base_select(_vm: &mut Vm, args: Vec<ScriptValue>) -> Results {
    let selector = arg(&args, 0);
    let rest = args.len().saturating_sub(1);
    if let ScriptValue::String(s) = &selector {
        if &s[..] == b"#" {
            return Ok(vec![ScriptValue::Integer(rest as i64)]);
        }
    }
    let n = exact_integer(&selector).ok_or_else(|| type_error(&args, 0, "select", "number"))?;
    let start = if n < 0 {
        let from_end = rest as i64 + n;
        if from_end < 0 {
            return Err(arg_error(0, "select", "index out of range"));
        }
        from_end as usize + 1
    } else if n == 0 {
        return Err(arg_error(0, "select", "index out of range"));
    } else {
        n as usize
    };
    Ok(args.into_iter().skip(start).collect())
}

fn base_next(_vm: &mut Vm, args: Vec<ScriptValue>) -> Results {
    let table = match check_table(&args, 0, "next")? {
        ScriptValue::Table(table) => table,
        _ => return Ok(vec![ScriptValue::Nil]),
    };
    let step = table.borrow().next(&arg(&args, 1)).map_err(ScriptError::runtime)?;
    match step {
        Some((key, value)) => Ok(vec![key, value]),
        None => Ok(vec![ScriptValue::Nil]),
    }
}

fn base_pairs(vm: &mut Vm, args: Vec<ScriptValue>) -> Results {
    let target = check_any(&args, 0, "pairs")?;
    if let Some(handler) = vm.metamethod(&target, "__pairs") {
        let mut results = vm.call_value(handler, vec![target])?;
        results.resize(3, ScriptValue::Nil);
        return Ok(results);
    }
    let table = check_table(&args, 0, "pairs")?;
    Ok(vec![builtin("next", base_next), table, ScriptValue::Nil])
}

fn ipairs_step(vm: &mut Vm, args: Vec<ScriptValue>) -> Results {
    let index = exact_integer(&arg(&args, 1)).unwrap_or(0) + 1;
    let value = vm.index(arg(&args, 0), ScriptValue::Integer(index))?;
    if value.is_nil() {
        Ok(vec![ScriptValue::Nil])
    } else {
        Ok(vec![ScriptValue::Integer(index), value])
    }
}

fn base_ipairs(_vm: &mut Vm, args: Vec<ScriptValue>) -> Results {
    let target = check_any(&args, 0, "ipairs")?;
    Ok(vec![builtin("ipairs_step", ipairs_step), target, ScriptValue::Integer(0)])
}

fn base_rawget(_vm: &mut Vm, args: Vec<ScriptValue>) -> Results {
    match check_table(&args, 0, "rawget")? {
        ScriptValue::Table(table) => Ok(vec![table.borrow().get(&arg(&args, 1))]),
        _ => Ok(vec![ScriptValue::Nil]),
    }
}

fn base_rawset(_vm: &mut Vm, args: Vec<ScriptValue>) -> Results {
    let target = check_table(&args, 0, "rawset")?;
    if let ScriptValue::Table(table) = &target {
        table
            .borrow_mut()
            .set(arg(&args, 1), arg(&args, 2))
            .map_err(ScriptError::runtime)?;
    }
    Ok(vec![target])
}

fn base_rawequal(_vm: &mut Vm, args: Vec<ScriptValue>) -> Results {
    let a = check_any(&args, 0, "rawequal")?;
    let b = check_any(&args, 1, "rawequal")?;
    Ok(vec![ScriptValue::Boolean(a.raw_equals(&b))])
}

fn base_rawlen(_vm: &mut Vm, args: Vec<ScriptValue>) -> Results {
    match arg(&args, 0) {
        ScriptValue::Table(table) => Ok(vec![ScriptValue::Integer(table.borrow().len() as i64)]),
        ScriptValue::String(s) => Ok(vec![ScriptValue::Integer(s.len() as i64)]),
        _ => Err(arg_error(0, "rawlen", "table or string expected")),
    }
}

fn base_setmetatable(_vm: &mut Vm, args: Vec<ScriptValue>) -> Results {
    let target = check_table(&args, 0, "setmetatable")?;
    let metatable = match arg(&args, 1) {
        ScriptValue::Table(mt) => Some(mt),
        ScriptValue::Nil => None,
        _ => return Err(type_error(&args, 1, "setmetatable", "nil or table")),
    };
    if let ScriptValue::Table(table) = &target {
        let protected = table
            .borrow()
            .metatable
            .as_ref()
            .map(|mt| !mt.borrow().get_str(b"__metatable").is_nil())
            .unwrap_or(false);
        if protected {
            return Err(ScriptError::runtime("cannot change a protected metatable"));
        }
        table.borrow_mut().metatable = metatable;
    }
    Ok(vec![target])
}

fn base_getmetatable(_vm: &mut Vm, args: Vec<ScriptValue>) -> Results {
    let value = check_any(&args, 0, "getmetatable")?;
    match value.metatable() {
        Some(mt) => {
            let guard = mt.borrow().get_str(b"__metatable");
            if guard.is_nil() {
                Ok(vec![ScriptValue::Table(mt)])
            } else {
                Ok(vec![guard])
            }
        }
        None => Ok(vec![ScriptValue::Nil]),
    }
}
