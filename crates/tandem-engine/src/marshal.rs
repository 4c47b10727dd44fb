//! Marshaling primitives
//!
//! Moves values between the runtime's stack and the host:
//!
//! - [`try_load`] converts the stack slot at an index to a requested host
//!   type, or reports that it cannot.
//! - [`push_host`] pushes a host value, anchoring objects and types.
//! - [`push_value`] and [`pull_value`] move bridge [`Value`]s.
//!
//! Conversions are strict: numbers never become strings and strings never
//! become numbers. Integers are range-checked, and floats convert to integer
//! types only when they hold an exact integer. A u64 above `i64::MAX`
//! crosses as a float only when the float holds it exactly.

use tandem_sdk::{ScriptState, ScriptType};

use crate::environment::Bridge;
use crate::error::{DispatchError, DispatchResult};
use crate::host::{HostTypeRef, HostValue, Primitive, TypeKind};
use crate::logging::log_conversion_failed;
use crate::registry::{push_anchored, Anchored};
use crate::value::{EmbeddedKind, EmbeddedObject, HostTypeSet, Value};

// ============================================================================
// Try-load
// ============================================================================

/// Convert the value at `idx` to `target`; `None` when it does not fit.
pub(crate) fn try_load(
    bridge: &Bridge,
    state: &mut dyn ScriptState,
    idx: i32,
    target: &HostTypeRef,
) -> Option<HostValue> {
    let found = state.type_of(idx);
    let loaded = match target.kind() {
        TypeKind::Primitive(p) => load_primitive(bridge, state, idx, found, *p),
        TypeKind::Enum => load_enum(bridge, state, idx, found, target),
        TypeKind::Class | TypeKind::Struct | TypeKind::Interface | TypeKind::Array { .. } => {
            load_object(bridge, state, idx, found, target)
        }
    };
    if loaded.is_none() {
        log_conversion_failed(found.name(), target);
    }
    loaded
}

fn load_primitive(
    bridge: &Bridge,
    state: &mut dyn ScriptState,
    idx: i32,
    found: ScriptType,
    target: Primitive,
) -> Option<HostValue> {
    match target {
        Primitive::Void => None,
        Primitive::Bool => (found == ScriptType::Boolean).then(|| HostValue::Bool(state.to_boolean(idx))),
        Primitive::I8
        | Primitive::I16
        | Primitive::I32
        | Primitive::I64
        | Primitive::U8
        | Primitive::U16
        | Primitive::U32
        | Primitive::U64 => {
            if found != ScriptType::Number {
                return None;
            }
            integer_value(target, state.to_integer(idx)?)
        }
        Primitive::F32 => {
            if found != ScriptType::Number {
                return None;
            }
            let n = state.to_number(idx)?;
            if n.is_finite() && n.abs() > f32::MAX as f64 {
                return None;
            }
            Some(HostValue::F32(n as f32))
        }
        Primitive::F64 => (found == ScriptType::Number)
            .then(|| state.to_number(idx))
            .flatten()
            .map(HostValue::F64),
        Primitive::Char => match found {
            ScriptType::String => {
                let text = decode(bridge, state, idx)?;
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(HostValue::Char(c)),
                    _ => None,
                }
            }
            ScriptType::Number => {
                let code = u32::try_from(state.to_integer(idx)?).ok()?;
                char::from_u32(code).map(HostValue::Char)
            }
            _ => None,
        },
        Primitive::String => match found {
            ScriptType::None | ScriptType::Nil => Some(HostValue::Null),
            ScriptType::String => decode(bridge, state, idx).map(HostValue::String),
            _ => None,
        },
        Primitive::Object => Some(object_value(bridge, state, idx, found)),
        Primitive::Value => Some(HostValue::Script(pull_value(bridge, state, idx))),
        Primitive::Type => match found {
            ScriptType::None | ScriptType::Nil => Some(HostValue::Null),
            ScriptType::UserData => match bridge.registry.anchored_at(state, idx)? {
                Anchored::Types(set) => set.non_generic().cloned().map(HostValue::Type),
                Anchored::Object(_) => None,
            },
            _ => None,
        },
        Primitive::Pointer => state.to_light_userdata(idx).map(HostValue::Pointer),
    }
}

fn integer_value(target: Primitive, v: i64) -> Option<HostValue> {
    let (min, max) = target.integer_range()?;
    if (v as i128) < min || (v as i128) > max {
        return None;
    }
    Some(match target {
        Primitive::I8 => HostValue::I8(v as i8),
        Primitive::I16 => HostValue::I16(v as i16),
        Primitive::I32 => HostValue::I32(v as i32),
        Primitive::U8 => HostValue::U8(v as u8),
        Primitive::U16 => HostValue::U16(v as u16),
        Primitive::U32 => HostValue::U32(v as u32),
        Primitive::U64 => HostValue::U64(v as u64),
        _ => HostValue::I64(v),
    })
}

fn load_enum(
    bridge: &Bridge,
    state: &mut dyn ScriptState,
    idx: i32,
    found: ScriptType,
    target: &HostTypeRef,
) -> Option<HostValue> {
    match found {
        ScriptType::Number => Some(HostValue::Enum(target.clone(), state.to_integer(idx)?)),
        ScriptType::String => {
            let name = decode(bridge, state, idx)?;
            target.enum_value(&name).map(|v| HostValue::Enum(target.clone(), v))
        }
        _ => None,
    }
}

fn load_object(
    bridge: &Bridge,
    state: &mut dyn ScriptState,
    idx: i32,
    found: ScriptType,
    target: &HostTypeRef,
) -> Option<HostValue> {
    match found {
        ScriptType::None | ScriptType::Nil => (!target.is_value_type()).then_some(HostValue::Null),
        ScriptType::UserData => match bridge.registry.anchored_at(state, idx)? {
            Anchored::Object(obj) if obj.host_type().is_assignable_to(target) => {
                Some(HostValue::Object(obj.boxed_copy()))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Conversion to `object`: every value fits
fn object_value(bridge: &Bridge, state: &mut dyn ScriptState, idx: i32, found: ScriptType) -> HostValue {
    match found {
        ScriptType::None | ScriptType::Nil => HostValue::Null,
        ScriptType::Boolean => HostValue::Bool(state.to_boolean(idx)),
        ScriptType::Number if state.is_integer(idx) => HostValue::I64(state.to_integer(idx).unwrap_or_default()),
        ScriptType::Number => HostValue::F64(state.to_number(idx).unwrap_or_default()),
        ScriptType::String => match decode(bridge, state, idx) {
            Some(text) => HostValue::String(text),
            None => HostValue::Script(pull_value(bridge, state, idx)),
        },
        ScriptType::LightUserData => HostValue::Pointer(state.to_light_userdata(idx).unwrap_or_default()),
        ScriptType::UserData => match bridge.registry.anchored_at(state, idx) {
            Some(Anchored::Object(obj)) => HostValue::Object(obj.boxed_copy()),
            Some(Anchored::Types(set)) if set.types().len() == 1 => HostValue::Type(set.primary().clone()),
            _ => HostValue::Script(pull_value(bridge, state, idx)),
        },
        ScriptType::Table | ScriptType::Function | ScriptType::Thread => {
            HostValue::Script(pull_value(bridge, state, idx))
        }
    }
}

fn decode(bridge: &Bridge, state: &dyn ScriptState, idx: i32) -> Option<String> {
    let bytes = state.to_bytes(idx)?;
    bridge.config.encoding.decode(&bytes)
}

/// Convert or fail with a message naming `context`
pub(crate) fn load_or_fail(
    bridge: &Bridge,
    state: &mut dyn ScriptState,
    idx: i32,
    target: &HostTypeRef,
    context: &str,
) -> DispatchResult<HostValue> {
    try_load(bridge, state, idx, target).ok_or_else(|| {
        DispatchError::Conversion(format!(
            "cannot convert {} to {} for `{}`",
            describe_arg(bridge, state, idx),
            target.full_name(),
            context
        ))
    })
}

// ============================================================================
// Push
// ============================================================================

/// Push a host value. Struct objects are copied first.
pub(crate) fn push_host(bridge: &Bridge, state: &mut dyn ScriptState, value: &HostValue) -> DispatchResult<()> {
    match value {
        HostValue::Object(obj) => push_anchored(bridge, state, Anchored::Object(obj.boxed_copy())),
        other => push_alias(bridge, state, other)?,
    }
    Ok(())
}

/// Float for a u64 above `i64::MAX`, or `None` when the float would round it
pub(crate) fn u64_as_number(v: u64) -> Option<f64> {
    let n = v as f64;
    // 2^64 saturates back to u64::MAX
    (n < 18_446_744_073_709_551_616.0 && n as u64 == v).then_some(n)
}

fn u64_overflow(v: u64) -> DispatchError {
    DispatchError::Conversion(format!("u64 value {} has no exact script representation", v))
}

/// Push a host value without copying struct objects, so script writes
/// through the pushed value reach the original
pub(crate) fn push_alias(bridge: &Bridge, state: &mut dyn ScriptState, value: &HostValue) -> DispatchResult<()> {
    match value {
        HostValue::Null => state.push_nil(),
        HostValue::Bool(b) => state.push_boolean(*b),
        HostValue::Char(c) => {
            let mut buf = [0u8; 4];
            let bytes = bridge.config.encoding.encode(c.encode_utf8(&mut buf));
            state.push_bytes(&bytes);
        }
        HostValue::I8(v) => state.push_integer(*v as i64),
        HostValue::I16(v) => state.push_integer(*v as i64),
        HostValue::I32(v) => state.push_integer(*v as i64),
        HostValue::I64(v) => state.push_integer(*v),
        HostValue::U8(v) => state.push_integer(*v as i64),
        HostValue::U16(v) => state.push_integer(*v as i64),
        HostValue::U32(v) => state.push_integer(*v as i64),
        HostValue::U64(v) => match i64::try_from(*v) {
            Ok(i) => state.push_integer(i),
            Err(_) => state.push_number(u64_as_number(*v).ok_or_else(|| u64_overflow(*v))?),
        },
        HostValue::F32(v) => state.push_number(*v as f64),
        HostValue::F64(v) => state.push_number(*v),
        HostValue::String(s) => {
            let bytes = bridge.config.encoding.encode(s);
            state.push_bytes(&bytes);
        }
        HostValue::Pointer(p) => state.push_light_userdata(*p),
        HostValue::Enum(_, v) => state.push_integer(*v),
        HostValue::Object(obj) => push_anchored(bridge, state, Anchored::Object(obj.clone())),
        HostValue::Type(ty) => push_anchored(bridge, state, Anchored::Types(HostTypeSet::single(ty))),
        HostValue::Script(value) => push_value(bridge, state, value)?,
    }
    Ok(())
}

/// Push a bridge value
pub(crate) fn push_value(bridge: &Bridge, state: &mut dyn ScriptState, value: &Value) -> DispatchResult<()> {
    match value {
        Value::Nil => state.push_nil(),
        Value::Boolean(b) => state.push_boolean(*b),
        Value::Pointer(p) => state.push_light_userdata(*p),
        Value::Integer(i) => state.push_integer(*i),
        Value::Number(n) => state.push_number(*n),
        Value::String(s) => state.push_bytes(s),
        Value::Embedded(obj) => {
            if !obj.belongs_to(bridge) {
                return Err(DispatchError::Conversion(format!(
                    "{} belongs to a different environment",
                    obj.kind().name()
                )));
            }
            state.push_reference(obj.registry_key());
        }
        Value::HostObject(obj) => push_anchored(bridge, state, Anchored::Object(obj.clone())),
        Value::HostTypes(set) => push_anchored(bridge, state, Anchored::Types(set.clone())),
    }
    Ok(())
}

// ============================================================================
// Pull
// ============================================================================

/// Read the value at `idx` as a bridge value.
///
/// Tables, functions, threads and foreign userdata are anchored in the
/// runtime registry for as long as the returned handle lives.
pub(crate) fn pull_value(bridge: &Bridge, state: &mut dyn ScriptState, idx: i32) -> Value {
    match state.type_of(idx) {
        ScriptType::None | ScriptType::Nil => Value::Nil,
        ScriptType::Boolean => Value::Boolean(state.to_boolean(idx)),
        ScriptType::Number if state.is_integer(idx) => Value::Integer(state.to_integer(idx).unwrap_or_default()),
        ScriptType::Number => Value::Number(state.to_number(idx).unwrap_or_default()),
        ScriptType::String => state.to_bytes(idx).map_or(Value::Nil, Value::String),
        ScriptType::LightUserData => Value::Pointer(state.to_light_userdata(idx).unwrap_or_default()),
        ScriptType::UserData => match bridge.registry.anchored_at(state, idx) {
            Some(Anchored::Object(obj)) => Value::HostObject(obj),
            Some(Anchored::Types(set)) => Value::HostTypes(set),
            None => embedded(bridge, state, idx, EmbeddedKind::UserData),
        },
        ScriptType::Table => embedded(bridge, state, idx, EmbeddedKind::Table),
        ScriptType::Function => embedded(bridge, state, idx, EmbeddedKind::Function),
        ScriptType::Thread => embedded(bridge, state, idx, EmbeddedKind::Thread),
    }
}

fn embedded(bridge: &Bridge, state: &mut dyn ScriptState, idx: i32, kind: EmbeddedKind) -> Value {
    let address = state.to_pointer(idx).unwrap_or_default();
    state.push_value(idx);
    let key = state.reference();
    Value::Embedded(EmbeddedObject::new(kind, key, address, bridge.weak()))
}

/// Short description of the value at `idx` for error messages
pub(crate) fn describe_arg(bridge: &Bridge, state: &dyn ScriptState, idx: i32) -> String {
    match state.type_of(idx) {
        ScriptType::Number if state.is_integer(idx) => "integer".to_string(),
        ScriptType::UserData => match bridge.registry.anchored_at(state, idx) {
            Some(Anchored::Object(obj)) => obj.host_type().full_name(),
            Some(Anchored::Types(set)) => format!("type `{}`", set),
            None => "userdata".to_string(),
        },
        other => other.name().to_string(),
    }
}

/// Comma-separated descriptions of `count` arguments starting at `first`
pub(crate) fn describe_args(bridge: &Bridge, state: &dyn ScriptState, first: i32, count: usize) -> String {
    (0..count as i32)
        .map(|n| describe_arg(bridge, state, first + n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// String key at `idx` for error messages
pub(crate) fn key_text(bridge: &Bridge, state: &dyn ScriptState, idx: i32) -> String {
    match state.to_bytes(idx) {
        Some(bytes) => bridge
            .config
            .encoding
            .decode(&bytes)
            .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned()),
        None => describe_arg(bridge, state, idx),
    }
}
