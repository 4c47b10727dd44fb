//! `__index` and `__newindex` adapters
//!
//! String keys resolve against the candidate list of the receiver's type.
//! On arrays, integer keys address elements by zero-based row-major offset.
//! Keys that match no member fall back to the type's indexer, if it has one.

use std::rc::Rc;

use tandem_sdk::{ScriptState, ScriptType};

use super::call::{indexer_get, indexer_set, invoke, push_bound_group, push_event_accessor, push_indexer_accessor};
use super::{guard, is_same_object, qualified, receiver_object, receiver_types, AdapterBody};
use crate::environment::Bridge;
use crate::error::{DispatchError, DispatchResult};
use crate::host::{FieldStorage, HostArray, HostObjectRef, HostTypeRef, HostValue, TypeRef};
use crate::marshal::{describe_arg, key_text, load_or_fail, push_alias, push_host};
use crate::members::{Member, MemberMode};
use crate::registry::{push_anchored, Anchored};
use crate::value::HostTypeSet;

pub(crate) fn index_adapter(ty: HostTypeRef, mode: MemberMode) -> AdapterBody {
    Rc::new(move |bridge: &Bridge, state: &mut dyn ScriptState| -> DispatchResult<usize> {
        match mode {
            MemberMode::Instance => index_instance(bridge, state, &ty),
            MemberMode::Static => index_static(bridge, state, &ty),
        }
    })
}

pub(crate) fn newindex_adapter(ty: HostTypeRef, mode: MemberMode) -> AdapterBody {
    Rc::new(move |bridge: &Bridge, state: &mut dyn ScriptState| -> DispatchResult<usize> {
        match mode {
            MemberMode::Instance => newindex_instance(bridge, state, &ty),
            MemberMode::Static => newindex_static(bridge, state, &ty),
        }
    })
}

fn invalid_get(bridge: &Bridge, state: &dyn ScriptState, ty: &HostTypeRef) -> DispatchError {
    DispatchError::Resolution(format!(
        "attempt to get invalid member `{}`",
        qualified(ty, &key_text(bridge, state, 2))
    ))
}

fn invalid_set(bridge: &Bridge, state: &dyn ScriptState, ty: &HostTypeRef) -> DispatchError {
    DispatchError::Resolution(format!(
        "attempt to set invalid member `{}`",
        qualified(ty, &key_text(bridge, state, 2))
    ))
}

// ============================================================================
// Reads
// ============================================================================

fn index_instance(bridge: &Bridge, state: &mut dyn ScriptState, ty: &HostTypeRef) -> DispatchResult<usize> {
    let target = receiver_object(bridge, state, 1, ty)?;
    let members = bridge.registry.members(ty, MemberMode::Instance);

    match state.type_of(2) {
        ScriptType::String => {
            if let Some(member) = members.lookup(state, 2, &bridge.config) {
                let name = key_text(bridge, state, 2);
                return read_member(bridge, state, ty, Some(&target), &member, &name);
            }
            if ty.is_array() {
                if let Some(setter) = array_accessor_name(bridge, state) {
                    state.push_function(guard::guarded(array_accessor(target, setter)));
                    return Ok(1);
                }
            }
            if !members.indexers().is_empty() {
                return match indexer_get(bridge, state, ty, Some(&target), members.indexers(), 2, 1) {
                    Err(DispatchError::Resolution(_)) => Err(invalid_get(bridge, state, ty)),
                    other => other,
                };
            }
            Err(invalid_get(bridge, state, ty))
        }
        ScriptType::Number if ty.is_array() => array_get(bridge, state, ty, &target),
        _ if !members.indexers().is_empty() => indexer_get(bridge, state, ty, Some(&target), members.indexers(), 2, 1),
        _ => Err(DispatchError::Resolution(format!(
            "attempt to index `{}` with {}",
            ty.full_name(),
            describe_arg(bridge, state, 2)
        ))),
    }
}

fn index_static(bridge: &Bridge, state: &mut dyn ScriptState, ty: &HostTypeRef) -> DispatchResult<usize> {
    receiver_types(bridge, state, 1, ty)?;
    let members = bridge.registry.members(ty, MemberMode::Static);
    if state.type_of(2) == ScriptType::String {
        if let Some(member) = members.lookup(state, 2, &bridge.config) {
            let name = key_text(bridge, state, 2);
            return read_member(bridge, state, ty, None, &member, &name);
        }
    }
    Err(invalid_get(bridge, state, ty))
}

fn read_member(
    bridge: &Bridge,
    state: &mut dyn ScriptState,
    ty: &HostTypeRef,
    receiver: Option<&HostObjectRef>,
    member: &Member,
    name: &str,
) -> DispatchResult<usize> {
    match member {
        Member::Field(field) => {
            let value = match &field.storage {
                FieldStorage::Instance { get, .. } => match receiver {
                    Some(obj) => get(&**obj),
                    None => return Err(invalid_get(bridge, state, ty)),
                },
                FieldStorage::Static(cell) => cell.borrow().clone(),
                FieldStorage::Const(value) => value.clone(),
            };
            push_host(bridge, state, &value)?;
        }
        Member::Property(property) => {
            let getter = match &property.getter {
                Some(getter) if property.readable() => getter.clone(),
                _ => {
                    return Err(DispatchError::Access(format!(
                        "attempt to get property without getter `{}`",
                        qualified(ty, name)
                    )))
                }
            };
            let value = invoke(bridge, state, ty, &getter, receiver.cloned(), &[], Vec::new())?;
            push_host(bridge, state, &value)?;
        }
        Member::Indexer(indexers) => push_indexer_accessor(state, ty, receiver, indexers),
        Member::Methods(group) => push_bound_group(state, group.clone(), receiver.cloned(), Vec::new()),
        Member::Event(event) => push_event_accessor(state, ty, receiver, event),
        Member::NestedType(nested) => {
            push_anchored(bridge, state, Anchored::Types(HostTypeSet::single(nested)));
        }
        Member::EnumValue(value) => state.push_integer(*value),
    }
    Ok(1)
}

// ============================================================================
// Writes
// ============================================================================

fn newindex_instance(bridge: &Bridge, state: &mut dyn ScriptState, ty: &HostTypeRef) -> DispatchResult<usize> {
    let target = receiver_object(bridge, state, 1, ty)?;
    let members = bridge.registry.members(ty, MemberMode::Instance);

    match state.type_of(2) {
        ScriptType::String => {
            if let Some(member) = members.lookup(state, 2, &bridge.config) {
                let name = key_text(bridge, state, 2);
                return write_member(bridge, state, ty, Some(&target), &member, &name);
            }
            if !members.indexers().is_empty() {
                return match indexer_set(bridge, state, ty, Some(&target), members.indexers(), 2, 1, 3) {
                    Err(DispatchError::Resolution(_)) => Err(invalid_set(bridge, state, ty)),
                    other => other,
                };
            }
            Err(invalid_set(bridge, state, ty))
        }
        ScriptType::Number if ty.is_array() => array_set(bridge, state, ty, &target),
        _ if !members.indexers().is_empty() => {
            indexer_set(bridge, state, ty, Some(&target), members.indexers(), 2, 1, 3)
        }
        _ => Err(DispatchError::Resolution(format!(
            "attempt to index `{}` with {}",
            ty.full_name(),
            describe_arg(bridge, state, 2)
        ))),
    }
}

fn newindex_static(bridge: &Bridge, state: &mut dyn ScriptState, ty: &HostTypeRef) -> DispatchResult<usize> {
    receiver_types(bridge, state, 1, ty)?;
    let members = bridge.registry.members(ty, MemberMode::Static);
    if state.type_of(2) == ScriptType::String {
        if let Some(member) = members.lookup(state, 2, &bridge.config) {
            let name = key_text(bridge, state, 2);
            return write_member(bridge, state, ty, None, &member, &name);
        }
    }
    Err(invalid_set(bridge, state, ty))
}

fn write_member(
    bridge: &Bridge,
    state: &mut dyn ScriptState,
    ty: &HostTypeRef,
    receiver: Option<&HostObjectRef>,
    member: &Member,
    name: &str,
) -> DispatchResult<usize> {
    let qualified_name = qualified(ty, name);
    let refuse = |what: &str| Err(DispatchError::Access(format!("attempt to set {} `{}`", what, qualified_name)));

    match member {
        Member::Field(field) => {
            if field.is_const() {
                return refuse("constant");
            }
            if field.read_only {
                return refuse("read-only field");
            }
            let field_ty = resolve(&field.ty, ty, &qualified_name)?;
            let value = load_or_fail(bridge, state, 3, &field_ty, &qualified_name)?;
            match &field.storage {
                FieldStorage::Instance { set, .. } => match receiver {
                    Some(obj) => set(&**obj, value),
                    None => return Err(invalid_set(bridge, state, ty)),
                },
                FieldStorage::Static(cell) => *cell.borrow_mut() = value,
                FieldStorage::Const(_) => return refuse("constant"),
            }
        }
        Member::Property(property) => {
            let setter = match &property.setter {
                Some(setter) if property.writable() => setter.clone(),
                _ => return refuse("property without setter"),
            };
            let property_ty = resolve(&property.ty, ty, &qualified_name)?;
            let value = load_or_fail(bridge, state, 3, &property_ty, &qualified_name)?;
            invoke(bridge, state, ty, &setter, receiver.cloned(), &[], vec![value])?;
        }
        Member::Indexer(_) => return refuse("indexer"),
        Member::Methods(_) => return refuse("method"),
        Member::Event(_) => return refuse("event"),
        Member::NestedType(_) => return refuse("nested type"),
        Member::EnumValue(_) => return refuse("constant"),
    }
    Ok(0)
}

fn resolve(ty: &TypeRef, owner: &HostTypeRef, context: &str) -> DispatchResult<HostTypeRef> {
    ty.resolve(owner, &[])
        .ok_or_else(|| DispatchError::Conversion(format!("`{}` has an unbound generic type", context)))
}

// ============================================================================
// Arrays
// ============================================================================

fn out_of_bounds(ty: &HostTypeRef, index: &str, len: usize) -> DispatchError {
    DispatchError::Access(format!(
        "index {} is out of bounds for `{}` of length {}",
        index,
        ty.full_name(),
        len
    ))
}

fn array_index(bridge: &Bridge, state: &dyn ScriptState, idx: i32, ty: &HostTypeRef) -> DispatchResult<i64> {
    state.to_integer(idx).ok_or_else(|| {
        DispatchError::Resolution(format!(
            "cannot index `{}` with {}",
            ty.full_name(),
            describe_arg(bridge, state, idx)
        ))
    })
}

/// Element of an array payload by linear offset
fn element_at(target: &HostObjectRef, index: i64) -> DispatchResult<Result<HostValue, usize>> {
    target
        .with(|array: &HostArray| {
            usize::try_from(index)
                .ok()
                .and_then(|i| array.items.get(i).cloned())
                .ok_or(array.len())
        })
        .ok_or_else(|| DispatchError::Conversion(format!("`{}` has no array payload", target.host_type().full_name())))
}

fn array_get(bridge: &Bridge, state: &mut dyn ScriptState, ty: &HostTypeRef, target: &HostObjectRef) -> DispatchResult<usize> {
    let index = array_index(bridge, state, 2, ty)?;
    let element = element_at(target, index)?.map_err(|len| out_of_bounds(ty, &index.to_string(), len))?;
    push_alias(bridge, state, &element)?;
    Ok(1)
}

fn array_set(bridge: &Bridge, state: &mut dyn ScriptState, ty: &HostTypeRef, target: &HostObjectRef) -> DispatchResult<usize> {
    let index = array_index(bridge, state, 2, ty)?;
    let (element_ty, len) = target
        .with(|array: &HostArray| (array.element.clone(), array.len()))
        .ok_or_else(|| DispatchError::Conversion(format!("`{}` has no array payload", ty.full_name())))?;
    if index < 0 || index as usize >= len {
        return Err(out_of_bounds(ty, &index.to_string(), len));
    }
    let value = load_or_fail(bridge, state, 3, &element_ty, &format!("{}[{}]", ty.full_name(), index))?;
    target.with_mut(|array: &mut HostArray| array.items[index as usize] = value);
    Ok(0)
}

/// `Get` or `Set` on an array: `Some(true)` for the setter
fn array_accessor_name(bridge: &Bridge, state: &dyn ScriptState) -> Option<bool> {
    match key_text(bridge, state, 2).as_str() {
        "Get" => Some(false),
        "Set" => Some(true),
        _ => None,
    }
}

/// `arr:Get(i, j)` / `arr:Set(i, j, value)`: one index per dimension
fn array_accessor(target: HostObjectRef, setter: bool) -> AdapterBody {
    Rc::new(move |bridge: &Bridge, state: &mut dyn ScriptState| -> DispatchResult<usize> {
        let ty = target.host_type().clone();
        let method = qualified(&ty, if setter { "Set" } else { "Get" });
        let first = if bridge.config.strip_receiver && is_same_object(bridge, state, 1, &target) {
            2
        } else {
            1
        };
        let top = state.top();
        let (element_ty, rank) = target
            .with(|array: &HostArray| (array.element.clone(), array.rank()))
            .ok_or_else(|| DispatchError::Conversion(format!("`{}` has no array payload", ty.full_name())))?;

        let given = (top - first + 1 - i32::from(setter)).max(0) as usize;
        if given != rank {
            return Err(DispatchError::Resolution(format!(
                "`{}` expects {} indices, got {}",
                method, rank, given
            )));
        }
        let indices = (0..rank as i32)
            .map(|n| array_index(bridge, state, first + n, &ty))
            .collect::<DispatchResult<Vec<i64>>>()?;
        let shown = indices.iter().map(i64::to_string).collect::<Vec<_>>().join(", ");
        let offset = target.with(|array: &HostArray| array.offset(&indices)).flatten();
        let Some(offset) = offset else {
            let len = target.with(|array: &HostArray| array.len()).unwrap_or(0);
            return Err(out_of_bounds(&ty, &format!("[{}]", shown), len));
        };

        if setter {
            let value = load_or_fail(bridge, state, top, &element_ty, &format!("{}[{}]", ty.full_name(), shown))?;
            target.with_mut(|array: &mut HostArray| array.items[offset] = value);
            Ok(0)
        } else {
            let element = target
                .with(|array: &HostArray| array.items[offset].clone())
                .unwrap_or(HostValue::Null);
            push_alias(bridge, state, &element)?;
            Ok(1)
        }
    })
}
