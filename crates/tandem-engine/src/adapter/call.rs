//! Calls into host code: constructors, bound method groups, indexer and
//! event accessors

use std::rc::Rc;

use tandem_sdk::{ScriptState, ScriptType};

use super::overload::{self, Candidate};
use super::{guard, is_same_object, qualified, receiver_types, type_args_at, AdapterBody};
use crate::environment::Bridge;
use crate::error::{DispatchError, DispatchResult};
use crate::host::types::check_constraints;
use crate::host::{
    CallContext, EventInfo, HostObject, HostObjectRef, HostTypeRef, HostValue, Invoke, MethodInfo, PropertyInfo,
    TypeKind,
};
use crate::marshal::{describe_arg, load_or_fail, pull_value, push_host};
use crate::members::{MethodGroup, INDEXER_NAME};
use crate::registry::{push_anchored, Anchored};
use crate::value::HostTypeSet;

/// Run a host closure with a fresh call context
pub(crate) fn invoke(
    bridge: &Bridge,
    state: &mut dyn ScriptState,
    owner: &HostTypeRef,
    function: &Invoke,
    receiver: Option<HostObjectRef>,
    type_args: &[HostTypeRef],
    args: Vec<HostValue>,
) -> DispatchResult<HostValue> {
    let mut ctx = CallContext {
        bridge,
        state,
        owner,
        receiver,
        type_args,
    };
    function(&mut ctx, args).map_err(DispatchError::Host)
}

// ============================================================================
// Construction
// ============================================================================

/// `__call` on a type object: close a generic definition when every
/// argument is a type, construct an instance otherwise
pub(crate) fn construct_adapter(ty: HostTypeRef) -> AdapterBody {
    Rc::new(move |bridge: &Bridge, state: &mut dyn ScriptState| -> DispatchResult<usize> {
        let set = receiver_types(bridge, state, 1, &ty)?;
        let count = (state.top() - 1).max(0) as usize;

        if count > 0 && set.has_generic_definitions() {
            if let Some(args) = type_args_at(bridge, state, 2, count) {
                let definition = set.by_arity(count).ok_or_else(|| {
                    DispatchError::Resolution(format!(
                        "`{}` has no generic definition taking {} type arguments",
                        set, count
                    ))
                })?;
                let closed = definition.make_generic(&args).map_err(DispatchError::Resolution)?;
                push_anchored(bridge, state, Anchored::Types(HostTypeSet::single(&closed)));
                return Ok(1);
            }
        }

        let target = set.non_generic().cloned().ok_or_else(|| {
            DispatchError::Resolution(format!("`{}` is a generic type definition and needs type arguments", set))
        })?;
        construct(bridge, state, &target, 2, count)
    })
}

fn construct(
    bridge: &Bridge,
    state: &mut dyn ScriptState,
    ty: &HostTypeRef,
    first: i32,
    count: usize,
) -> DispatchResult<usize> {
    let refuse = |what: &str| Err(DispatchError::Access(format!("cannot construct {} `{}`", what, ty.full_name())));
    match ty.kind() {
        TypeKind::Interface => return refuse("interface"),
        TypeKind::Enum => return refuse("enum"),
        TypeKind::Primitive(_) | TypeKind::Array { .. } => return refuse("built-in type"),
        _ if ty.is_abstract() => return refuse("abstract type"),
        _ => {}
    }

    let constructors: Vec<_> = ty
        .members()
        .constructors
        .iter()
        .filter(|c| c.visibility.is_public())
        .cloned()
        .collect();

    if ty.is_struct() && count == 0 && !constructors.iter().any(|c| c.params.is_empty()) {
        let obj = HostObject::default_of(ty).ok_or_else(|| {
            DispatchError::Access(format!("`{}` has no default value", ty.full_name()))
        })?;
        push_anchored(bridge, state, Anchored::Object(obj));
        return Ok(1);
    }
    if constructors.is_empty() {
        return Err(DispatchError::Access(format!(
            "`{}` has no public constructor",
            ty.full_name()
        )));
    }

    let candidates: Vec<Candidate<'_>> = constructors
        .iter()
        .map(|c| Candidate {
            params: &c.params,
            type_args: &[],
        })
        .collect();
    let chosen = overload::select(bridge, state, ty, &candidates, first, count, &ty.full_name())?;
    let created = invoke(bridge, state, ty, &constructors[chosen.index].invoke, None, &[], chosen.args)?;
    match created {
        HostValue::Object(obj) => push_anchored(bridge, state, Anchored::Object(obj)),
        other => push_host(bridge, state, &other)?,
    }
    Ok(1)
}

// ============================================================================
// Method groups
// ============================================================================

/// Push `group` bound to `receiver` as a callable
pub(crate) fn push_bound_group(
    state: &mut dyn ScriptState,
    group: Rc<MethodGroup>,
    receiver: Option<HostObjectRef>,
    type_args: Vec<HostTypeRef>,
) {
    let body: AdapterBody = Rc::new(move |bridge: &Bridge, state: &mut dyn ScriptState| -> DispatchResult<usize> {
        call_group(bridge, state, &group, receiver.as_ref(), &type_args)
    });
    state.push_function(guard::guarded(body));
}

fn call_group(
    bridge: &Bridge,
    state: &mut dyn ScriptState,
    group: &Rc<MethodGroup>,
    receiver: Option<&HostObjectRef>,
    type_args: &[HostTypeRef],
) -> DispatchResult<usize> {
    let top = state.top();
    let first = if bridge.config.strip_receiver && top >= 1 && is_receiver(bridge, state, group, receiver) {
        2
    } else {
        1
    };
    let count = (top - first + 1).max(0) as usize;
    let name = group.qualified_name();

    if type_args.is_empty() && count > 0 && group.has_generic() {
        if let Some(args) = type_args_at(bridge, state, first, count) {
            return instantiate(state, group, receiver, args);
        }
    }

    let overloads: Vec<&Rc<MethodInfo>> = group
        .overloads
        .iter()
        .filter(|m| m.generic_params.len() == type_args.len())
        .collect();
    if overloads.is_empty() {
        return Err(DispatchError::Resolution(format!(
            "`{}` is generic and needs explicit type arguments",
            name
        )));
    }

    let candidates: Vec<Candidate<'_>> = overloads
        .iter()
        .map(|m| Candidate {
            params: &m.params,
            type_args,
        })
        .collect();
    let chosen = overload::select(bridge, state, &group.owner, &candidates, first, count, &name)?;
    let method = overloads[chosen.index].clone();
    let receiver = if method.is_static {
        None
    } else {
        Some(receiver.cloned().ok_or_else(|| {
            DispatchError::Access(format!("instance method `{}` called without a receiver", name))
        })?)
    };

    let result = invoke(bridge, state, &group.owner, &method.invoke, receiver, type_args, chosen.args)?;
    if method.ret.is_void() {
        return Ok(0);
    }
    push_host(bridge, state, &result)?;
    Ok(1)
}

/// Colon-call detection: the first argument is the bound instance, or the
/// type owning a static group
fn is_receiver(
    bridge: &Bridge,
    state: &dyn ScriptState,
    group: &MethodGroup,
    receiver: Option<&HostObjectRef>,
) -> bool {
    match receiver {
        Some(obj) => is_same_object(bridge, state, 1, obj),
        None => matches!(
            bridge.registry.anchored_at(state, 1),
            Some(Anchored::Types(set)) if set.contains(&group.owner)
        ),
    }
}

/// `obj.Method(T1, T2)`: bind the generic overloads of matching arity
fn instantiate(
    state: &mut dyn ScriptState,
    group: &MethodGroup,
    receiver: Option<&HostObjectRef>,
    args: Vec<HostTypeRef>,
) -> DispatchResult<usize> {
    let name = group.qualified_name();
    let mut rejected = None;
    let accepted: Vec<Rc<MethodInfo>> = group
        .overloads
        .iter()
        .filter(|m| m.generic_params.len() == args.len())
        .filter(|m| match check_constraints(&m.generic_params, &args) {
            Ok(()) => true,
            Err(e) => {
                rejected = Some(e);
                false
            }
        })
        .cloned()
        .collect();

    if accepted.is_empty() {
        let message = match rejected {
            Some(e) => format!("{} of `{}`", e, name),
            None => format!("no generic overload of `{}` takes {} type arguments", name, args.len()),
        };
        return Err(DispatchError::Resolution(message));
    }

    let closed = Rc::new(MethodGroup {
        name: group.name.clone(),
        owner: group.owner.clone(),
        overloads: accepted,
    });
    push_bound_group(state, closed, receiver.cloned(), args);
    Ok(1)
}

// ============================================================================
// Accessor tables
// ============================================================================

/// An accessor body given the stack index of its first real argument
type Accessor = Rc<dyn Fn(&Bridge, &mut dyn ScriptState, i32) -> DispatchResult<usize>>;

/// Push a table of bound accessors. Each accessor drops the table itself
/// when called with colon syntax.
fn push_accessor_table(
    state: &mut dyn ScriptState,
    accessors: Vec<(&'static str, Accessor)>,
) {
    state.create_table(0, accessors.len());
    let table = state.to_pointer(-1);
    for (name, accessor) in accessors {
        let body: AdapterBody = Rc::new(move |bridge: &Bridge, state: &mut dyn ScriptState| -> DispatchResult<usize> {
            let first = if table.is_some() && state.to_pointer(1) == table { 2 } else { 1 };
            accessor(bridge, state, first)
        });
        state.push_str(name);
        state.push_function(guard::guarded(body));
        state.raw_set(-3);
    }
}

/// `obj.Item`: `{ Get = ..., Set = ... }` over the type's indexers
pub(crate) fn push_indexer_accessor(
    state: &mut dyn ScriptState,
    owner: &HostTypeRef,
    receiver: Option<&HostObjectRef>,
    indexers: &Rc<[Rc<PropertyInfo>]>,
) {
    let get: Accessor = {
        let (owner, receiver, indexers) = (owner.clone(), receiver.cloned(), indexers.clone());
        Rc::new(
            move |bridge: &Bridge, state: &mut dyn ScriptState, first: i32| -> DispatchResult<usize> {
                let count = (state.top() - first + 1).max(0) as usize;
                indexer_get(bridge, state, &owner, receiver.as_ref(), &indexers, first, count)
            },
        )
    };
    let set: Accessor = {
        let (owner, receiver, indexers) = (owner.clone(), receiver.cloned(), indexers.clone());
        Rc::new(
            move |bridge: &Bridge, state: &mut dyn ScriptState, first: i32| -> DispatchResult<usize> {
                let top = state.top();
                if top <= first {
                    return Err(DispatchError::Resolution(format!(
                        "`{}` expects index arguments and a value",
                        qualified(&owner, "Item:Set")
                    )));
                }
                let count = (top - first) as usize;
                indexer_set(bridge, state, &owner, receiver.as_ref(), &indexers, first, count, top)
            },
        )
    };
    push_accessor_table(state, vec![("Get", get), ("Set", set)]);
}

/// Read through the indexer matching `count` index arguments at `first`
pub(crate) fn indexer_get(
    bridge: &Bridge,
    state: &mut dyn ScriptState,
    owner: &HostTypeRef,
    receiver: Option<&HostObjectRef>,
    indexers: &[Rc<PropertyInfo>],
    first: i32,
    count: usize,
) -> DispatchResult<usize> {
    let readable: Vec<(&Rc<PropertyInfo>, &Invoke)> = indexers
        .iter()
        .filter(|p| p.readable())
        .filter_map(|p| p.getter.as_ref().map(|g| (p, g)))
        .collect();
    let name = qualified(owner, INDEXER_NAME);
    if readable.is_empty() {
        return Err(DispatchError::Access(format!(
            "attempt to get indexer without getter `{}`",
            name
        )));
    }

    let candidates: Vec<Candidate<'_>> = readable
        .iter()
        .map(|(p, _)| Candidate {
            params: &p.index_params,
            type_args: &[],
        })
        .collect();
    let chosen = overload::select(bridge, state, owner, &candidates, first, count, &name)?;
    let value = invoke(bridge, state, owner, readable[chosen.index].1, receiver.cloned(), &[], chosen.args)?;
    push_host(bridge, state, &value)?;
    Ok(1)
}

/// Write the value at `value_idx` through the indexer matching `count`
/// index arguments at `first`
#[allow(clippy::too_many_arguments)]
pub(crate) fn indexer_set(
    bridge: &Bridge,
    state: &mut dyn ScriptState,
    owner: &HostTypeRef,
    receiver: Option<&HostObjectRef>,
    indexers: &[Rc<PropertyInfo>],
    first: i32,
    count: usize,
    value_idx: i32,
) -> DispatchResult<usize> {
    let writable: Vec<(&Rc<PropertyInfo>, &Invoke)> = indexers
        .iter()
        .filter(|p| p.writable())
        .filter_map(|p| p.setter.as_ref().map(|s| (p, s)))
        .collect();
    let name = qualified(owner, INDEXER_NAME);
    if writable.is_empty() {
        return Err(DispatchError::Access(format!(
            "attempt to set indexer without setter `{}`",
            name
        )));
    }

    let candidates: Vec<Candidate<'_>> = writable
        .iter()
        .map(|(p, _)| Candidate {
            params: &p.index_params,
            type_args: &[],
        })
        .collect();
    let chosen = overload::select(bridge, state, owner, &candidates, first, count, &name)?;
    let (property, setter) = writable[chosen.index];
    let value_ty = property
        .ty
        .resolve(owner, &[])
        .ok_or_else(|| DispatchError::Conversion(format!("`{}` has an unbound value type", name)))?;
    let value = load_or_fail(bridge, state, value_idx, &value_ty, &name)?;

    let mut args = chosen.args;
    args.push(value);
    invoke(bridge, state, owner, setter, receiver.cloned(), &[], args)?;
    Ok(0)
}

/// `obj.Event`: `{ Add = ..., Remove = ... }` taking a script function
pub(crate) fn push_event_accessor(
    state: &mut dyn ScriptState,
    owner: &HostTypeRef,
    receiver: Option<&HostObjectRef>,
    event: &Rc<EventInfo>,
) {
    let accessor = |adding: bool| -> Accessor {
        let name = qualified(owner, &event.name);
        let owner = owner.clone();
        let receiver = receiver.cloned();
        let event = event.clone();
        Rc::new(
            move |bridge: &Bridge, state: &mut dyn ScriptState, first: i32| -> DispatchResult<usize> {
                if state.type_of(first) != ScriptType::Function {
                    return Err(DispatchError::Conversion(format!(
                        "cannot convert {} to a handler for `{}`",
                        describe_arg(bridge, state, first),
                        name
                    )));
                }
                let handler = pull_value(bridge, state, first);
                let f = if adding { event.add.clone() } else { event.remove.clone() };
                let mut ctx = CallContext {
                    bridge,
                    state,
                    owner: &owner,
                    receiver: receiver.clone(),
                    type_args: &[],
                };
                f(&mut ctx, handler).map_err(DispatchError::Host)?;
                Ok(0)
            },
        )
    };
    push_accessor_table(state, vec![("Add", accessor(true)), ("Remove", accessor(false))]);
}
