//! Display, length, equality, operator and finalizer adapters

use std::rc::Rc;

use tandem_sdk::ScriptState;

use super::call::invoke;
use super::overload::{self, Candidate};
use super::{receiver_object, receiver_types, AdapterBody};
use crate::environment::Bridge;
use crate::error::{DispatchError, DispatchResult};
use crate::host::{HostArray, HostTypeRef, HostValue, Operator};
use crate::logging::log_unanchored;
use crate::marshal::push_host;
use crate::members::MemberMode;
use crate::registry::Anchored;

/// `tostring(obj)` and `tostring(Type)`
pub(crate) fn tostring_adapter(ty: HostTypeRef, mode: MemberMode) -> AdapterBody {
    Rc::new(move |bridge: &Bridge, state: &mut dyn ScriptState| -> DispatchResult<usize> {
        let text = match mode {
            MemberMode::Instance => receiver_object(bridge, state, 1, &ty)?.describe(),
            MemberMode::Static => format!("type: {}", receiver_types(bridge, state, 1, &ty)?),
        };
        let bytes = bridge.config.encoding.encode(&text);
        state.push_bytes(&bytes);
        Ok(1)
    })
}

/// `#arr`: total element count
pub(crate) fn len_adapter(ty: HostTypeRef) -> AdapterBody {
    Rc::new(move |bridge: &Bridge, state: &mut dyn ScriptState| -> DispatchResult<usize> {
        let target = receiver_object(bridge, state, 1, &ty)?;
        let len = target
            .with(|array: &HostArray| array.len())
            .ok_or_else(|| DispatchError::Access(format!("attempt to get length of `{}`", ty.full_name())))?;
        state.push_integer(len as i64);
        Ok(1)
    })
}

/// `a == b`: identity, then `op_Equality` overloads
pub(crate) fn eq_adapter(ty: HostTypeRef) -> AdapterBody {
    Rc::new(move |bridge: &Bridge, state: &mut dyn ScriptState| -> DispatchResult<usize> {
        let (a, b) = (bridge.registry.anchored_at(state, 1), bridge.registry.anchored_at(state, 2));
        let equal = match (a, b) {
            (Some(Anchored::Object(a)), Some(Anchored::Object(b))) if Rc::ptr_eq(&a, &b) => true,
            (Some(Anchored::Types(a)), Some(Anchored::Types(b))) => a == b,
            (Some(Anchored::Object(_)), Some(Anchored::Object(_))) => {
                let overloads = ty.operators(Operator::Eq);
                !overloads.is_empty() && truthy(&apply(bridge, state, &ty, Operator::Eq, &overloads)?)
            }
            _ => false,
        };
        state.push_boolean(equal);
        Ok(1)
    })
}

/// Arithmetic, comparison, concatenation and negation overloads
pub(crate) fn operator_adapter(ty: HostTypeRef, op: Operator) -> AdapterBody {
    Rc::new(move |bridge: &Bridge, state: &mut dyn ScriptState| -> DispatchResult<usize> {
        let overloads = ty.operators(op);
        let result = apply(bridge, state, &ty, op, &overloads)?;
        push_host(bridge, state, &result)?;
        Ok(1)
    })
}

fn apply(
    bridge: &Bridge,
    state: &mut dyn ScriptState,
    ty: &HostTypeRef,
    op: Operator,
    overloads: &[Rc<crate::host::MethodInfo>],
) -> DispatchResult<HostValue> {
    let arity = if op.is_unary() { 1 } else { 2 };
    let candidates: Vec<Candidate<'_>> = overloads
        .iter()
        .map(|m| Candidate {
            params: &m.params,
            type_args: &[],
        })
        .collect();
    let name = format!("{}.{}", ty.full_name(), op.method_name());
    let chosen = overload::select(bridge, state, ty, &candidates, 1, arity, &name)?;
    invoke(bridge, state, ty, &overloads[chosen.index].invoke, None, &[], chosen.args)
}

fn truthy(value: &HostValue) -> bool {
    !matches!(value, HostValue::Null | HostValue::Bool(false))
}

/// Collected userdata: release its anchor slot
pub(crate) fn gc_adapter() -> AdapterBody {
    Rc::new(|bridge: &Bridge, state: &mut dyn ScriptState| -> DispatchResult<usize> {
        let Some(payload) = state.to_userdata(1) else {
            return Ok(0);
        };
        let released = bridge.registry.anchors.borrow_mut().release_payload(payload);
        if let Some(key) = released {
            state.unreference(key);
            log_unanchored(payload, bridge.registry.anchored_count());
        }
        Ok(0)
    })
}
