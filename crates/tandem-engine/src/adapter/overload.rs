//! Overload selection
//!
//! Every candidate is tried against the call's arguments. A candidate that
//! accepts them gets a cost: first by how it consumes the argument count
//! (exact arity, then trailing defaults, then a variadic tail), then by how
//! closely each argument matches its parameter type. The cheapest candidate
//! wins; a tie for cheapest is an ambiguous call.

use tandem_sdk::{ScriptState, ScriptType};

use crate::environment::Bridge;
use crate::error::{DispatchError, DispatchResult};
use crate::host::{HostObject, HostTypeRef, HostValue, ParameterInfo, Primitive, TypeKind};
use crate::marshal::{describe_args, try_load};
use crate::registry::Anchored;

const TIER_COST: u32 = 1000;

/// A parameter list to match arguments against
pub(crate) struct Candidate<'a> {
    pub params: &'a [ParameterInfo],
    /// Type arguments for `TypeRef::MethodParam` parameters
    pub type_args: &'a [HostTypeRef],
}

/// The chosen candidate and its converted arguments
#[derive(Debug)]
pub(crate) struct Selection {
    pub index: usize,
    pub args: Vec<HostValue>,
}

/// Pick the candidate matching the `count` arguments starting at `first`
pub(crate) fn select(
    bridge: &Bridge,
    state: &mut dyn ScriptState,
    owner: &HostTypeRef,
    candidates: &[Candidate<'_>],
    first: i32,
    count: usize,
    name: &str,
) -> DispatchResult<Selection> {
    let mut best: Option<(u32, Selection)> = None;
    let mut tied = false;

    for (index, candidate) in candidates.iter().enumerate() {
        let Some((cost, args)) = match_candidate(bridge, state, owner, candidate, first, count) else {
            continue;
        };
        match best.as_ref().map(|(c, _)| *c) {
            Some(best_cost) if cost > best_cost => {}
            Some(best_cost) if cost == best_cost => tied = true,
            _ => {
                best = Some((cost, Selection { index, args }));
                tied = false;
            }
        }
    }

    match best {
        Some(_) if tied => Err(DispatchError::Resolution(format!(
            "ambiguous call to `{}` with ({})",
            name,
            describe_args(bridge, state, first, count)
        ))),
        Some((_, selection)) => Ok(selection),
        None => Err(DispatchError::Resolution(format!(
            "no overload of `{}` accepts ({})",
            name,
            describe_args(bridge, state, first, count)
        ))),
    }
}

fn match_candidate(
    bridge: &Bridge,
    state: &mut dyn ScriptState,
    owner: &HostTypeRef,
    candidate: &Candidate<'_>,
    first: i32,
    count: usize,
) -> Option<(u32, Vec<HostValue>)> {
    let params = candidate.params;
    let variadic = params.last().is_some_and(|p| p.is_params);
    let fixed = if variadic { params.len() - 1 } else { params.len() };

    let tier = if !variadic && count == fixed {
        0
    } else if count < fixed && params[count..fixed].iter().all(|p| p.default.is_some()) {
        1
    } else if variadic && count >= fixed {
        2
    } else {
        return None;
    };

    let mut cost = tier * TIER_COST;
    let mut args = Vec::with_capacity(params.len());
    for (n, param) in params[..fixed.min(count)].iter().enumerate() {
        let idx = first + n as i32;
        let target = param.ty.resolve(owner, candidate.type_args)?;
        args.push(try_load(bridge, state, idx, &target)?);
        cost += conversion_cost(bridge, state, idx, &target);
    }
    for param in params.iter().take(fixed).skip(count) {
        args.push(param.default.clone()?);
    }
    if variadic {
        let array = params[fixed].ty.resolve(owner, candidate.type_args)?;
        let element = array.array_element()?.0.clone();
        let mut items = Vec::new();
        for n in fixed..count {
            let idx = first + n as i32;
            items.push(try_load(bridge, state, idx, &element)?);
            cost += conversion_cost(bridge, state, idx, &element);
        }
        args.push(HostValue::Object(HostObject::array(&element, items)));
    }
    Some((cost, args))
}

/// How far the value at `idx` is from an exact match for `target`
fn conversion_cost(bridge: &Bridge, state: &dyn ScriptState, idx: i32, target: &HostTypeRef) -> u32 {
    let found = state.type_of(idx);
    match target.kind() {
        TypeKind::Primitive(Primitive::Object) => 5,
        TypeKind::Primitive(Primitive::Value) => 4,
        TypeKind::Primitive(p) => match (found, *p) {
            (ScriptType::Number, Primitive::I64) if state.is_integer(idx) => 0,
            (ScriptType::Number, Primitive::I32) if state.is_integer(idx) => 1,
            (ScriptType::Number, Primitive::F64 | Primitive::F32) if state.is_integer(idx) => 3,
            (ScriptType::Number, _) if state.is_integer(idx) => 2,
            (ScriptType::Number, Primitive::F64) => 0,
            (ScriptType::Number, Primitive::F32) => 1,
            (ScriptType::Number, _) => 3,
            (ScriptType::String, Primitive::String) => 0,
            (ScriptType::String, Primitive::Char) => 1,
            (ScriptType::Nil | ScriptType::None, _) => 2,
            _ => 0,
        },
        TypeKind::Enum => 2,
        _ => match bridge.registry.anchored_at(state, idx) {
            Some(Anchored::Object(obj)) => obj.host_type().distance_to(target).unwrap_or(0),
            _ => 2,
        },
    }
}

