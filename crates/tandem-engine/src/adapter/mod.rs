//! Adapter Synthesis
//!
//! An adapter is a native function installed in the metatable of an
//! anchored host value. Adapters are built once per `(type, mode, kind)` and
//! cached in the environment's registry; every anchored value of that type
//! shares them.
//!
//! | kind       | instance                          | static                        |
//! |------------|-----------------------------------|-------------------------------|
//! | `Index`    | members, array elements, indexers | static members, nested types  |
//! | `NewIndex` | fields, properties, indexers      | static fields and properties  |
//! | `Call`     | error                             | construction, generic closing |
//! | `Len`      | array length                      |                               |
//! | operators  | operator overloads                |                               |

pub(crate) mod call;
pub(crate) mod guard;
pub(crate) mod index;
pub(crate) mod ops;
pub(crate) mod overload;

use std::rc::Rc;

use tandem_sdk::{NativeFunction, ScriptState};

use crate::environment::Bridge;
use crate::error::{DispatchError, DispatchResult};
use crate::host::{HostObjectRef, HostTypeRef, Operator};
use crate::marshal::describe_arg;
use crate::members::MemberMode;
use crate::registry::Anchored;
use crate::value::HostTypeSet;

/// The metatable event an adapter serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    Index,
    NewIndex,
    Call,
    ToString,
    Len,
    Eq,
    Binary(Operator),
    Unary(Operator),
    /// Releases the anchor slot of a collected userdata
    Gc,
}

impl AdapterKind {
    pub const fn event(self) -> &'static str {
        match self {
            AdapterKind::Index => "__index",
            AdapterKind::NewIndex => "__newindex",
            AdapterKind::Call => "__call",
            AdapterKind::ToString => "__tostring",
            AdapterKind::Len => "__len",
            AdapterKind::Eq => "__eq",
            AdapterKind::Binary(op) | AdapterKind::Unary(op) => op.event(),
            AdapterKind::Gc => "__gc",
        }
    }
}

/// Body of an adapter, run inside [`guard::guarded`]
pub(crate) type AdapterBody = Rc<dyn Fn(&Bridge, &mut dyn ScriptState) -> DispatchResult<usize>>;

/// Adapters installed in the metatable of `(ty, mode)`
pub(crate) fn kinds_for(ty: &HostTypeRef, mode: MemberMode) -> Vec<AdapterKind> {
    let mut kinds = vec![
        AdapterKind::Index,
        AdapterKind::NewIndex,
        AdapterKind::Call,
        AdapterKind::ToString,
        AdapterKind::Eq,
        AdapterKind::Gc,
    ];
    if mode == MemberMode::Instance {
        if ty.is_array() {
            kinds.push(AdapterKind::Len);
        }
        for op in Operator::ALL {
            if op == Operator::Eq || ty.operators(op).is_empty() {
                continue;
            }
            kinds.push(if op.is_unary() {
                AdapterKind::Unary(op)
            } else {
                AdapterKind::Binary(op)
            });
        }
    }
    kinds
}

/// Build the adapter for `(ty, mode, kind)`
pub(crate) fn synthesize(ty: &HostTypeRef, mode: MemberMode, kind: AdapterKind) -> NativeFunction {
    let ty = ty.clone();
    let body: AdapterBody = match (mode, kind) {
        (_, AdapterKind::Index) => index::index_adapter(ty, mode),
        (_, AdapterKind::NewIndex) => index::newindex_adapter(ty, mode),
        (MemberMode::Static, AdapterKind::Call) => call::construct_adapter(ty),
        (MemberMode::Instance, AdapterKind::Call) => Rc::new(move |_: &Bridge, _: &mut dyn ScriptState| -> DispatchResult<usize> {
            Err(DispatchError::Access(format!(
                "attempt to call an instance of `{}`",
                ty.full_name()
            )))
        }),
        (_, AdapterKind::ToString) => ops::tostring_adapter(ty, mode),
        (_, AdapterKind::Len) => ops::len_adapter(ty),
        (_, AdapterKind::Eq) => ops::eq_adapter(ty),
        (_, AdapterKind::Binary(op)) | (_, AdapterKind::Unary(op)) => ops::operator_adapter(ty, op),
        (_, AdapterKind::Gc) => ops::gc_adapter(),
    };
    guard::guarded(body)
}

// ============================================================================
// Shared helpers
// ============================================================================

/// `Type.Name`
pub(crate) fn qualified(ty: &HostTypeRef, name: &str) -> String {
    format!("{}.{}", ty.full_name(), name)
}

/// The host object receiving an instance operation
pub(crate) fn receiver_object(
    bridge: &Bridge,
    state: &dyn ScriptState,
    idx: i32,
    ty: &HostTypeRef,
) -> DispatchResult<HostObjectRef> {
    match bridge.registry.anchored_at(state, idx) {
        Some(Anchored::Object(obj)) => Ok(obj),
        _ => Err(DispatchError::Resolution(format!(
            "expected `{}` instance, got {}",
            ty.full_name(),
            describe_arg(bridge, state, idx)
        ))),
    }
}

/// The type set receiving a static operation
pub(crate) fn receiver_types(
    bridge: &Bridge,
    state: &dyn ScriptState,
    idx: i32,
    ty: &HostTypeRef,
) -> DispatchResult<HostTypeSet> {
    match bridge.registry.anchored_at(state, idx) {
        Some(Anchored::Types(set)) => Ok(set),
        _ => Err(DispatchError::Resolution(format!(
            "expected type `{}`, got {}",
            ty.full_name(),
            describe_arg(bridge, state, idx)
        ))),
    }
}

/// Concrete types passed as `count` arguments starting at `first`, or
/// `None` unless every argument is a type object
pub(crate) fn type_args_at(
    bridge: &Bridge,
    state: &dyn ScriptState,
    first: i32,
    count: usize,
) -> Option<Vec<HostTypeRef>> {
    (0..count as i32)
        .map(|n| match bridge.registry.anchored_at(state, first + n) {
            Some(Anchored::Types(set)) => set.non_generic().cloned(),
            _ => None,
        })
        .collect()
}

/// Whether the value at `idx` is the host object `target`
pub(crate) fn is_same_object(bridge: &Bridge, state: &dyn ScriptState, idx: i32, target: &HostObjectRef) -> bool {
    matches!(bridge.registry.anchored_at(state, idx), Some(Anchored::Object(obj)) if Rc::ptr_eq(&obj, target))
}
