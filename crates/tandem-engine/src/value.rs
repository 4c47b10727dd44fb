//! Value Representation
//!
//! [`Value`] holds anything that can cross the boundary: a script primitive,
//! a handle to an object owned by the embedded runtime, a host object, or a
//! set of host types sharing a name.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use rustc_hash::FxHashSet;
use tandem_sdk::RegistryKey;

use crate::environment::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::handles::{ScriptFunction, ScriptTable, ScriptThread};
use crate::host::{HostObjectRef, HostTypeRef, HostValue};
use crate::marshal::u64_as_number;

/// Script string bytes (not necessarily UTF-8)
pub type ScriptString = Rc<[u8]>;

// ============================================================================
// Embedded objects
// ============================================================================

/// Kind of object owned by the embedded runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbeddedKind {
    Table,
    Function,
    Thread,
    UserData,
}

impl EmbeddedKind {
    pub const fn name(self) -> &'static str {
        match self {
            EmbeddedKind::Table => "table",
            EmbeddedKind::Function => "function",
            EmbeddedKind::Thread => "thread",
            EmbeddedKind::UserData => "userdata",
        }
    }
}

struct EmbeddedRef {
    kind: EmbeddedKind,
    key: RegistryKey,
    address: usize,
    owner: Weak<Bridge>,
}

impl Drop for EmbeddedRef {
    fn drop(&mut self) {
        if let Some(bridge) = self.owner.upgrade() {
            bridge.queue_release(self.key);
        }
    }
}

/// Handle to a table, function, thread or userdata owned by the embedded
/// runtime. Anchored in its registry until the last clone is dropped.
#[derive(Clone)]
pub struct EmbeddedObject {
    inner: Rc<EmbeddedRef>,
}

impl EmbeddedObject {
    pub(crate) fn new(kind: EmbeddedKind, key: RegistryKey, address: usize, owner: Weak<Bridge>) -> Self {
        Self {
            inner: Rc::new(EmbeddedRef {
                kind,
                key,
                address,
                owner,
            }),
        }
    }

    #[inline]
    pub fn kind(&self) -> EmbeddedKind {
        self.inner.kind
    }

    #[inline]
    pub fn registry_key(&self) -> RegistryKey {
        self.inner.key
    }

    /// The live environment owning this object
    pub(crate) fn owner(&self) -> BridgeResult<Rc<Bridge>> {
        match self.inner.owner.upgrade() {
            Some(bridge) if bridge.is_alive() => Ok(bridge),
            _ => Err(BridgeError::Disposed),
        }
    }

    pub(crate) fn belongs_to(&self, bridge: &Bridge) -> bool {
        std::ptr::eq(self.inner.owner.as_ptr(), bridge)
    }
}

impl PartialEq for EmbeddedObject {
    fn eq(&self, other: &Self) -> bool {
        self.inner.kind == other.inner.kind
            && self.inner.address == other.inner.address
            && Weak::ptr_eq(&self.inner.owner, &other.inner.owner)
    }
}

impl Eq for EmbeddedObject {}

impl Hash for EmbeddedObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.kind.hash(state);
        self.inner.address.hash(state);
    }
}

impl fmt::Debug for EmbeddedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: 0x{:x}", self.inner.kind.name(), self.inner.address)
    }
}

// ============================================================================
// Host type sets
// ============================================================================

/// Host types sharing a name, told apart by generic arity.
///
/// Holds at most one type that is not an open generic definition plus any
/// number of open definitions; no two entries share a generic arity.
#[derive(Clone)]
pub struct HostTypeSet {
    types: Rc<[HostTypeRef]>,
}

impl HostTypeSet {
    /// Validate and build a set
    pub fn new<I, T>(types: I) -> BridgeResult<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<Option<HostTypeRef>>,
    {
        let mut collected = Vec::new();
        let mut arities = FxHashSet::default();
        for (n, ty) in types.into_iter().enumerate() {
            let ty = ty
                .into()
                .ok_or_else(|| BridgeError::argument(format!("type set entry {} is null", n)))?;
            if !arities.insert(ty.generic_arity()) {
                return Err(BridgeError::argument(format!(
                    "type set already has a type with generic arity {} (`{}`)",
                    ty.generic_arity(),
                    ty.full_name()
                )));
            }
            collected.push(ty);
        }
        if collected.is_empty() {
            return Err(BridgeError::argument("type set cannot be empty"));
        }
        Ok(Self {
            types: collected.into(),
        })
    }

    /// Set holding one type
    pub fn single(ty: &HostTypeRef) -> Self {
        Self {
            types: Rc::from(vec![ty.clone()]),
        }
    }

    pub fn types(&self) -> &[HostTypeRef] {
        &self.types
    }

    /// The type that is not an open generic definition
    pub fn non_generic(&self) -> Option<&HostTypeRef> {
        self.types.iter().find(|t| !t.is_generic_definition())
    }

    /// The open generic definition taking `arity` type arguments
    pub fn by_arity(&self, arity: usize) -> Option<&HostTypeRef> {
        self.types.iter().find(|t| t.generic_arity() == arity)
    }

    pub fn has_generic_definitions(&self) -> bool {
        self.types.iter().any(|t| t.is_generic_definition())
    }

    /// Type whose static members the set exposes
    pub fn primary(&self) -> &HostTypeRef {
        self.non_generic().unwrap_or(&self.types[0])
    }

    /// Union of two sets, failing on an arity clash
    pub fn merge(&self, other: &HostTypeSet) -> BridgeResult<Self> {
        let mut types: Vec<HostTypeRef> = self.types.to_vec();
        for ty in other.types.iter() {
            if !types.iter().any(|t| t.id() == ty.id()) {
                types.push(ty.clone());
            }
        }
        Self::new(types)
    }

    pub fn contains(&self, ty: &HostTypeRef) -> bool {
        self.types.iter().any(|t| t.id() == ty.id())
    }

    pub(crate) fn key(&self) -> Vec<u32> {
        self.types.iter().map(|t| t.id().raw()).collect()
    }
}

impl PartialEq for HostTypeSet {
    fn eq(&self, other: &Self) -> bool {
        self.types.len() == other.types.len() && self.types.iter().zip(other.types.iter()).all(|(a, b)| a.id() == b.id())
    }
}

impl Eq for HostTypeSet {}

impl Hash for HostTypeSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for ty in self.types.iter() {
            ty.id().hash(state);
        }
    }
}

impl fmt::Debug for HostTypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.types.iter().map(|t| t.full_name())).finish()
    }
}

impl fmt::Display for HostTypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.primary().full_name())
    }
}

// ============================================================================
// Value
// ============================================================================

/// A value that may live in either runtime
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    /// Raw address (light userdata)
    Pointer(usize),
    Integer(i64),
    Number(f64),
    String(ScriptString),
    /// Table, function, thread or foreign userdata owned by the embedded runtime
    Embedded(EmbeddedObject),
    HostObject(HostObjectRef),
    HostTypes(HostTypeSet),
}

impl Value {
    // ========================================================================
    // Construction
    // ========================================================================

    #[inline]
    pub fn from_boolean(b: bool) -> Self {
        Value::Boolean(b)
    }

    #[inline]
    pub fn from_integer(i: i64) -> Self {
        Value::Integer(i)
    }

    #[inline]
    pub fn from_number(n: f64) -> Self {
        Value::Number(n)
    }

    #[inline]
    pub fn from_pointer(addr: usize) -> Self {
        Value::Pointer(addr)
    }

    /// String from UTF-8 text
    pub fn from_string(s: &str) -> Self {
        Value::String(Rc::from(s.as_bytes()))
    }

    /// String from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Value::String(Rc::from(bytes))
    }

    /// String, or nil for `None`
    pub fn from_optional_string(s: Option<&str>) -> Self {
        s.map_or(Value::Nil, Value::from_string)
    }

    /// Host object, or nil for `None`
    pub fn from_host_object(object: impl Into<Option<HostObjectRef>>) -> Self {
        object.into().map_or(Value::Nil, Value::HostObject)
    }

    /// Type set; fails on an empty set, a `None` entry or an arity clash
    pub fn from_host_types<I, T>(types: I) -> BridgeResult<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<Option<HostTypeRef>>,
    {
        HostTypeSet::new(types).map(Value::HostTypes)
    }

    pub fn from_embedded(object: EmbeddedObject) -> Self {
        Value::Embedded(object)
    }

    /// Convert a host member value; structs become fresh boxed copies.
    ///
    /// Fails on a u64 that no script number holds exactly.
    pub fn from_host_value(value: HostValue) -> BridgeResult<Self> {
        let value = match value {
            HostValue::Null => Value::Nil,
            HostValue::Bool(b) => Value::Boolean(b),
            HostValue::Char(c) => Value::from_string(c.encode_utf8(&mut [0u8; 4])),
            HostValue::U64(v) => match i64::try_from(v) {
                Ok(i) => Value::Integer(i),
                Err(_) => Value::Number(u64_as_number(v).ok_or_else(|| {
                    BridgeError::argument(format!("u64 value {} has no exact script representation", v))
                })?),
            },
            HostValue::F32(v) => Value::Number(v as f64),
            HostValue::F64(v) => Value::Number(v),
            HostValue::String(s) => Value::from_string(&s),
            HostValue::Pointer(p) => Value::Pointer(p),
            HostValue::Object(obj) => Value::HostObject(obj.boxed_copy()),
            HostValue::Type(ty) => Value::HostTypes(HostTypeSet::single(&ty)),
            HostValue::Script(value) => value,
            other => other.as_i64().map_or(Value::Nil, Value::Integer),
        };
        Ok(value)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Variant name, for messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Pointer(_) => "pointer",
            Value::Integer(_) => "integer",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Embedded(obj) => obj.kind().name(),
            Value::HostObject(_) => "host object",
            Value::HostTypes(_) => "host types",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Value::Boolean(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Value::Pointer(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Value::Integer(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self, Value::Embedded(_))
    }

    pub fn is_host_object(&self) -> bool {
        matches!(self, Value::HostObject(_))
    }

    pub fn is_host_types(&self) -> bool {
        matches!(self, Value::HostTypes(_))
    }

    // ========================================================================
    // Conversion
    // ========================================================================

    fn cast_error(&self, expected: &'static str) -> BridgeError {
        BridgeError::InvalidCast {
            expected,
            found: self.type_name(),
        }
    }

    pub fn to_boolean(&self) -> BridgeResult<bool> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(other.cast_error("boolean")),
        }
    }

    pub fn to_pointer(&self) -> BridgeResult<usize> {
        match self {
            Value::Pointer(p) => Ok(*p),
            other => Err(other.cast_error("pointer")),
        }
    }

    pub fn to_integer(&self) -> BridgeResult<i64> {
        match self {
            Value::Integer(i) => Ok(*i),
            other => Err(other.cast_error("integer")),
        }
    }

    pub fn to_number(&self) -> BridgeResult<f64> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(other.cast_error("number")),
        }
    }

    pub fn to_bytes(&self) -> BridgeResult<&[u8]> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(other.cast_error("string")),
        }
    }

    /// String contents as UTF-8 text
    pub fn to_str(&self) -> BridgeResult<&str> {
        let bytes = self.to_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| BridgeError::InvalidCast {
            expected: "string",
            found: "non-UTF-8 string",
        })
    }

    pub fn to_embedded(&self) -> BridgeResult<&EmbeddedObject> {
        match self {
            Value::Embedded(obj) => Ok(obj),
            other => Err(other.cast_error("embedded object")),
        }
    }

    /// The host object; a struct yields a fresh copy, a class the same reference
    pub fn to_host_object(&self) -> BridgeResult<HostObjectRef> {
        match self {
            Value::HostObject(obj) => Ok(obj.boxed_copy()),
            other => Err(other.cast_error("host object")),
        }
    }

    pub fn to_host_types(&self) -> BridgeResult<&HostTypeSet> {
        match self {
            Value::HostTypes(set) => Ok(set),
            other => Err(other.cast_error("host types")),
        }
    }

    pub fn to_table(&self) -> BridgeResult<ScriptTable> {
        match self {
            Value::Embedded(obj) if obj.kind() == EmbeddedKind::Table => Ok(ScriptTable::new(obj.clone())),
            other => Err(other.cast_error("table")),
        }
    }

    pub fn to_function(&self) -> BridgeResult<ScriptFunction> {
        match self {
            Value::Embedded(obj) if obj.kind() == EmbeddedKind::Function => Ok(ScriptFunction::new(obj.clone())),
            other => Err(other.cast_error("function")),
        }
    }

    pub fn to_thread(&self) -> BridgeResult<ScriptThread> {
        match self {
            Value::Embedded(obj) if obj.kind() == EmbeddedKind::Thread => Ok(ScriptThread::new(obj.clone())),
            other => Err(other.cast_error("thread")),
        }
    }

    /// The host view of this value (total)
    pub fn to_host_value(&self) -> HostValue {
        match self {
            Value::Nil => HostValue::Null,
            Value::Boolean(b) => HostValue::Bool(*b),
            Value::Pointer(p) => HostValue::Pointer(*p),
            Value::Integer(i) => HostValue::I64(*i),
            Value::Number(n) => HostValue::F64(*n),
            Value::String(s) => match std::str::from_utf8(s) {
                Ok(text) => HostValue::String(text.to_string()),
                Err(_) => HostValue::Script(self.clone()),
            },
            Value::HostObject(obj) => HostValue::Object(obj.boxed_copy()),
            Value::HostTypes(set) if set.types().len() == 1 => HostValue::Type(set.primary().clone()),
            other => HostValue::Script(other.clone()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Pointer(a), Value::Pointer(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Embedded(a), Value::Embedded(b)) => a == b,
            (Value::HostObject(a), Value::HostObject(b)) => Rc::ptr_eq(a, b),
            (Value::HostTypes(a), Value::HostTypes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Nil => {}
            Value::Boolean(b) => b.hash(state),
            Value::Pointer(p) => p.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Number(n) => n.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Embedded(obj) => obj.hash(state),
            Value::HostObject(obj) => Rc::as_ptr(obj).hash(state),
            Value::HostTypes(set) => set.hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Boolean(b) => write!(f, "Boolean({})", b),
            Value::Pointer(p) => write!(f, "Pointer(0x{:x})", p),
            Value::Integer(i) => write!(f, "Integer({})", i),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::String(s) => write!(f, "String({:?})", String::from_utf8_lossy(s)),
            Value::Embedded(obj) => write!(f, "Embedded({:?})", obj),
            Value::HostObject(obj) => write!(f, "HostObject({})", obj.host_type().full_name()),
            Value::HostTypes(set) => write!(f, "HostTypes({:?})", set),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::from_string(s)
    }
}

impl From<HostObjectRef> for Value {
    fn from(obj: HostObjectRef) -> Self {
        Value::HostObject(obj)
    }
}
