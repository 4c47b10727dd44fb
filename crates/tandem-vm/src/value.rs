//! Runtime values, tables and the short-string interner

use std::cell::{Cell, RefCell};
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use rustc_hash::{FxHashMap, FxHashSet};
use tandem_sdk::{NativeFunction, ScriptError, ScriptType, StrId, ThreadStatus};

use crate::ast::FunctionProto;
use crate::state::Vm;

/// Strings up to this many bytes are interned.
pub const SHORT_STRING_LIMIT: usize = 40;

/// Byte string value (shared, immutable)
pub type ScriptString = Rc<[u8]>;

/// Shared table
pub type TableRef = Rc<RefCell<Table>>;

/// Mutable variable cell shared between a frame and the closures capturing it
pub type Slot = Rc<RefCell<ScriptValue>>;

/// Builtin implemented directly against the VM (bypasses the stack ABI)
pub type BuiltinFn = fn(&mut Vm, Vec<ScriptValue>) -> Result<Vec<ScriptValue>, ScriptError>;

/// A script-level value
#[derive(Clone, Default)]
pub enum ScriptValue {
    /// nil
    #[default]
    Nil,
    /// true/false
    Boolean(bool),
    /// 64-bit integer
    Integer(i64),
    /// 64-bit float
    Number(f64),
    /// Byte string
    String(ScriptString),
    /// Table
    Table(TableRef),
    /// Callable
    Function(Rc<Function>),
    /// Full userdata
    UserData(Rc<UserData>),
    /// Raw address
    LightUserData(usize),
    /// Coroutine
    Thread(Rc<Thread>),
}

/// Callable objects
pub enum Function {
    /// Script closure
    Script(Rc<Closure>),
    /// Host function speaking the stack ABI
    Native(NativeFunction),
    /// Base library function
    Builtin(&'static str, BuiltinFn),
}

/// A script function instance with its captured variables
pub struct Closure {
    /// Compiled body
    pub proto: Rc<FunctionProto>,
    /// Captured variable cells, indexed by the proto's upvalue list
    pub upvalues: Vec<Slot>,
}

/// Userdata dropped while its metatable carried `__gc`, awaiting finalization
pub type Finalizers = RefCell<Vec<(u64, TableRef)>>;

/// Full userdata: an opaque payload plus a metatable
pub struct UserData {
    /// Host-defined payload
    pub payload: u64,
    /// Metatable driving indexing/calls
    pub metatable: RefCell<Option<TableRef>>,
    /// Set when the metatable had `__gc` at `setmetatable` time
    pub finalizer: RefCell<Option<Weak<Finalizers>>>,
}

impl UserData {
    /// Userdata with no metatable
    pub fn new(payload: u64) -> Self {
        Self {
            payload,
            metatable: RefCell::new(None),
            finalizer: RefCell::new(None),
        }
    }
}

impl Drop for UserData {
    fn drop(&mut self) {
        let queue = self.finalizer.get_mut().take().and_then(|queue| queue.upgrade());
        if let (Some(queue), Some(metatable)) = (queue, self.metatable.get_mut().take()) {
            queue.borrow_mut().push((self.payload, metatable));
        }
    }
}

/// A coroutine that runs its body to completion when resumed
pub struct Thread {
    /// Body
    pub function: ScriptValue,
    /// Lifecycle state
    pub status: Cell<ThreadStatus>,
}

impl ScriptValue {
    /// ABI type of this value
    pub fn script_type(&self) -> ScriptType {
        match self {
            ScriptValue::Nil => ScriptType::Nil,
            ScriptValue::Boolean(_) => ScriptType::Boolean,
            ScriptValue::Integer(_) | ScriptValue::Number(_) => ScriptType::Number,
            ScriptValue::String(_) => ScriptType::String,
            ScriptValue::Table(_) => ScriptType::Table,
            ScriptValue::Function(_) => ScriptType::Function,
            ScriptValue::UserData(_) => ScriptType::UserData,
            ScriptValue::LightUserData(_) => ScriptType::LightUserData,
            ScriptValue::Thread(_) => ScriptType::Thread,
        }
    }

    /// Name reported by `type()`
    pub fn type_name(&self) -> &'static str {
        self.script_type().name()
    }

    /// Lua truthiness
    pub fn is_truthy(&self) -> bool {
        !matches!(self, ScriptValue::Nil | ScriptValue::Boolean(false))
    }

    /// Whether this is nil
    pub fn is_nil(&self) -> bool {
        matches!(self, ScriptValue::Nil)
    }

    /// Float view of a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Integer(i) => Some(*i as f64),
            ScriptValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integer view of a number (floats must be integral and in range)
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ScriptValue::Integer(i) => Some(*i),
            ScriptValue::Number(n) => float_to_integer(*n),
            _ => None,
        }
    }

    /// Bytes of a string value
    pub fn as_bytes(&self) -> Option<&ScriptString> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Address used for identity display and hashing of reference values
    pub fn identity(&self) -> Option<usize> {
        match self {
            ScriptValue::Table(t) => Some(Rc::as_ptr(t) as *const u8 as usize),
            ScriptValue::Function(f) => Some(Rc::as_ptr(f) as *const u8 as usize),
            ScriptValue::UserData(u) => Some(Rc::as_ptr(u) as *const u8 as usize),
            ScriptValue::Thread(t) => Some(Rc::as_ptr(t) as *const u8 as usize),
            ScriptValue::LightUserData(p) => Some(*p),
            _ => None,
        }
    }

    /// Metatable of a table or userdata
    pub fn metatable(&self) -> Option<TableRef> {
        match self {
            ScriptValue::Table(t) => t.borrow().metatable.clone(),
            ScriptValue::UserData(u) => u.metatable.borrow().clone(),
            _ => None,
        }
    }

    /// Primitive equality: numbers by value, strings by content, references by identity
    pub fn raw_equals(&self, other: &ScriptValue) -> bool {
        match (self, other) {
            (ScriptValue::Nil, ScriptValue::Nil) => true,
            (ScriptValue::Boolean(a), ScriptValue::Boolean(b)) => a == b,
            (ScriptValue::Integer(a), ScriptValue::Integer(b)) => a == b,
            (ScriptValue::Number(a), ScriptValue::Number(b)) => a == b,
            (ScriptValue::Integer(a), ScriptValue::Number(b))
            | (ScriptValue::Number(b), ScriptValue::Integer(a)) => (*a as f64) == *b && float_to_integer(*b) == Some(*a),
            (ScriptValue::String(a), ScriptValue::String(b)) => Rc::ptr_eq(a, b) || a[..] == b[..],
            (ScriptValue::LightUserData(a), ScriptValue::LightUserData(b)) => a == b,
            _ => match (self.identity(), other.identity()) {
                (Some(a), Some(b)) => a == b && self.script_type() == other.script_type(),
                _ => false,
            },
        }
    }
}

/// Exact float → integer conversion
pub fn float_to_integer(n: f64) -> Option<i64> {
    if n.fract() == 0.0 && n >= -9_223_372_036_854_775_808.0 && n < 9_223_372_036_854_775_808.0 {
        Some(n as i64)
    } else {
        None
    }
}

// ============================================================================
// Table keys
// ============================================================================

/// Normalised table key: integral floats collapse to integers
#[derive(Clone)]
pub struct Key(ScriptValue);

impl Key {
    /// Normalise a value into a key; nil and NaN are rejected
    pub fn new(value: ScriptValue) -> Result<Self, &'static str> {
        match value {
            ScriptValue::Nil => Err("table index is nil"),
            ScriptValue::Number(n) if n.is_nan() => Err("table index is NaN"),
            ScriptValue::Number(n) => match float_to_integer(n) {
                Some(i) => Ok(Key(ScriptValue::Integer(i))),
                None => Ok(Key(ScriptValue::Number(n))),
            },
            other => Ok(Key(other)),
        }
    }

    /// The key as a value
    pub fn value(&self) -> &ScriptValue {
        &self.0
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0.raw_equals(&other.0)
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            ScriptValue::Nil => 0u8.hash(state),
            ScriptValue::Boolean(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            ScriptValue::Integer(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            ScriptValue::Number(n) => {
                3u8.hash(state);
                n.to_bits().hash(state);
            }
            ScriptValue::String(s) => {
                4u8.hash(state);
                s[..].hash(state);
            }
            other => {
                5u8.hash(state);
                other.identity().hash(state);
            }
        }
    }
}

// ============================================================================
// Table
// ============================================================================

/// Insertion-ordered hash table.
///
/// Removing a key leaves a nil tombstone in place so that `next` stays valid
/// while a traversal assigns to existing fields.
#[derive(Default)]
pub struct Table {
    entries: Vec<(Key, ScriptValue)>,
    index: FxHashMap<Key, usize>,
    /// Metatable
    pub metatable: Option<TableRef>,
}

impl Table {
    /// Create an empty table with capacity hints
    pub fn with_capacity(narr: usize, nrec: usize) -> Self {
        let capacity = narr + nrec;
        Self {
            entries: Vec::with_capacity(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            metatable: None,
        }
    }

    /// Raw read
    pub fn get(&self, key: &ScriptValue) -> ScriptValue {
        match Key::new(key.clone()) {
            Ok(key) => self.get_key(&key),
            Err(_) => ScriptValue::Nil,
        }
    }

    fn get_key(&self, key: &Key) -> ScriptValue {
        match self.index.get(key) {
            Some(&slot) => self.entries[slot].1.clone(),
            None => ScriptValue::Nil,
        }
    }

    /// Raw read of an integer key
    pub fn get_int(&self, n: i64) -> ScriptValue {
        self.get_key(&Key(ScriptValue::Integer(n)))
    }

    /// Raw read of a string key
    pub fn get_str(&self, name: &[u8]) -> ScriptValue {
        self.get_key(&Key(ScriptValue::String(Rc::from(name))))
    }

    /// Raw write; fails for nil/NaN keys
    pub fn set(&mut self, key: ScriptValue, value: ScriptValue) -> Result<(), &'static str> {
        let key = Key::new(key)?;
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot].1 = value,
            None => {
                if value.is_nil() {
                    return Ok(());
                }
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
        Ok(())
    }

    /// Raw write of an integer key
    pub fn set_int(&mut self, n: i64, value: ScriptValue) {
        // integer keys are never nil or NaN
        let _ = self.set(ScriptValue::Integer(n), value);
    }

    /// Border of the sequence part: largest n with t[1..=n] all non-nil
    pub fn len(&self) -> usize {
        let mut n = 0i64;
        while !self.get_int(n + 1).is_nil() {
            n += 1;
        }
        n as usize
    }

    /// Whether the table holds no non-nil values
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|(_, v)| v.is_nil())
    }

    /// Traversal step: the pair following `key` (nil starts the traversal)
    pub fn next(&self, key: &ScriptValue) -> Result<Option<(ScriptValue, ScriptValue)>, &'static str> {
        let start = if key.is_nil() {
            0
        } else {
            let key = Key::new(key.clone())?;
            match self.index.get(&key) {
                Some(&slot) => slot + 1,
                None => return Err("invalid key to 'next'"),
            }
        };
        Ok(self.entries[start.min(self.entries.len())..]
            .iter()
            .find(|(_, v)| !v.is_nil())
            .map(|(k, v)| (k.value().clone(), v.clone())))
    }
}

// ============================================================================
// String interner
// ============================================================================

/// Interns short strings so equal contents share one allocation.
///
/// Interned strings are kept for the life of the VM, which makes their
/// address a stable identity.
#[derive(Default)]
pub struct StringInterner {
    strings: FxHashSet<ScriptString>,
}

impl StringInterner {
    /// Create an empty interner
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce a string value, sharing storage for short strings
    pub fn string(&mut self, bytes: &[u8]) -> ScriptString {
        if bytes.len() > SHORT_STRING_LIMIT {
            return Rc::from(bytes);
        }
        if let Some(existing) = self.strings.get(bytes) {
            return existing.clone();
        }
        let s: ScriptString = Rc::from(bytes);
        self.strings.insert(s.clone());
        s
    }

    /// Identity of an interned string with these contents
    pub fn id(&self, bytes: &[u8]) -> Option<StrId> {
        self.strings
            .get(bytes)
            .map(|s| StrId::new(Rc::as_ptr(s) as *const u8 as usize))
    }

    /// Number of interned strings
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether nothing has been interned
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
