//! ScriptState trait — the embedded runtime's stack machine
//!
//! Defines the interface an embedded runtime implements. The bridge talks to
//! the runtime only through these operations, the same way a C host talks to
//! an interpreter through push/pull primitives on a value stack.
//!
//! # Stack indices
//!
//! Positive indices are absolute (1 is the first slot of the current frame),
//! negative indices are relative to the top (-1 is the top slot). Operations
//! taking an index never pop the value at that index.

use std::any::Any;
use std::rc::Rc;

use crate::error::ScriptResult;
use crate::types::{NativeFunction, RegistryKey, ScriptType, StrId, ThreadStatus};

/// Abstract embedded runtime state.
///
/// Implementations run single-threaded; a state is never shared between
/// threads and every call happens on the thread that owns it.
pub trait ScriptState {
    // ========================================================================
    // Stack
    // ========================================================================

    /// Number of slots in the current frame
    fn top(&self) -> i32;

    /// Grow (filling with nil) or shrink the current frame
    fn set_top(&mut self, idx: i32);

    /// Pop `n` slots
    fn pop(&mut self, n: i32) {
        let top = self.top();
        self.set_top(top - n);
    }

    /// Convert a relative index into an absolute one
    fn abs_index(&self, idx: i32) -> i32 {
        if idx > 0 {
            idx
        } else {
            self.top() + idx + 1
        }
    }

    /// Push a copy of the value at `idx`
    fn push_value(&mut self, idx: i32);

    /// Move the top value into position `idx`, shifting values up
    fn insert(&mut self, idx: i32);

    /// Remove the value at `idx`, shifting values down
    fn remove(&mut self, idx: i32);

    /// Type of the value at `idx`
    fn type_of(&self, idx: i32) -> ScriptType;

    /// Whether the value at `idx` is a number with integer representation
    fn is_integer(&self, idx: i32) -> bool;

    // ========================================================================
    // Push
    // ========================================================================

    /// Push nil
    fn push_nil(&mut self);

    /// Push a boolean
    fn push_boolean(&mut self, b: bool);

    /// Push a 64-bit integer
    fn push_integer(&mut self, i: i64);

    /// Push a 64-bit float
    fn push_number(&mut self, n: f64);

    /// Push a byte string (interned when short)
    fn push_bytes(&mut self, bytes: &[u8]);

    /// Push a UTF-8 string
    fn push_str(&mut self, s: &str) {
        self.push_bytes(s.as_bytes());
    }

    /// Push a raw address as light userdata
    fn push_light_userdata(&mut self, addr: usize);

    /// Push a native function
    fn push_function(&mut self, func: NativeFunction);

    /// Push a new full userdata carrying `payload` and no metatable
    fn push_userdata(&mut self, payload: u64);

    // ========================================================================
    // Pull
    // ========================================================================

    /// Truthiness of the value at `idx` (only nil and false are false)
    fn to_boolean(&self, idx: i32) -> bool;

    /// Integer value, accepting floats with an exact integer representation
    fn to_integer(&self, idx: i32) -> Option<i64>;

    /// Float value of a number
    fn to_number(&self, idx: i32) -> Option<f64>;

    /// Bytes of a string value
    fn to_bytes(&self, idx: i32) -> Option<Rc<[u8]>>;

    /// Payload of a full userdata
    fn to_userdata(&self, idx: i32) -> Option<u64>;

    /// Address of a light userdata
    fn to_light_userdata(&self, idx: i32) -> Option<usize>;

    /// Identity of an interned string at `idx`; `None` for long strings and non-strings
    fn string_id(&self, idx: i32) -> Option<StrId>;

    /// Address identifying a table, function, thread or userdata at `idx`
    fn to_pointer(&self, idx: i32) -> Option<usize>;

    /// Display form of the value at `idx`, honouring `__tostring`
    fn to_display(&mut self, idx: i32) -> ScriptResult<String>;

    // ========================================================================
    // Tables
    // ========================================================================

    /// Push a new empty table
    fn create_table(&mut self, narr: usize, nrec: usize);

    /// Pop a key, push `t[key]` without metamethods
    fn raw_get(&mut self, idx: i32) -> ScriptType;

    /// Pop a value and a key (value on top), assign `t[key] = value` without metamethods
    fn raw_set(&mut self, idx: i32);

    /// Push `t[n]` without metamethods
    fn raw_get_i(&mut self, idx: i32, n: i64) -> ScriptType;

    /// Pop a value, assign `t[n] = value` without metamethods
    fn raw_set_i(&mut self, idx: i32, n: i64);

    /// Pop a key, push `t[key]`, honouring `__index`
    fn get_table(&mut self, idx: i32) -> ScriptResult<ScriptType>;

    /// Pop a value and a key, assign `t[key] = value`, honouring `__newindex`
    fn set_table(&mut self, idx: i32) -> ScriptResult<()>;

    /// Push `t[name]`, honouring `__index`
    fn get_field(&mut self, idx: i32, name: &str) -> ScriptResult<ScriptType> {
        let idx = self.abs_index(idx);
        self.push_str(name);
        self.get_table(idx)
    }

    /// Pop a value, assign `t[name] = value`, honouring `__newindex`
    fn set_field(&mut self, idx: i32, name: &str) -> ScriptResult<()> {
        let idx = self.abs_index(idx);
        self.push_str(name);
        self.insert(-2);
        self.set_table(idx)
    }

    /// Raw length (border of the sequence part, byte length of strings)
    fn raw_len(&self, idx: i32) -> usize;

    /// Primitive equality without metamethods
    fn raw_equal(&self, a: i32, b: i32) -> bool;

    /// Pop a key, push the next key/value pair; returns false at the end
    fn next(&mut self, idx: i32) -> bool;

    // ========================================================================
    // Metatables
    // ========================================================================

    /// Pop a table (or nil) and make it the metatable of the value at `idx`
    fn set_metatable(&mut self, idx: i32);

    /// Push the metatable of the value at `idx`; pushes nothing and returns false if none
    fn get_metatable(&mut self, idx: i32) -> bool;

    // ========================================================================
    // Globals
    // ========================================================================

    /// Push the global `name`
    fn get_global(&mut self, name: &str) -> ScriptResult<ScriptType>;

    /// Pop a value into the global `name`
    fn set_global(&mut self, name: &str) -> ScriptResult<()>;

    // ========================================================================
    // Registry
    // ========================================================================

    /// Pop the top value into the registry and return its key
    fn reference(&mut self) -> RegistryKey;

    /// Pop the top value into the registry without keeping it alive.
    ///
    /// Once the runtime drops the value, [`push_reference`](Self::push_reference)
    /// pushes nil for the key; the key itself stays reserved until
    /// [`unreference`](Self::unreference) is called.
    fn reference_weak(&mut self) -> RegistryKey;

    /// Push the registry value for `key` (nil if released or collected)
    fn push_reference(&mut self, key: RegistryKey) -> ScriptType;

    /// Release a registry slot
    fn unreference(&mut self, key: RegistryKey);

    /// Intern `bytes` and keep it alive for the life of the state.
    ///
    /// Returns `None` when the string is too long to be interned.
    fn intern(&mut self, bytes: &[u8]) -> Option<StrId>;

    // ========================================================================
    // Execution
    // ========================================================================

    /// Compile a chunk and push it as a function
    fn load(&mut self, chunk: &[u8], chunk_name: &str) -> ScriptResult<()>;

    /// Call the function below `nargs` arguments in protected mode.
    ///
    /// On success the function and arguments are replaced by `nresults`
    /// results (all of them for `MULTRET`). On failure they are popped and
    /// the error is returned.
    fn pcall(&mut self, nargs: usize, nresults: Option<usize>) -> ScriptResult<()>;

    /// Push a new thread running the function at `idx`
    fn new_thread(&mut self, idx: i32) -> ScriptResult<()>;

    /// Resume the thread at `idx` with `nargs` arguments from the top.
    ///
    /// Returns the number of values pushed.
    fn resume(&mut self, idx: i32, nargs: usize) -> ScriptResult<usize>;

    /// Status of the thread at `idx`
    fn thread_status(&self, idx: i32) -> Option<ThreadStatus>;

    // ========================================================================
    // Owner back-pointer
    // ========================================================================

    /// Attach (or clear) the owning host environment
    fn set_app_data(&mut self, data: Option<Rc<dyn Any>>);

    /// The owning host environment, if any
    fn app_data(&self) -> Option<Rc<dyn Any>>;
}
