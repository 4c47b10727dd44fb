//! Small value types shared across the stack ABI

use std::rc::Rc;

use crate::error::ScriptResult;
use crate::state::ScriptState;

/// Request every result of a call (`pcall(n, MULTRET)`).
pub const MULTRET: Option<usize> = None;

/// A host function callable from script code.
///
/// Arguments occupy stack slots `1..=top()` of the callee frame. The function
/// pushes its results and returns how many it pushed. Returning `Err` raises
/// a script error in the calling runtime.
pub type NativeFunction = Rc<dyn Fn(&mut dyn ScriptState) -> ScriptResult<usize>>;

/// Type of the value held in a stack slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptType {
    /// Index does not refer to a valid slot
    None,
    /// nil
    Nil,
    /// true/false
    Boolean,
    /// Raw address without a metatable
    LightUserData,
    /// Integer or float
    Number,
    /// Byte string
    String,
    /// Table
    Table,
    /// Script closure or native function
    Function,
    /// Full userdata (carries a metatable)
    UserData,
    /// Coroutine
    Thread,
}

impl ScriptType {
    /// Name as reported by the `type` builtin
    pub const fn name(self) -> &'static str {
        match self {
            ScriptType::None => "no value",
            ScriptType::Nil => "nil",
            ScriptType::Boolean => "boolean",
            ScriptType::LightUserData | ScriptType::UserData => "userdata",
            ScriptType::Number => "number",
            ScriptType::String => "string",
            ScriptType::Table => "table",
            ScriptType::Function => "function",
            ScriptType::Thread => "thread",
        }
    }

    /// Whether the slot holds nil or nothing at all
    pub const fn is_none_or_nil(self) -> bool {
        matches!(self, ScriptType::None | ScriptType::Nil)
    }
}

/// Handle to a value anchored in the runtime's registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryKey(u32);

impl RegistryKey {
    /// Wrap a raw registry slot number
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw registry slot number
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Identity of an interned string.
///
/// Two short strings with equal contents always yield the same `StrId`
/// within one runtime, so comparing ids replaces comparing bytes. The order
/// is arbitrary but total and stable for the life of the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrId(usize);

impl StrId {
    /// Wrap a raw identity (typically an address)
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Raw identity value
    pub const fn raw(self) -> usize {
        self.0
    }
}

/// Coroutine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Created and not yet resumed
    Suspended,
    /// Currently executing
    Running,
    /// Finished or failed
    Dead,
}
