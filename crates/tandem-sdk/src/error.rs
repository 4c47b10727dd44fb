//! Error types for the stack ABI

/// Result type for ABI calls
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Errors raised through an embedded runtime's error-propagation mechanism.
///
/// A native function reports a script-level error by returning
/// `Err(ScriptError::Runtime { .. })`; the runtime then unwinds its own
/// frames up to the nearest protected call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    /// Error raised while running script code (catchable by `pcall`)
    #[error("{message}")]
    Runtime {
        /// Formatted error message
        message: String,
    },

    /// Malformed chunk rejected at load time
    #[error("{chunk}:{line}: {message}")]
    Syntax {
        /// Chunk name given to `load`
        chunk: String,
        /// 1-based line of the offending token
        line: u32,
        /// Parser message
        message: String,
    },

    /// Allocation failure inside the runtime
    #[error("not enough memory")]
    Memory,
}

impl ScriptError {
    /// Build a runtime error from a message
    pub fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Runtime {
            message: message.into(),
        }
    }

    /// The bare message, without chunk location
    pub fn message(&self) -> &str {
        match self {
            ScriptError::Runtime { message } | ScriptError::Syntax { message, .. } => message,
            ScriptError::Memory => "not enough memory",
        }
    }
}

impl From<String> for ScriptError {
    fn from(message: String) -> Self {
        ScriptError::Runtime { message }
    }
}

impl From<&str> for ScriptError {
    fn from(message: &str) -> Self {
        ScriptError::Runtime {
            message: message.to_string(),
        }
    }
}
