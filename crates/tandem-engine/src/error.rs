//! Error types for the bridge
//!
//! Two layers of errors exist. [`BridgeError`] is what host code sees at the
//! API boundary. [`DispatchError`] is produced inside adapters while script
//! code is running; it never reaches host code directly but is flattened into
//! a [`ScriptError`] and raised through the embedded runtime, where `pcall`
//! can catch it.

use tandem_sdk::ScriptError;

/// Result type for host-facing bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Result type for adapter dispatch
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors surfaced to host code
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// A `Value` accessor was used on the wrong variant
    #[error("invalid cast: expected {expected}, found {found}")]
    InvalidCast {
        /// Variant the caller asked for
        expected: &'static str,
        /// Variant actually stored
        found: &'static str,
    },

    /// A constructor or operation was given an argument that breaks an invariant
    #[error("invalid argument: {0}")]
    Argument(String),

    /// The owning environment has been torn down
    #[error("environment has been disposed")]
    Disposed,

    /// Script source was rejected at load time
    #[error("{chunk}:{line}: {message}")]
    Load {
        /// Chunk name
        chunk: String,
        /// 1-based line
        line: u32,
        /// Parser message
        message: String,
    },

    /// Error raised while script code was running
    #[error("{0}")]
    Runtime(String),

    /// The environment is already executing script code on this thread
    #[error("environment is busy")]
    Busy,
}

impl BridgeError {
    /// Build an argument error
    pub fn argument(message: impl Into<String>) -> Self {
        BridgeError::Argument(message.into())
    }
}

impl From<ScriptError> for BridgeError {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::Syntax { chunk, line, message } => BridgeError::Load { chunk, line, message },
            ScriptError::Runtime { message } => BridgeError::Runtime(message),
            ScriptError::Memory => BridgeError::Runtime("not enough memory".to_string()),
        }
    }
}

impl From<DispatchError> for BridgeError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Script(inner) => inner.into(),
            DispatchError::Conversion(message) => BridgeError::Argument(message),
            other => BridgeError::Runtime(other.to_string()),
        }
    }
}

/// An exception raised by host code invoked through an adapter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{type_name}: {message}")]
pub struct HostException {
    /// Name of the exception type
    pub type_name: String,
    /// Exception message
    pub message: String,
}

impl HostException {
    /// Create an exception of the given type
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Invalid argument passed to a host member
    pub fn argument(message: impl Into<String>) -> Self {
        Self::new("ArgumentException", message)
    }

    /// Operation not valid in the object's current state
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::new("InvalidOperationException", message)
    }
}

/// Errors produced while an adapter dispatches a script operation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    /// Member, overload or generic instantiation could not be resolved
    #[error("{0}")]
    Resolution(String),

    /// A value could not be converted between the two runtimes
    #[error("{0}")]
    Conversion(String),

    /// The operation is not allowed on the member or type
    #[error("{0}")]
    Access(String),

    /// Host code raised an exception
    #[error("uncaught host exception: {0}")]
    Host(HostException),

    /// Error raised by the embedded runtime during a nested operation
    #[error("{}", .0.message())]
    Script(ScriptError),
}

impl From<HostException> for DispatchError {
    fn from(err: HostException) -> Self {
        DispatchError::Host(err)
    }
}

impl From<ScriptError> for DispatchError {
    fn from(err: ScriptError) -> Self {
        DispatchError::Script(err)
    }
}

impl From<DispatchError> for ScriptError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Script(inner) => inner,
            other => ScriptError::runtime(other.to_string()),
        }
    }
}
