//! Tandem Engine - host/script bridge
//!
//! Exposes host types and objects to an embedded stack-based script runtime
//! and lets host code drive that runtime:
//! - **Values**: [`Value`] carries anything that can cross the boundary
//! - **Host model**: explicit type metadata ([`host`]) in place of reflection
//! - **Members**: candidate lists per type and access mode ([`members`])
//! - **Adapters**: native functions synthesized per type and operation,
//!   installed as metatable events of anchored host values
//! - **Environment**: owns the runtime state, caches and anchors
//!
//! # Example
//!
//! ```rust,ignore
//! use tandem_engine::{BridgeConfig, Environment, TypeBuilder};
//!
//! let env = Environment::new(Box::new(tandem_vm::Vm::new()), BridgeConfig::default())?;
//! env.import_type(&TypeBuilder::class("Point").build())?;
//! let results = env.run("return tostring(Point)")?;
//! ```

#![warn(rust_2018_idioms)]
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

// ============================================================================
// Modules
// ============================================================================

mod adapter;
pub mod config;
pub mod environment;
pub mod error;
pub mod handles;
pub mod host;
mod logging;
mod marshal;
pub mod members;
mod registry;
pub mod value;

// ============================================================================
// Re-exports
// ============================================================================

pub use adapter::AdapterKind;
pub use config::{BridgeConfig, TextEncoding};
pub use environment::Environment;
pub use error::{BridgeError, BridgeResult, DispatchError, DispatchResult, HostException};
pub use handles::{ScriptFunction, ScriptTable, ScriptThread};
pub use host::*;
pub use members::{Member, MemberList, MemberMode, MethodGroup, INDEXER_NAME};
pub use value::{EmbeddedKind, EmbeddedObject, HostTypeSet, ScriptString, Value};

pub use tandem_sdk::{ScriptState, ThreadStatus};
