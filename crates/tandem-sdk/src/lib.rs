//! Tandem SDK - the stack ABI between the bridge and an embedded runtime
//!
//! This crate contains only the contract: the [`ScriptState`] trait that an
//! embedded scripting runtime implements, and the small value types that
//! travel across it. The bridge (`tandem-engine`) programs exclusively
//! against this trait and never touches a runtime's internal structures.
//!
//! # Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use tandem_sdk::{NativeFunction, ScriptState};
//!
//! fn register_answer(state: &mut dyn ScriptState) -> tandem_sdk::ScriptResult<()> {
//!     let answer: NativeFunction = Rc::new(|state| {
//!         state.push_integer(42);
//!         Ok(1)
//!     });
//!     state.push_function(answer);
//!     state.set_global("answer")
//! }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod state;
pub mod types;

pub use error::{ScriptError, ScriptResult};
pub use state::ScriptState;
pub use types::{NativeFunction, RegistryKey, ScriptType, StrId, ThreadStatus, MULTRET};
