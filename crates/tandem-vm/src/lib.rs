//! Tandem VM - a small embedded script runtime
//!
//! A tree-walking interpreter for a Lua-flavoured scripting language that
//! implements the [`tandem_sdk::ScriptState`] stack ABI. It exists so the
//! bridge can be exercised end to end without a foreign runtime.
//!
//! Supported: locals and closures, numeric and generic `for`, `while`,
//! `repeat`, multiple assignment and results, varargs, tables with
//! metatables (`__index`, `__newindex`, `__call`, arithmetic, comparison,
//! `__concat`, `__len`, `__unm`, `__tostring`, `__name`), and the base
//! library. Threads run their body to completion when resumed.
//!
//! # Example
//!
//! ```ignore
//! use tandem_vm::Vm;
//!
//! let mut vm = Vm::new();
//! let results = vm.exec("return 1 + 2", "main")?;
//! ```

pub mod ast;
pub mod builtins;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod state;
pub mod value;

pub use state::Vm;
pub use value::{ScriptValue, Table, TableRef};
