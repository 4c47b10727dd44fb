//! Typed handles to tables, functions and threads owned by the runtime
//!
//! Handles keep their object anchored in the runtime registry until the
//! last clone is dropped. Every operation fails with
//! [`BridgeError::Disposed`] once the owning environment is gone, and with
//! [`BridgeError::Busy`] when called from inside a running adapter.

use tandem_sdk::{ScriptState, ThreadStatus, MULTRET};

use crate::environment::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::marshal::{pull_value, push_value};
use crate::value::{EmbeddedObject, Value};

fn push_all(bridge: &Bridge, state: &mut dyn ScriptState, values: &[Value]) -> BridgeResult<()> {
    for value in values {
        push_value(bridge, state, value)?;
    }
    Ok(())
}

/// Pull every value above `base`
fn pull_from(bridge: &Bridge, state: &mut dyn ScriptState, base: i32) -> Vec<Value> {
    let top = state.top();
    (base + 1..=top).map(|idx| pull_value(bridge, state, idx)).collect()
}

// ============================================================================
// Tables
// ============================================================================

/// A script table
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptTable {
    object: EmbeddedObject,
}

impl ScriptTable {
    pub(crate) fn new(object: EmbeddedObject) -> Self {
        Self { object }
    }

    /// The table as a bridge value
    pub fn value(&self) -> Value {
        Value::Embedded(self.object.clone())
    }

    /// `t[key]`, honouring `__index`
    pub fn get(&self, key: &Value) -> BridgeResult<Value> {
        let bridge = self.object.owner()?;
        bridge.with_state(|bridge, state| {
            state.push_reference(self.object.registry_key());
            push_value(bridge, state, key)?;
            state.get_table(-2)?;
            Ok(pull_value(bridge, state, -1))
        })
    }

    /// `t[key] = value`, honouring `__newindex`
    pub fn set(&self, key: &Value, value: &Value) -> BridgeResult<()> {
        let bridge = self.object.owner()?;
        bridge.with_state(|bridge, state| {
            state.push_reference(self.object.registry_key());
            push_value(bridge, state, key)?;
            push_value(bridge, state, value)?;
            state.set_table(-3)?;
            Ok(())
        })
    }

    /// `t.name`
    pub fn get_field(&self, name: &str) -> BridgeResult<Value> {
        self.get(&Value::from_string(name))
    }

    /// `t.name = value`
    pub fn set_field(&self, name: &str, value: &Value) -> BridgeResult<()> {
        self.set(&Value::from_string(name), value)
    }

    /// Raw length of the sequence part
    pub fn len(&self) -> BridgeResult<usize> {
        let bridge = self.object.owner()?;
        bridge.with_state(|_, state| {
            state.push_reference(self.object.registry_key());
            Ok(state.raw_len(-1))
        })
    }

    pub fn is_empty(&self) -> BridgeResult<bool> {
        Ok(self.pairs()?.is_empty())
    }

    /// Every key/value pair, in traversal order
    pub fn pairs(&self) -> BridgeResult<Vec<(Value, Value)>> {
        let bridge = self.object.owner()?;
        bridge.with_state(|bridge, state| {
            state.push_reference(self.object.registry_key());
            let table = state.abs_index(-1);
            let mut pairs = Vec::new();
            state.push_nil();
            while state.next(table) {
                let key = pull_value(bridge, state, -2);
                let value = pull_value(bridge, state, -1);
                pairs.push((key, value));
                state.pop(1);
            }
            Ok(pairs)
        })
    }
}

// ============================================================================
// Functions
// ============================================================================

/// A script or native function
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptFunction {
    object: EmbeddedObject,
}

impl ScriptFunction {
    pub(crate) fn new(object: EmbeddedObject) -> Self {
        Self { object }
    }

    pub fn value(&self) -> Value {
        Value::Embedded(self.object.clone())
    }

    /// Call in protected mode, returning every result
    pub fn call(&self, args: &[Value]) -> BridgeResult<Vec<Value>> {
        let bridge = self.object.owner()?;
        bridge.with_state(|bridge, state| {
            let base = state.top();
            state.push_reference(self.object.registry_key());
            push_all(bridge, state, args)?;
            state.pcall(args.len(), MULTRET)?;
            Ok(pull_from(bridge, state, base))
        })
    }
}

// ============================================================================
// Threads
// ============================================================================

/// A coroutine
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptThread {
    object: EmbeddedObject,
}

impl ScriptThread {
    pub(crate) fn new(object: EmbeddedObject) -> Self {
        Self { object }
    }

    pub fn value(&self) -> Value {
        Value::Embedded(self.object.clone())
    }

    /// Resume with `args`, returning the values it yields or returns
    pub fn resume(&self, args: &[Value]) -> BridgeResult<Vec<Value>> {
        let bridge = self.object.owner()?;
        bridge.with_state(|bridge, state| {
            state.push_reference(self.object.registry_key());
            let thread = state.abs_index(-1);
            push_all(bridge, state, args)?;
            let count = state.resume(thread, args.len())?;
            let base = state.top() - count as i32;
            Ok(pull_from(bridge, state, base))
        })
    }

    pub fn status(&self) -> BridgeResult<ThreadStatus> {
        let bridge = self.object.owner()?;
        bridge.with_state(|_, state| {
            state.push_reference(self.object.registry_key());
            state
                .thread_status(-1)
                .ok_or_else(|| BridgeError::Runtime("handle no longer refers to a thread".to_string()))
        })
    }
}
