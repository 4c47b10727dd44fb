//! Environments
//!
//! An [`Environment`] owns one embedded runtime state and everything the
//! bridge keeps for it: caches, anchored host values, and the queue of
//! registry slots released by dropped handles. Host code drives it through
//! this API; script code reaches back through the adapters installed in the
//! metatables of anchored values.
//!
//! The shared part lives in a [`Bridge`] that the runtime state also points
//! to (through its app data), so adapters can find their environment from
//! nothing but the state they are called with.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tandem_sdk::{RegistryKey, ScriptError, ScriptState, ScriptType, MULTRET};
use tracing::{debug, info, trace};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::handles::{ScriptFunction, ScriptTable, ScriptThread};
use crate::host::{HostAssembly, HostTypeRef, HostValue};
use crate::marshal::{pull_value, push_host, push_value};
use crate::registry::{Anchored, Registry};
use crate::value::{HostTypeSet, Value};

/// State shared between an environment, its handles and its adapters
pub(crate) struct Bridge {
    pub(crate) config: BridgeConfig,
    pub(crate) registry: Registry,
    alive: Cell<bool>,
    state: RefCell<Option<Box<dyn ScriptState>>>,
    released: Cell<Vec<RegistryKey>>,
    this: Weak<Bridge>,
}

impl Bridge {
    /// The environment owning `state`
    pub(crate) fn from_state(state: &dyn ScriptState) -> Result<Rc<Bridge>, ScriptError> {
        let data = state
            .app_data()
            .ok_or_else(|| ScriptError::runtime("host environment has been disposed"))?;
        let bridge = data
            .downcast::<Bridge>()
            .map_err(|_| ScriptError::runtime("runtime is not owned by a host environment"))?;
        if !bridge.is_alive() {
            return Err(ScriptError::runtime("host environment has been disposed"));
        }
        Ok(bridge)
    }

    #[inline]
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.get()
    }

    pub(crate) fn weak(&self) -> Weak<Bridge> {
        self.this.clone()
    }

    /// Queue a registry slot for release on the next entry into the runtime
    pub(crate) fn queue_release(&self, key: RegistryKey) {
        if !self.is_alive() {
            return;
        }
        let mut released = self.released.take();
        released.push(key);
        self.released.set(released);
    }

    /// Release queued slots. Dropping a slot's value may drop further
    /// handles, so this runs until the queue stays empty.
    pub(crate) fn drain_releases(&self, state: &mut dyn ScriptState) {
        loop {
            let keys = self.released.take();
            if keys.is_empty() {
                return;
            }
            trace!(target: "tandem::env", count = keys.len(), "releasing dropped handles");
            for key in keys {
                state.unreference(key);
            }
        }
    }

    #[cfg(test)]
    fn pending_releases(&self) -> usize {
        let released = self.released.take();
        let count = released.len();
        self.released.set(released);
        count
    }

    /// Run `f` against the runtime state, restoring the stack afterwards.
    ///
    /// Fails with [`BridgeError::Busy`] when the state is already in use
    /// further up the call stack.
    pub(crate) fn with_state<R>(
        &self,
        f: impl FnOnce(&Bridge, &mut dyn ScriptState) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        if !self.is_alive() {
            return Err(BridgeError::Disposed);
        }
        let result = {
            let mut slot = self.state.try_borrow_mut().map_err(|_| BridgeError::Busy)?;
            let state = slot.as_mut().ok_or(BridgeError::Disposed)?;
            self.drain_releases(state.as_mut());
            let base = state.top();
            let result = f(self, state.as_mut());
            state.set_top(base);
            result
        };
        if !self.is_alive() {
            self.teardown();
        }
        result
    }

    fn dispose(&self) {
        if !self.alive.replace(false) {
            return;
        }
        info!(target: "tandem::env", anchored = self.registry.anchored_count(), "environment disposed");
        self.teardown();
    }

    /// Drop the runtime state unless it is in use; `with_state` finishes
    /// the job once the running call returns
    fn teardown(&self) {
        let state = match self.state.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => return,
        };
        if let Some(mut state) = state {
            state.set_app_data(None);
            drop(state);
        }
        self.registry.clear();
        self.released.take();
    }
}

// ============================================================================
// Environment
// ============================================================================

/// A host-side view of one embedded runtime
pub struct Environment {
    bridge: Rc<Bridge>,
}

impl Environment {
    /// Take ownership of `state` and attach the bridge to it
    pub fn new(mut state: Box<dyn ScriptState>, config: BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;
        if state.app_data().is_some() {
            return Err(BridgeError::argument("runtime state is already owned by an environment"));
        }
        let bridge = Rc::new_cyclic(|this| Bridge {
            config,
            registry: Registry::new(),
            alive: Cell::new(true),
            state: RefCell::new(None),
            released: Cell::new(Vec::new()),
            this: this.clone(),
        });
        let data: Rc<dyn Any> = bridge.clone();
        state.set_app_data(Some(data));
        *bridge.state.borrow_mut() = Some(state);
        info!(target: "tandem::env", encoding = ?bridge.config.encoding, "environment created");
        Ok(Self { bridge })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.bridge.config
    }

    /// Tear down the runtime. Further use of the environment or any of its
    /// handles fails with [`BridgeError::Disposed`].
    pub fn dispose(&self) {
        self.bridge.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        !self.bridge.is_alive()
    }

    // ------------------------------------------------------------------------
    // Globals
    // ------------------------------------------------------------------------

    /// Read a global
    pub fn get_global(&self, name: &str) -> BridgeResult<Value> {
        self.bridge.with_state(|bridge, state| {
            state.get_global(name)?;
            Ok(pull_value(bridge, state, -1))
        })
    }

    /// Assign a global
    pub fn set_global(&self, name: &str, value: &Value) -> BridgeResult<()> {
        self.bridge.with_state(|bridge, state| {
            push_value(bridge, state, value)?;
            state.set_global(name)?;
            Ok(())
        })
    }

    /// Assign a host value to a global, anchoring objects and types
    pub fn set_global_object(&self, name: &str, value: impl Into<HostValue>) -> BridgeResult<()> {
        let value = value.into();
        self.bridge.with_state(|bridge, state| {
            push_host(bridge, state, &value)?;
            state.set_global(name)?;
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Compile and run `chunk`, returning everything it returns
    pub fn eval(&self, chunk: &str, chunk_name: &str) -> BridgeResult<Vec<Value>> {
        self.bridge.with_state(|bridge, state| {
            let base = state.top();
            let bytes = bridge.config.encoding.encode(chunk);
            state.load(&bytes, chunk_name)?;
            state.pcall(0, MULTRET)?;
            let top = state.top();
            debug!(target: "tandem::env", chunk = chunk_name, results = top - base, "chunk finished");
            Ok((base + 1..=top).map(|idx| pull_value(bridge, state, idx)).collect())
        })
    }

    /// [`eval`](Self::eval) under the configured default chunk name
    pub fn run(&self, chunk: &str) -> BridgeResult<Vec<Value>> {
        let name = self.bridge.config.default_chunk_name.clone();
        self.eval(chunk, &name)
    }

    // ------------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------------

    /// Expose `ty` as a global named after it. A global type object of the
    /// same name is merged with it, so generic and non-generic types
    /// sharing a name are reachable through one global.
    pub fn import_type(&self, ty: &HostTypeRef) -> BridgeResult<()> {
        self.bridge.with_state(|bridge, state| {
            state.get_global(ty.name())?;
            let existing = pull_value(bridge, state, -1);
            state.pop(1);
            let set = merge_into(existing, ty.name(), HostTypeSet::single(ty))?;
            push_value(bridge, state, &Value::HostTypes(set))?;
            state.set_global(ty.name())?;
            info!(target: "tandem::env", ty = %ty.full_name(), "type imported");
            Ok(())
        })
    }

    /// Expose every type of `assembly`, placing namespaced types in nested
    /// namespace tables (`Collections.Generic.List`)
    pub fn import_assembly(&self, assembly: &HostAssembly) -> BridgeResult<()> {
        let groups = assembly.groups();
        self.bridge.with_state(|bridge, state| {
            for group in &groups {
                let set = HostTypeSet::new(group.types.iter().cloned())?;
                if group.namespace.is_empty() {
                    state.get_global(&group.name)?;
                    let existing = pull_value(bridge, state, -1);
                    state.pop(1);
                    let set = merge_into(existing, &group.name, set)?;
                    push_value(bridge, state, &Value::HostTypes(set))?;
                    state.set_global(&group.name)?;
                    continue;
                }

                namespace_table(state, &group.namespace)?;
                state.push_str(&group.name);
                state.raw_get(-2);
                let existing = pull_value(bridge, state, -1);
                state.pop(1);
                let set = merge_into(existing, &group.name, set)?;
                state.push_str(&group.name);
                push_value(bridge, state, &Value::HostTypes(set))?;
                state.raw_set(-3);
                state.pop(1);
            }
            info!(
                target: "tandem::env",
                assembly = assembly.name(),
                types = assembly.types().len(),
                "assembly imported"
            );
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------------

    /// A new empty script table
    pub fn create_table(&self) -> BridgeResult<ScriptTable> {
        let value = self.bridge.with_state(|bridge, state| {
            state.create_table(0, 0);
            Ok(pull_value(bridge, state, -1))
        })?;
        value.to_table()
    }

    /// A suspended thread that runs `function` when first resumed
    pub fn create_thread(&self, function: &ScriptFunction) -> BridgeResult<ScriptThread> {
        let value = self.bridge.with_state(|bridge, state| {
            push_value(bridge, state, &function.value())?;
            state.new_thread(-1)?;
            Ok(pull_value(bridge, state, -1))
        })?;
        value.to_thread()
    }

    /// Drop the runtime's anchor on a host object or type set.
    ///
    /// Returns false when the value was not anchored. The next push of the
    /// value creates a fresh script-side userdata.
    pub fn release(&self, value: &Value) -> BridgeResult<bool> {
        let target = match value {
            Value::HostObject(obj) => Anchored::Object(obj.clone()),
            Value::HostTypes(set) => Anchored::Types(set.clone()),
            _ => return Ok(false),
        };
        self.bridge.with_state(|bridge, state| {
            let key = bridge.registry.anchors.borrow_mut().release(&target);
            match key {
                Some(key) => {
                    state.unreference(key);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    /// Number of host values currently anchored in the runtime
    pub fn anchored_count(&self) -> usize {
        self.bridge.registry.anchored_count()
    }

    /// Number of adapters synthesized so far
    pub fn adapter_count(&self) -> usize {
        self.bridge.registry.adapter_count()
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Merge `incoming` with whatever currently holds the name
fn merge_into(existing: Value, name: &str, incoming: HostTypeSet) -> BridgeResult<HostTypeSet> {
    match existing {
        Value::Nil => Ok(incoming),
        Value::HostTypes(set) => set.merge(&incoming),
        other => Err(BridgeError::argument(format!(
            "`{}` is already bound to a {}",
            name,
            other.type_name()
        ))),
    }
}

/// Push the table for a dotted namespace path, creating missing levels
fn namespace_table(state: &mut dyn ScriptState, namespace: &str) -> BridgeResult<()> {
    let mut parts = namespace.split('.');
    let root = parts.next().unwrap_or(namespace);
    match state.get_global(root)? {
        ScriptType::Table => {}
        ScriptType::Nil => {
            state.pop(1);
            state.create_table(0, 0);
            state.push_value(-1);
            state.set_global(root)?;
        }
        other => {
            return Err(BridgeError::argument(format!(
                "namespace `{}` clashes with a global {}",
                root,
                other.name()
            )))
        }
    }

    for part in parts {
        state.push_str(part);
        match state.raw_get(-2) {
            ScriptType::Table => {}
            ScriptType::Nil => {
                state.pop(1);
                state.create_table(0, 0);
                state.push_str(part);
                state.push_value(-2);
                state.raw_set(-4);
            }
            other => {
                return Err(BridgeError::argument(format!(
                    "namespace `{}` clashes with a {} field `{}`",
                    namespace,
                    other.name(),
                    part
                )))
            }
        }
        state.remove(-2);
    }
    Ok(())
}
