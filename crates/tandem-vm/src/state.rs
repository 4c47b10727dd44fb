//! The [`Vm`] and its [`ScriptState`] implementation.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tandem_sdk::{
    NativeFunction, RegistryKey, ScriptError, ScriptResult, ScriptState, ScriptType, StrId, ThreadStatus,
};
use tracing::debug;

use crate::builtins;
use crate::parser::parse_chunk;
use crate::value::{
    Closure, Finalizers, Function, ScriptValue, StringInterner, Table, TableRef, Thread, UserData,
    SHORT_STRING_LIMIT,
};

/// A registry slot; weak entries do not keep userdata alive
enum Entry {
    Strong(ScriptValue),
    Weak(Weak<UserData>),
}

impl Entry {
    fn value(&self) -> ScriptValue {
        match self {
            Entry::Strong(value) => value.clone(),
            Entry::Weak(ud) => ud.upgrade().map(ScriptValue::UserData).unwrap_or_default(),
        }
    }
}

/// An embedded script runtime
pub struct Vm {
    pub(crate) globals: TableRef,
    pub(crate) interner: StringInterner,
    registry: Vec<Option<Entry>>,
    free_refs: Vec<u32>,
    finalizers: Rc<Finalizers>,
    pub(crate) stack: Vec<ScriptValue>,
    /// First stack position of the innermost native frame
    pub(crate) base: usize,
    pub(crate) depth: usize,
    /// Chunk and line currently executing, for error locations
    pub(crate) chunk: Rc<str>,
    pub(crate) line: u32,
    app_data: Option<Rc<dyn Any>>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Create a runtime with the base library loaded
    pub fn new() -> Self {
        let mut vm = Self {
            globals: Rc::new(RefCell::new(Table::default())),
            interner: StringInterner::new(),
            registry: Vec::new(),
            free_refs: Vec::new(),
            finalizers: Rc::new(RefCell::new(Vec::new())),
            stack: Vec::new(),
            base: 0,
            depth: 0,
            chunk: Rc::from("?"),
            line: 0,
            app_data: None,
        };
        builtins::open_base(&mut vm);
        vm
    }

    /// Make a string value, interning short strings
    pub fn new_string(&mut self, bytes: &[u8]) -> ScriptValue {
        ScriptValue::String(self.interner.string(bytes))
    }

    /// The globals table
    pub fn globals(&self) -> TableRef {
        self.globals.clone()
    }

    /// Raw-set a global
    pub fn set_global_value(&mut self, name: &str, value: ScriptValue) {
        let key = self.new_string(name.as_bytes());
        // string keys are never nil or NaN
        let _ = self.globals.borrow_mut().set(key, value);
    }

    /// Compile and run a chunk, returning all of its results
    pub fn exec(&mut self, source: &str, chunk_name: &str) -> ScriptResult<Vec<ScriptValue>> {
        let main = self.compile(source.as_bytes(), chunk_name)?;
        self.call_value(main, Vec::new())
    }

    /// Number of live registry references
    pub fn registry_len(&self) -> usize {
        self.registry.iter().filter(|slot| slot.is_some()).count()
    }

    /// Run `__gc` for userdata dropped since the last call; returns how many ran.
    ///
    /// Finalizers run only between top-level calls, never inside a native frame.
    pub fn run_finalizers(&mut self) -> usize {
        let mut ran = 0;
        loop {
            let pending = std::mem::take(&mut *self.finalizers.borrow_mut());
            if pending.is_empty() {
                return ran;
            }
            for (payload, metatable) in pending {
                let handler = metatable.borrow().get_str(b"__gc");
                if handler.is_nil() {
                    continue;
                }
                let object = UserData::new(payload);
                *object.metatable.borrow_mut() = Some(metatable);
                ran += 1;
                if let Err(err) = self.call_value(handler, vec![ScriptValue::UserData(Rc::new(object))]) {
                    debug!(target: "tandem::vm", payload, error = %err, "finalizer failed");
                }
            }
        }
    }

    fn finalize_if_idle(&mut self) {
        if self.depth == 0 {
            self.run_finalizers();
        }
    }

    fn store(&mut self, entry: Entry) -> RegistryKey {
        match self.free_refs.pop() {
            Some(slot) => {
                self.registry[slot as usize] = Some(entry);
                RegistryKey::new(slot)
            }
            None => {
                self.registry.push(Some(entry));
                RegistryKey::new((self.registry.len() - 1) as u32)
            }
        }
    }

    fn compile(&mut self, chunk: &[u8], chunk_name: &str) -> ScriptResult<ScriptValue> {
        let source = std::str::from_utf8(chunk).map_err(|e| ScriptError::Syntax {
            chunk: chunk_name.to_string(),
            line: 1,
            message: format!("chunk is not valid UTF-8 ({})", e),
        })?;
        let proto = parse_chunk(source, chunk_name, &mut self.interner)?;
        debug!(target: "tandem::vm", chunk = chunk_name, slots = proto.num_slots(), "chunk compiled");
        Ok(ScriptValue::Function(Rc::new(Function::Script(Rc::new(Closure {
            proto,
            upvalues: Vec::new(),
        })))))
    }

    // ========================================================================
    // Stack positions
    // ========================================================================

    fn position(&self, idx: i32) -> Option<usize> {
        if idx > 0 {
            let pos = self.base + idx as usize - 1;
            (pos < self.stack.len()).then_some(pos)
        } else if idx < 0 {
            let pos = self.stack.len() as i64 + idx as i64;
            (pos >= self.base as i64).then_some(pos as usize)
        } else {
            None
        }
    }

    /// Value at a stack index (nil when the index is not valid)
    pub fn value_at(&self, idx: i32) -> ScriptValue {
        self.position(idx).map(|pos| self.stack[pos].clone()).unwrap_or_default()
    }

    /// Push a value
    pub fn push(&mut self, value: ScriptValue) {
        self.stack.push(value);
    }

    fn pop_value(&mut self) -> ScriptValue {
        if self.stack.len() > self.base {
            self.stack.pop().unwrap_or_default()
        } else {
            ScriptValue::Nil
        }
    }

    fn pop_values(&mut self, n: usize) -> Vec<ScriptValue> {
        let n = n.min(self.stack.len() - self.base);
        self.stack.split_off(self.stack.len() - n)
    }
}

impl ScriptState for Vm {
    // ========================================================================
    // Stack
    // ========================================================================

    fn top(&self) -> i32 {
        (self.stack.len() - self.base) as i32
    }

    fn set_top(&mut self, idx: i32) {
        let new_len = if idx >= 0 {
            self.base + idx as usize
        } else {
            (self.stack.len() as i64 + idx as i64 + 1).max(self.base as i64) as usize
        };
        self.stack.resize(new_len, ScriptValue::Nil);
    }

    fn push_value(&mut self, idx: i32) {
        let value = self.value_at(idx);
        self.stack.push(value);
    }

    fn insert(&mut self, idx: i32) {
        if let Some(pos) = self.position(idx) {
            let value = self.pop_value();
            self.stack.insert(pos, value);
        }
    }

    fn remove(&mut self, idx: i32) {
        if let Some(pos) = self.position(idx) {
            self.stack.remove(pos);
        }
    }

    fn type_of(&self, idx: i32) -> ScriptType {
        match self.position(idx) {
            Some(pos) => self.stack[pos].script_type(),
            None => ScriptType::None,
        }
    }

    fn is_integer(&self, idx: i32) -> bool {
        matches!(self.value_at(idx), ScriptValue::Integer(_))
    }

    // ========================================================================
    // Push
    // ========================================================================

    fn push_nil(&mut self) {
        self.push(ScriptValue::Nil);
    }

    fn push_boolean(&mut self, b: bool) {
        self.push(ScriptValue::Boolean(b));
    }

    fn push_integer(&mut self, i: i64) {
        self.push(ScriptValue::Integer(i));
    }

    fn push_number(&mut self, n: f64) {
        self.push(ScriptValue::Number(n));
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        let value = self.new_string(bytes);
        self.push(value);
    }

    fn push_light_userdata(&mut self, addr: usize) {
        self.push(ScriptValue::LightUserData(addr));
    }

    fn push_function(&mut self, func: NativeFunction) {
        self.push(ScriptValue::Function(Rc::new(Function::Native(func))));
    }

    fn push_userdata(&mut self, payload: u64) {
        self.push(ScriptValue::UserData(Rc::new(UserData::new(payload))));
    }

    // ========================================================================
    // Pull
    // ========================================================================

    fn to_boolean(&self, idx: i32) -> bool {
        self.value_at(idx).is_truthy()
    }

    fn to_integer(&self, idx: i32) -> Option<i64> {
        self.value_at(idx).as_integer()
    }

    fn to_number(&self, idx: i32) -> Option<f64> {
        self.value_at(idx).as_number()
    }

    fn to_bytes(&self, idx: i32) -> Option<Rc<[u8]>> {
        self.value_at(idx).as_bytes().cloned()
    }

    fn to_userdata(&self, idx: i32) -> Option<u64> {
        match self.value_at(idx) {
            ScriptValue::UserData(ud) => Some(ud.payload),
            _ => None,
        }
    }

    fn to_light_userdata(&self, idx: i32) -> Option<usize> {
        match self.value_at(idx) {
            ScriptValue::LightUserData(addr) => Some(addr),
            _ => None,
        }
    }

    fn string_id(&self, idx: i32) -> Option<StrId> {
        match self.value_at(idx) {
            ScriptValue::String(s) if s.len() <= SHORT_STRING_LIMIT => self.interner.id(&s),
            _ => None,
        }
    }

    fn to_pointer(&self, idx: i32) -> Option<usize> {
        match self.value_at(idx) {
            ScriptValue::LightUserData(_) => None,
            other => other.identity(),
        }
    }

    fn to_display(&mut self, idx: i32) -> ScriptResult<String> {
        let value = self.value_at(idx);
        let bytes = self.tostring(&value)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    // ========================================================================
    // Tables
    // ========================================================================

    fn create_table(&mut self, narr: usize, nrec: usize) {
        self.push(ScriptValue::Table(Rc::new(RefCell::new(Table::with_capacity(narr, nrec)))));
    }

    fn raw_get(&mut self, idx: i32) -> ScriptType {
        let target = self.value_at(idx);
        let key = self.pop_value();
        let value = match target {
            ScriptValue::Table(table) => table.borrow().get(&key),
            _ => ScriptValue::Nil,
        };
        let ty = value.script_type();
        self.push(value);
        ty
    }

    fn raw_set(&mut self, idx: i32) {
        let target = self.value_at(idx);
        let value = self.pop_value();
        let key = self.pop_value();
        if let ScriptValue::Table(table) = target {
            // nil/NaN keys are ignored
            let _ = table.borrow_mut().set(key, value);
        }
    }

    fn raw_get_i(&mut self, idx: i32, n: i64) -> ScriptType {
        let value = match self.value_at(idx) {
            ScriptValue::Table(table) => table.borrow().get_int(n),
            _ => ScriptValue::Nil,
        };
        let ty = value.script_type();
        self.push(value);
        ty
    }

    fn raw_set_i(&mut self, idx: i32, n: i64) {
        let target = self.value_at(idx);
        let value = self.pop_value();
        if let ScriptValue::Table(table) = target {
            table.borrow_mut().set_int(n, value);
        }
    }

    fn get_table(&mut self, idx: i32) -> ScriptResult<ScriptType> {
        let target = self.value_at(idx);
        let key = self.pop_value();
        let value = self.index(target, key)?;
        let ty = value.script_type();
        self.push(value);
        Ok(ty)
    }

    fn set_table(&mut self, idx: i32) -> ScriptResult<()> {
        let target = self.value_at(idx);
        let value = self.pop_value();
        let key = self.pop_value();
        self.set_index(target, key, value)
    }

    fn raw_len(&self, idx: i32) -> usize {
        match self.value_at(idx) {
            ScriptValue::String(s) => s.len(),
            ScriptValue::Table(table) => table.borrow().len(),
            _ => 0,
        }
    }

    fn raw_equal(&self, a: i32, b: i32) -> bool {
        if self.position(a).is_none() || self.position(b).is_none() {
            return false;
        }
        self.value_at(a).raw_equals(&self.value_at(b))
    }

    fn next(&mut self, idx: i32) -> bool {
        let target = self.value_at(idx);
        let key = self.pop_value();
        let step = match target {
            ScriptValue::Table(table) => table.borrow().next(&key),
            _ => Ok(None),
        };
        match step {
            Ok(Some((k, v))) => {
                self.push(k);
                self.push(v);
                true
            }
            _ => false,
        }
    }

    // ========================================================================
    // Metatables
    // ========================================================================

    fn set_metatable(&mut self, idx: i32) {
        let target = self.value_at(idx);
        let metatable = match self.pop_value() {
            ScriptValue::Table(mt) => Some(mt),
            _ => None,
        };
        match target {
            ScriptValue::Table(table) => table.borrow_mut().metatable = metatable,
            ScriptValue::UserData(ud) => {
                let finalized = metatable
                    .as_ref()
                    .is_some_and(|mt| !mt.borrow().get_str(b"__gc").is_nil());
                *ud.finalizer.borrow_mut() = finalized.then(|| Rc::downgrade(&self.finalizers));
                *ud.metatable.borrow_mut() = metatable;
            }
            _ => {}
        }
    }

    fn get_metatable(&mut self, idx: i32) -> bool {
        match self.value_at(idx).metatable() {
            Some(mt) => {
                self.push(ScriptValue::Table(mt));
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Globals
    // ========================================================================

    fn get_global(&mut self, name: &str) -> ScriptResult<ScriptType> {
        let globals = ScriptValue::Table(self.globals.clone());
        let key = self.new_string(name.as_bytes());
        let value = self.index(globals, key)?;
        let ty = value.script_type();
        self.push(value);
        Ok(ty)
    }

    fn set_global(&mut self, name: &str) -> ScriptResult<()> {
        let value = self.pop_value();
        let globals = ScriptValue::Table(self.globals.clone());
        let key = self.new_string(name.as_bytes());
        self.set_index(globals, key, value)
    }

    // ========================================================================
    // Registry
    // ========================================================================

    fn reference(&mut self) -> RegistryKey {
        let value = self.pop_value();
        self.store(Entry::Strong(value))
    }

    fn reference_weak(&mut self) -> RegistryKey {
        let entry = match self.pop_value() {
            ScriptValue::UserData(ud) => Entry::Weak(Rc::downgrade(&ud)),
            other => Entry::Strong(other),
        };
        self.store(entry)
    }

    fn push_reference(&mut self, key: RegistryKey) -> ScriptType {
        let value = self
            .registry
            .get(key.raw() as usize)
            .and_then(|slot| slot.as_ref())
            .map(Entry::value)
            .unwrap_or_default();
        let ty = value.script_type();
        self.push(value);
        ty
    }

    fn unreference(&mut self, key: RegistryKey) {
        if let Some(slot) = self.registry.get_mut(key.raw() as usize) {
            if slot.take().is_some() {
                self.free_refs.push(key.raw());
            }
        }
    }

    fn intern(&mut self, bytes: &[u8]) -> Option<StrId> {
        if bytes.len() > SHORT_STRING_LIMIT {
            return None;
        }
        self.interner.string(bytes);
        self.interner.id(bytes)
    }

    // ========================================================================
    // Execution
    // ========================================================================

    fn load(&mut self, chunk: &[u8], chunk_name: &str) -> ScriptResult<()> {
        let main = self.compile(chunk, chunk_name)?;
        self.push(main);
        Ok(())
    }

    fn pcall(&mut self, nargs: usize, nresults: Option<usize>) -> ScriptResult<()> {
        let available = self.stack.len() - self.base;
        if nargs + 1 > available {
            return Err(ScriptError::runtime("attempt to call a missing function"));
        }
        let args = self.pop_values(nargs);
        let function = self.pop_value();
        let outcome = self.call_value(function, args);
        self.finalize_if_idle();
        let mut results = outcome?;
        if let Some(n) = nresults {
            results.resize(n, ScriptValue::Nil);
        }
        self.stack.extend(results);
        Ok(())
    }

    fn new_thread(&mut self, idx: i32) -> ScriptResult<()> {
        let function = self.value_at(idx);
        if !matches!(function, ScriptValue::Function(_)) {
            return Err(ScriptError::runtime(format!(
                "bad argument #1 to 'create' (function expected, got {})",
                function.type_name()
            )));
        }
        self.push(ScriptValue::Thread(Rc::new(Thread {
            function,
            status: Cell::new(ThreadStatus::Suspended),
        })));
        Ok(())
    }

    fn resume(&mut self, idx: i32, nargs: usize) -> ScriptResult<usize> {
        let thread = match self.value_at(idx) {
            ScriptValue::Thread(thread) => thread,
            other => {
                return Err(ScriptError::runtime(format!(
                    "bad argument #1 to 'resume' (thread expected, got {})",
                    other.type_name()
                )))
            }
        };
        match thread.status.get() {
            ThreadStatus::Suspended => {}
            ThreadStatus::Dead => return Err(ScriptError::runtime("cannot resume dead coroutine")),
            ThreadStatus::Running => return Err(ScriptError::runtime("cannot resume non-suspended coroutine")),
        }
        let args = self.pop_values(nargs);
        thread.status.set(ThreadStatus::Running);
        let outcome = self.call_value(thread.function.clone(), args);
        thread.status.set(ThreadStatus::Dead);
        self.finalize_if_idle();
        let results = outcome?;
        let count = results.len();
        self.stack.extend(results);
        Ok(count)
    }

    fn thread_status(&self, idx: i32) -> Option<ThreadStatus> {
        match self.value_at(idx) {
            ScriptValue::Thread(thread) => Some(thread.status.get()),
            _ => None,
        }
    }

    // ========================================================================
    // Owner back-pointer
    // ========================================================================

    fn set_app_data(&mut self, data: Option<Rc<dyn Any>>) {
        self.app_data = data;
    }

    fn app_data(&self) -> Option<Rc<dyn Any>> {
        self.app_data.clone()
    }
}
