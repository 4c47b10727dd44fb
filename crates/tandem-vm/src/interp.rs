//! Tree-walking interpreter.
//!
//! Each script call gets a [`Frame`] whose slots are shared cells, so a
//! closure captures a variable by cloning the cell. Executing a `local`
//! declaration always creates a fresh cell, which gives every loop
//! iteration its own binding.

use std::cell::RefCell;
use std::rc::Rc;

use tandem_sdk::{NativeFunction, ScriptError, ScriptResult};

use crate::ast::*;
use crate::state::Vm;
use crate::value::{float_to_integer, Closure, Function, ScriptValue, Slot};

/// Maximum nesting of calls (script, native and builtin combined)
///
/// Every script call recurses through several interpreter frames, so the
/// limit is kept low enough for a debug build on a test thread's stack.
pub const MAX_CALL_DEPTH: usize = 48;

/// Maximum length of an `__index`/`__newindex` chain
const MAX_META_CHAIN: usize = 100;

/// Activation record of a script function
struct Frame {
    closure: Rc<Closure>,
    slots: Vec<Option<Slot>>,
    varargs: Vec<ScriptValue>,
}

impl Frame {
    fn read(&self, slot: usize) -> ScriptValue {
        match &self.slots[slot] {
            Some(cell) => cell.borrow().clone(),
            None => ScriptValue::Nil,
        }
    }

    fn write(&mut self, slot: usize, value: ScriptValue) {
        match &self.slots[slot] {
            Some(cell) => *cell.borrow_mut() = value,
            None => self.slots[slot] = Some(Rc::new(RefCell::new(value))),
        }
    }

    /// Bind a fresh cell (new declaration)
    fn declare(&mut self, slot: usize, value: ScriptValue) {
        self.slots[slot] = Some(Rc::new(RefCell::new(value)));
    }

    fn cell(&mut self, slot: usize) -> Slot {
        self.slots[slot]
            .get_or_insert_with(|| Rc::new(RefCell::new(ScriptValue::Nil)))
            .clone()
    }
}

/// Block completion
enum Flow {
    Normal,
    Break,
    Return(Vec<ScriptValue>),
}

/// Assignment target with its evaluated parts
enum Place<'e> {
    Local(usize),
    Upvalue(usize),
    Global(ScriptValue),
    Index(ScriptValue, ScriptValue, &'e Expr),
}

impl Vm {
    // ========================================================================
    // Errors
    // ========================================================================

    /// Runtime error tagged with the current chunk and line
    pub(crate) fn rt_error(&self, message: impl AsRef<str>) -> ScriptError {
        ScriptError::runtime(format!("{}:{}: {}", self.chunk, self.line, message.as_ref()))
    }

    /// " (global 'x')"-style suffix naming the variable an expression reads
    fn describe(&self, frame: &Frame, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Global(name) => format!(" (global '{}')", String::from_utf8_lossy(name)),
            ExprKind::Local(slot) => format!(" (local '{}')", frame.closure.proto.slot_names[*slot]),
            ExprKind::Upvalue(idx) => format!(" (upvalue '{}')", frame.closure.proto.upvalue_names[*idx]),
            ExprKind::Index(_, key) => match &key.kind {
                ExprKind::String(name) => format!(" (field '{}')", String::from_utf8_lossy(name)),
                _ => String::new(),
            },
            ExprKind::Method(_, name, _) => format!(" (method '{}')", String::from_utf8_lossy(name)),
            ExprKind::String(_) | ExprKind::Integer(_) | ExprKind::Number(_) => " (constant)".to_string(),
            _ => String::new(),
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Call any callable value (honours `__call`)
    pub fn call_value(&mut self, callee: ScriptValue, mut args: Vec<ScriptValue>) -> ScriptResult<Vec<ScriptValue>> {
        let func = match callee {
            ScriptValue::Function(func) => func,
            other => match self.metamethod(&other, "__call") {
                Some(handler) => {
                    args.insert(0, other);
                    return self.call_value(handler, args);
                }
                None => return Err(self.rt_error(format!("attempt to call a {} value", other.type_name()))),
            },
        };

        if self.depth >= MAX_CALL_DEPTH {
            return Err(self.rt_error("stack overflow"));
        }
        self.depth += 1;
        let result = match &*func {
            Function::Script(closure) => self.call_closure(closure.clone(), args),
            Function::Native(native) => {
                let native = native.clone();
                self.call_native(&native, args)
            }
            Function::Builtin(_, builtin) => builtin(self, args),
        };
        self.depth -= 1;
        result
    }

    fn is_callable(&self, value: &ScriptValue) -> bool {
        matches!(value, ScriptValue::Function(_)) || self.metamethod(value, "__call").is_some()
    }

    /// Run a native function in a fresh stack frame holding `args`
    pub(crate) fn call_native(
        &mut self,
        native: &NativeFunction,
        args: Vec<ScriptValue>,
    ) -> ScriptResult<Vec<ScriptValue>> {
        let saved_base = self.base;
        let base = self.stack.len();
        self.stack.extend(args);
        self.base = base;

        let result = native(self);
        let outcome = result.map(|count| {
            let top = self.stack.len();
            let count = count.min(top.saturating_sub(base));
            self.stack.split_off(top - count)
        });

        self.stack.truncate(base);
        self.base = saved_base;
        outcome
    }

    fn call_closure(&mut self, closure: Rc<Closure>, mut args: Vec<ScriptValue>) -> ScriptResult<Vec<ScriptValue>> {
        let proto = closure.proto.clone();
        let varargs = if proto.is_vararg && args.len() > proto.num_params {
            args.split_off(proto.num_params)
        } else {
            Vec::new()
        };
        args.resize(proto.num_params, ScriptValue::Nil);

        let mut slots: Vec<Option<Slot>> = vec![None; proto.num_slots()];
        for (slot, arg) in slots.iter_mut().zip(args) {
            *slot = Some(Rc::new(RefCell::new(arg)));
        }
        let mut frame = Frame {
            closure,
            slots,
            varargs,
        };

        let saved_chunk = std::mem::replace(&mut self.chunk, proto.chunk.clone());
        let saved_line = self.line;
        self.line = proto.line;
        let flow = self.exec_block(&mut frame, &proto.body);
        self.chunk = saved_chunk;
        self.line = saved_line;

        match flow? {
            Flow::Return(values) => Ok(values),
            Flow::Normal | Flow::Break => Ok(Vec::new()),
        }
    }

    fn make_closure(&self, frame: &mut Frame, proto: &Rc<FunctionProto>) -> ScriptValue {
        let upvalues = proto
            .upvalues
            .iter()
            .map(|desc| match desc {
                UpvalueDesc::Local(slot) => frame.cell(*slot),
                UpvalueDesc::Upvalue(idx) => frame.closure.upvalues[*idx].clone(),
            })
            .collect();
        ScriptValue::Function(Rc::new(Function::Script(Rc::new(Closure {
            proto: proto.clone(),
            upvalues,
        }))))
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn exec_block(&mut self, frame: &mut Frame, block: &[Stat]) -> ScriptResult<Flow> {
        for stat in block {
            match self.exec_stat(frame, stat)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stat(&mut self, frame: &mut Frame, stat: &Stat) -> ScriptResult<Flow> {
        self.line = stat.line;
        match &stat.kind {
            StatKind::Local { slots, values } => {
                let mut values = self.eval_multi(frame, values)?;
                values.resize(slots.len(), ScriptValue::Nil);
                for (slot, value) in slots.iter().zip(values) {
                    frame.declare(*slot, value);
                }
            }
            StatKind::LocalFunction { slot, func } => {
                frame.declare(*slot, ScriptValue::Nil);
                let closure = self.make_closure(frame, func);
                frame.write(*slot, closure);
            }
            StatKind::Assign { targets, values } => self.exec_assign(frame, targets, values)?,
            StatKind::Call(expr) => {
                self.eval_call(frame, expr)?;
            }
            StatKind::Do(body) => return self.exec_block(frame, body),
            StatKind::While { cond, body } => {
                while self.eval(frame, cond)?.is_truthy() {
                    match self.exec_block(frame, body)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
            }
            StatKind::Repeat { body, cond } => loop {
                match self.exec_block(frame, body)? {
                    Flow::Normal => {}
                    Flow::Break => break,
                    ret @ Flow::Return(_) => return Ok(ret),
                }
                if self.eval(frame, cond)?.is_truthy() {
                    break;
                }
            },
            StatKind::If { branches, otherwise } => {
                for (cond, body) in branches {
                    if self.eval(frame, cond)?.is_truthy() {
                        return self.exec_block(frame, body);
                    }
                }
                if let Some(body) = otherwise {
                    return self.exec_block(frame, body);
                }
            }
            StatKind::NumericFor {
                slot,
                start,
                limit,
                step,
                body,
            } => return self.exec_numeric_for(frame, *slot, start, limit, step.as_ref(), body),
            StatKind::GenericFor { slots, exprs, body } => {
                let mut state = self.eval_multi(frame, exprs)?;
                state.resize(3, ScriptValue::Nil);
                let mut control = state.pop().unwrap_or_default();
                let invariant = state.pop().unwrap_or_default();
                let iterator = state.pop().unwrap_or_default();
                loop {
                    let mut results = self.call_value(iterator.clone(), vec![invariant.clone(), control.clone()])?;
                    let first = results.first().cloned().unwrap_or_default();
                    if first.is_nil() {
                        break;
                    }
                    control = first;
                    results.resize(slots.len(), ScriptValue::Nil);
                    for (slot, value) in slots.iter().zip(results) {
                        frame.declare(*slot, value);
                    }
                    match self.exec_block(frame, body)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
            }
            StatKind::Return(values) => return Ok(Flow::Return(self.eval_multi(frame, values)?)),
            StatKind::Break => return Ok(Flow::Break),
        }
        Ok(Flow::Normal)
    }

    fn exec_numeric_for(
        &mut self,
        frame: &mut Frame,
        slot: usize,
        start: &Expr,
        limit: &Expr,
        step: Option<&Expr>,
        body: &[Stat],
    ) -> ScriptResult<Flow> {
        let start = self.eval(frame, start)?;
        let limit = self.eval(frame, limit)?;
        let step = match step {
            Some(expr) => self.eval(frame, expr)?,
            None => ScriptValue::Integer(1),
        };

        if let (ScriptValue::Integer(start), ScriptValue::Integer(step)) = (&start, &step) {
            let (start, step) = (*start, *step);
            if step == 0 {
                return Err(self.rt_error("'for' step is zero"));
            }
            let limit = match limit {
                ScriptValue::Integer(i) => i,
                ScriptValue::Number(n) if n.is_nan() => return Ok(Flow::Normal),
                ScriptValue::Number(n) => {
                    let clipped = if step > 0 { n.floor() } else { n.ceil() };
                    clipped.clamp(i64::MIN as f64, i64::MAX as f64) as i64
                }
                _ => return Err(self.rt_error("'for' limit must be a number")),
            };
            let mut i = start;
            while (step > 0 && i <= limit) || (step < 0 && i >= limit) {
                frame.declare(slot, ScriptValue::Integer(i));
                match self.exec_block(frame, body)? {
                    Flow::Normal => {}
                    Flow::Break => break,
                    ret @ Flow::Return(_) => return Ok(ret),
                }
                match i.checked_add(step) {
                    Some(next) => i = next,
                    None => break,
                }
            }
            return Ok(Flow::Normal);
        }

        let start = start
            .as_number()
            .ok_or_else(|| self.rt_error("'for' initial value must be a number"))?;
        let limit = limit
            .as_number()
            .ok_or_else(|| self.rt_error("'for' limit must be a number"))?;
        let step = step
            .as_number()
            .ok_or_else(|| self.rt_error("'for' step must be a number"))?;
        if step == 0.0 {
            return Err(self.rt_error("'for' step is zero"));
        }
        let mut x = start;
        while (step > 0.0 && x <= limit) || (step < 0.0 && x >= limit) {
            frame.declare(slot, ScriptValue::Number(x));
            match self.exec_block(frame, body)? {
                Flow::Normal => {}
                Flow::Break => break,
                ret @ Flow::Return(_) => return Ok(ret),
            }
            x += step;
        }
        Ok(Flow::Normal)
    }

    fn exec_assign(&mut self, frame: &mut Frame, targets: &[Expr], values: &[Expr]) -> ScriptResult<()> {
        let mut places = Vec::with_capacity(targets.len());
        for target in targets {
            let place = match &target.kind {
                ExprKind::Local(slot) => Place::Local(*slot),
                ExprKind::Upvalue(idx) => Place::Upvalue(*idx),
                ExprKind::Global(name) => Place::Global(ScriptValue::String(name.clone())),
                ExprKind::Index(object, key) => {
                    let object_value = self.eval(frame, object)?;
                    let key = self.eval(frame, key)?;
                    Place::Index(object_value, key, object)
                }
                _ => return Err(self.rt_error("cannot assign to this expression")),
            };
            places.push(place);
        }

        let mut values = self.eval_multi(frame, values)?;
        values.resize(places.len(), ScriptValue::Nil);

        for (place, value) in places.into_iter().zip(values) {
            match place {
                Place::Local(slot) => frame.write(slot, value),
                Place::Upvalue(idx) => *frame.closure.upvalues[idx].borrow_mut() = value,
                Place::Global(name) => {
                    let globals = ScriptValue::Table(self.globals.clone());
                    self.set_index(globals, name, value)?;
                }
                Place::Index(object, key, object_expr) => {
                    if !self.try_set_index(object.clone(), key, value)? {
                        let desc = self.describe(frame, object_expr);
                        return Err(self.rt_error(format!("attempt to index a {} value{}", object.type_name(), desc)));
                    }
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Evaluate a list, expanding the last expression to all its values
    fn eval_multi(&mut self, frame: &mut Frame, exprs: &[Expr]) -> ScriptResult<Vec<ScriptValue>> {
        let mut values = Vec::with_capacity(exprs.len());
        for (i, expr) in exprs.iter().enumerate() {
            if i + 1 == exprs.len() && expr.kind.is_multi() {
                values.extend(self.eval_call(frame, expr)?);
            } else {
                values.push(self.eval(frame, expr)?);
            }
        }
        Ok(values)
    }

    /// Evaluate a call or vararg to all of its values
    fn eval_call(&mut self, frame: &mut Frame, expr: &Expr) -> ScriptResult<Vec<ScriptValue>> {
        match &expr.kind {
            ExprKind::Vararg => Ok(frame.varargs.clone()),
            ExprKind::Call(callee, args) => {
                let function = self.eval(frame, callee)?;
                let args = self.eval_multi(frame, args)?;
                self.line = expr.line;
                if !self.is_callable(&function) {
                    let desc = self.describe(frame, callee);
                    return Err(self.rt_error(format!("attempt to call a {} value{}", function.type_name(), desc)));
                }
                self.call_value(function, args)
            }
            ExprKind::Method(object, name, args) => {
                let receiver = self.eval(frame, object)?;
                self.line = expr.line;
                let method = match self.try_index(receiver.clone(), ScriptValue::String(name.clone()))? {
                    Some(method) => method,
                    None => {
                        let desc = self.describe(frame, object);
                        return Err(self.rt_error(format!("attempt to index a {} value{}", receiver.type_name(), desc)));
                    }
                };
                let mut call_args = Vec::with_capacity(args.len() + 1);
                call_args.push(receiver);
                call_args.extend(self.eval_multi(frame, args)?);
                self.line = expr.line;
                if !self.is_callable(&method) {
                    let desc = self.describe(frame, expr);
                    return Err(self.rt_error(format!("attempt to call a {} value{}", method.type_name(), desc)));
                }
                self.call_value(method, call_args)
            }
            _ => Ok(vec![self.eval(frame, expr)?]),
        }
    }

    fn eval(&mut self, frame: &mut Frame, expr: &Expr) -> ScriptResult<ScriptValue> {
        let value = match &expr.kind {
            ExprKind::Nil => ScriptValue::Nil,
            ExprKind::True => ScriptValue::Boolean(true),
            ExprKind::False => ScriptValue::Boolean(false),
            ExprKind::Integer(i) => ScriptValue::Integer(*i),
            ExprKind::Number(n) => ScriptValue::Number(*n),
            ExprKind::String(s) => ScriptValue::String(s.clone()),
            ExprKind::Vararg => frame.varargs.first().cloned().unwrap_or_default(),
            ExprKind::Function(proto) => self.make_closure(frame, proto),
            ExprKind::Local(slot) => frame.read(*slot),
            ExprKind::Upvalue(idx) => frame.closure.upvalues[*idx].borrow().clone(),
            ExprKind::Global(name) => {
                let globals = ScriptValue::Table(self.globals.clone());
                self.index(globals, ScriptValue::String(name.clone()))?
            }
            ExprKind::Index(object, key) => {
                let object_value = self.eval(frame, object)?;
                let key = self.eval(frame, key)?;
                self.line = expr.line;
                match self.try_index(object_value.clone(), key)? {
                    Some(value) => value,
                    None => {
                        let desc = self.describe(frame, object);
                        return Err(self.rt_error(format!(
                            "attempt to index a {} value{}",
                            object_value.type_name(),
                            desc
                        )));
                    }
                }
            }
            ExprKind::Call(..) | ExprKind::Method(..) => self.eval_call(frame, expr)?.into_iter().next().unwrap_or_default(),
            ExprKind::Paren(inner) => self.eval(frame, inner)?,
            ExprKind::And(left, right) => {
                let left = self.eval(frame, left)?;
                if left.is_truthy() {
                    self.eval(frame, right)?
                } else {
                    left
                }
            }
            ExprKind::Or(left, right) => {
                let left = self.eval(frame, left)?;
                if left.is_truthy() {
                    left
                } else {
                    self.eval(frame, right)?
                }
            }
            ExprKind::Binary(op, left, right) => {
                let a = self.eval(frame, left)?;
                let b = self.eval(frame, right)?;
                self.line = expr.line;
                self.eval_binary(frame, *op, a, b, left, right)?
            }
            ExprKind::Unary(op, operand) => {
                let value = self.eval(frame, operand)?;
                self.line = expr.line;
                match op {
                    UnOp::Not => ScriptValue::Boolean(!value.is_truthy()),
                    UnOp::Neg => match self.try_negate(value.clone())? {
                        Some(result) => result,
                        None => {
                            let desc = self.describe(frame, operand);
                            return Err(self.rt_error(format!(
                                "attempt to perform arithmetic on a {} value{}",
                                value.type_name(),
                                desc
                            )));
                        }
                    },
                    UnOp::Len => match self.try_length(value.clone())? {
                        Some(result) => result,
                        None => {
                            let desc = self.describe(frame, operand);
                            return Err(self.rt_error(format!(
                                "attempt to get length of a {} value{}",
                                value.type_name(),
                                desc
                            )));
                        }
                    },
                }
            }
            ExprKind::Table(items) => self.eval_table(frame, items)?,
        };
        Ok(value)
    }

    fn eval_binary(
        &mut self,
        frame: &Frame,
        op: BinOp,
        a: ScriptValue,
        b: ScriptValue,
        left: &Expr,
        right: &Expr,
    ) -> ScriptResult<ScriptValue> {
        match op {
            BinOp::Eq => Ok(ScriptValue::Boolean(self.equals(&a, &b)?)),
            BinOp::NotEq => Ok(ScriptValue::Boolean(!self.equals(&a, &b)?)),
            BinOp::Lt | BinOp::Le => Ok(ScriptValue::Boolean(self.compare(op, &a, &b)?)),
            BinOp::Gt => Ok(ScriptValue::Boolean(self.compare(BinOp::Lt, &b, &a)?)),
            BinOp::Ge => Ok(ScriptValue::Boolean(self.compare(BinOp::Le, &b, &a)?)),
            BinOp::Concat => match self.try_concat(a.clone(), b.clone())? {
                Some(result) => Ok(result),
                None => {
                    let (bad, expr) = if matches!(a, ScriptValue::String(_)) || a.as_number().is_some() {
                        (&b, right)
                    } else {
                        (&a, left)
                    };
                    let desc = self.describe(frame, expr);
                    Err(self.rt_error(format!("attempt to concatenate a {} value{}", bad.type_name(), desc)))
                }
            },
            _ => match self.try_arith(op, a.clone(), b.clone())? {
                Some(result) => Ok(result),
                None => {
                    let (bad, expr) = if to_arith_number(&a).is_some() {
                        (&b, right)
                    } else {
                        (&a, left)
                    };
                    let desc = self.describe(frame, expr);
                    Err(self.rt_error(format!(
                        "attempt to perform arithmetic on a {} value{}",
                        bad.type_name(),
                        desc
                    )))
                }
            },
        }
    }

    fn eval_table(&mut self, frame: &mut Frame, items: &[TableItem]) -> ScriptResult<ScriptValue> {
        let positional = items.iter().filter(|i| matches!(i, TableItem::Positional(_))).count();
        let mut table = crate::value::Table::with_capacity(positional, items.len() - positional);
        let mut next_index = 1i64;
        for (i, item) in items.iter().enumerate() {
            match item {
                TableItem::Positional(expr) if i + 1 == items.len() && expr.kind.is_multi() => {
                    for value in self.eval_call(frame, expr)? {
                        table.set_int(next_index, value);
                        next_index += 1;
                    }
                }
                TableItem::Positional(expr) => {
                    let value = self.eval(frame, expr)?;
                    table.set_int(next_index, value);
                    next_index += 1;
                }
                TableItem::Keyed(key, value) => {
                    let key = self.eval(frame, key)?;
                    let value = self.eval(frame, value)?;
                    table.set(key, value).map_err(|e| self.rt_error(e))?;
                }
            }
        }
        Ok(ScriptValue::Table(Rc::new(RefCell::new(table))))
    }

    // ========================================================================
    // Metamethod-aware operations
    // ========================================================================

    /// Metamethod `event` of a value, if any
    pub fn metamethod(&self, value: &ScriptValue, event: &str) -> Option<ScriptValue> {
        let metatable = value.metatable()?;
        let handler = metatable.borrow().get_str(event.as_bytes());
        if handler.is_nil() {
            None
        } else {
            Some(handler)
        }
    }

    fn call_meta(&mut self, handler: ScriptValue, args: Vec<ScriptValue>) -> ScriptResult<ScriptValue> {
        Ok(self.call_value(handler, args)?.into_iter().next().unwrap_or_default())
    }

    /// `object[key]` honouring `__index`; `None` when `object` cannot be indexed
    pub fn try_index(&mut self, object: ScriptValue, key: ScriptValue) -> ScriptResult<Option<ScriptValue>> {
        let mut current = object;
        for _ in 0..MAX_META_CHAIN {
            let handler = if let ScriptValue::Table(table) = &current {
                let raw = table.borrow().get(&key);
                if !raw.is_nil() {
                    return Ok(Some(raw));
                }
                match self.metamethod(&current, "__index") {
                    Some(handler) => handler,
                    None => return Ok(Some(ScriptValue::Nil)),
                }
            } else {
                match self.metamethod(&current, "__index") {
                    Some(handler) => handler,
                    None => return Ok(None),
                }
            };
            if let ScriptValue::Function(_) = handler {
                return Ok(Some(self.call_meta(handler, vec![current, key])?));
            }
            current = handler;
        }
        Err(self.rt_error("'__index' chain too long; possible loop"))
    }

    /// `object[key]` honouring `__index`
    pub fn index(&mut self, object: ScriptValue, key: ScriptValue) -> ScriptResult<ScriptValue> {
        let type_name = object.type_name();
        self.try_index(object, key)?
            .ok_or_else(|| self.rt_error(format!("attempt to index a {} value", type_name)))
    }

    /// `object[key] = value` honouring `__newindex`; `false` when `object` cannot be indexed
    pub fn try_set_index(&mut self, object: ScriptValue, key: ScriptValue, value: ScriptValue) -> ScriptResult<bool> {
        let mut current = object;
        for _ in 0..MAX_META_CHAIN {
            let handler = if let ScriptValue::Table(table) = &current {
                let present = !table.borrow().get(&key).is_nil();
                let handler = if present {
                    None
                } else {
                    self.metamethod(&current, "__newindex")
                };
                match handler {
                    Some(handler) => handler,
                    None => {
                        table.borrow_mut().set(key, value).map_err(|e| self.rt_error(e))?;
                        return Ok(true);
                    }
                }
            } else {
                match self.metamethod(&current, "__newindex") {
                    Some(handler) => handler,
                    None => return Ok(false),
                }
            };
            if let ScriptValue::Function(_) = handler {
                self.call_value(handler, vec![current, key, value])?;
                return Ok(true);
            }
            current = handler;
        }
        Err(self.rt_error("'__newindex' chain too long; possible loop"))
    }

    /// `object[key] = value` honouring `__newindex`
    pub fn set_index(&mut self, object: ScriptValue, key: ScriptValue, value: ScriptValue) -> ScriptResult<()> {
        let type_name = object.type_name();
        if self.try_set_index(object, key, value)? {
            Ok(())
        } else {
            Err(self.rt_error(format!("attempt to index a {} value", type_name)))
        }
    }

    /// Arithmetic with string coercion and metamethod fallback
    pub fn try_arith(&mut self, op: BinOp, a: ScriptValue, b: ScriptValue) -> ScriptResult<Option<ScriptValue>> {
        if let (Some(x), Some(y)) = (to_arith_number(&a), to_arith_number(&b)) {
            return self.arith_numbers(op, x, y).map(Some);
        }
        match self.metamethod(&a, op.event()).or_else(|| self.metamethod(&b, op.event())) {
            Some(handler) => Ok(Some(self.call_meta(handler, vec![a, b])?)),
            None => Ok(None),
        }
    }

    fn arith_numbers(&self, op: BinOp, a: ScriptValue, b: ScriptValue) -> ScriptResult<ScriptValue> {
        if let (ScriptValue::Integer(x), ScriptValue::Integer(y)) = (&a, &b) {
            let (x, y) = (*x, *y);
            match op {
                BinOp::Add => return Ok(ScriptValue::Integer(x.wrapping_add(y))),
                BinOp::Sub => return Ok(ScriptValue::Integer(x.wrapping_sub(y))),
                BinOp::Mul => return Ok(ScriptValue::Integer(x.wrapping_mul(y))),
                BinOp::IDiv => {
                    if y == 0 {
                        return Err(self.rt_error("attempt to perform 'n//0'"));
                    }
                    let mut q = x.wrapping_div(y);
                    if x.wrapping_rem(y) != 0 && ((x ^ y) < 0) {
                        q -= 1;
                    }
                    return Ok(ScriptValue::Integer(q));
                }
                BinOp::Mod => {
                    if y == 0 {
                        return Err(self.rt_error("attempt to perform 'n%%0'"));
                    }
                    let mut r = x.wrapping_rem(y);
                    if r != 0 && ((r ^ y) < 0) {
                        r += y;
                    }
                    return Ok(ScriptValue::Integer(r));
                }
                _ => {}
            }
        }
        let x = a.as_number().unwrap_or(f64::NAN);
        let y = b.as_number().unwrap_or(f64::NAN);
        let result = match op {
            BinOp::Add => x + y,
            BinOp::Sub => x - y,
            BinOp::Mul => x * y,
            BinOp::Div => x / y,
            BinOp::IDiv => (x / y).floor(),
            BinOp::Mod => {
                let m = x % y;
                if m != 0.0 && ((m > 0.0) != (y > 0.0)) {
                    m + y
                } else {
                    m
                }
            }
            BinOp::Pow => x.powf(y),
            _ => f64::NAN,
        };
        Ok(ScriptValue::Number(result))
    }

    fn try_negate(&mut self, value: ScriptValue) -> ScriptResult<Option<ScriptValue>> {
        match to_arith_number(&value) {
            Some(ScriptValue::Integer(i)) => Ok(Some(ScriptValue::Integer(i.wrapping_neg()))),
            Some(ScriptValue::Number(n)) => Ok(Some(ScriptValue::Number(-n))),
            _ => match self.metamethod(&value, "__unm") {
                Some(handler) => Ok(Some(self.call_meta(handler, vec![value.clone(), value])?)),
                None => Ok(None),
            },
        }
    }

    /// `#value`; `None` when the value has no length
    pub fn try_length(&mut self, value: ScriptValue) -> ScriptResult<Option<ScriptValue>> {
        if let ScriptValue::String(s) = &value {
            return Ok(Some(ScriptValue::Integer(s.len() as i64)));
        }
        if let Some(handler) = self.metamethod(&value, "__len") {
            return Ok(Some(self.call_meta(handler, vec![value])?));
        }
        match &value {
            ScriptValue::Table(table) => Ok(Some(ScriptValue::Integer(table.borrow().len() as i64))),
            _ => Ok(None),
        }
    }

    fn try_concat(&mut self, a: ScriptValue, b: ScriptValue) -> ScriptResult<Option<ScriptValue>> {
        if let (Some(x), Some(y)) = (concat_bytes(&a), concat_bytes(&b)) {
            let mut joined = x;
            joined.extend_from_slice(&y);
            return Ok(Some(self.new_string(&joined)));
        }
        match self.metamethod(&a, "__concat").or_else(|| self.metamethod(&b, "__concat")) {
            Some(handler) => Ok(Some(self.call_meta(handler, vec![a, b])?)),
            None => Ok(None),
        }
    }

    /// `a == b` honouring `__eq` for tables and userdata
    pub fn equals(&mut self, a: &ScriptValue, b: &ScriptValue) -> ScriptResult<bool> {
        if a.raw_equals(b) {
            return Ok(true);
        }
        let comparable = matches!(
            (a, b),
            (ScriptValue::Table(_), ScriptValue::Table(_)) | (ScriptValue::UserData(_), ScriptValue::UserData(_))
        );
        if !comparable {
            return Ok(false);
        }
        match self.metamethod(a, "__eq").or_else(|| self.metamethod(b, "__eq")) {
            Some(handler) => Ok(self.call_meta(handler, vec![a.clone(), b.clone()])?.is_truthy()),
            None => Ok(false),
        }
    }

    /// `a < b` or `a <= b`
    pub fn compare(&mut self, op: BinOp, a: &ScriptValue, b: &ScriptValue) -> ScriptResult<bool> {
        let less_equal = op == BinOp::Le;
        match (a, b) {
            (ScriptValue::Integer(x), ScriptValue::Integer(y)) => return Ok(if less_equal { x <= y } else { x < y }),
            (ScriptValue::String(x), ScriptValue::String(y)) => {
                return Ok(if less_equal { x[..] <= y[..] } else { x[..] < y[..] })
            }
            _ => {}
        }
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return Ok(if less_equal { x <= y } else { x < y });
        }
        let event = op.event();
        match self.metamethod(a, event).or_else(|| self.metamethod(b, event)) {
            Some(handler) => Ok(self.call_meta(handler, vec![a.clone(), b.clone()])?.is_truthy()),
            None => {
                let (ta, tb) = (a.type_name(), b.type_name());
                Err(if ta == tb {
                    self.rt_error(format!("attempt to compare two {} values", ta))
                } else {
                    self.rt_error(format!("attempt to compare {} with {}", ta, tb))
                })
            }
        }
    }

    /// Display bytes of a value, honouring `__tostring` and `__name`
    pub fn tostring(&mut self, value: &ScriptValue) -> ScriptResult<Vec<u8>> {
        if let Some(handler) = self.metamethod(value, "__tostring") {
            return match self.call_meta(handler, vec![value.clone()])? {
                ScriptValue::String(s) => Ok(s.to_vec()),
                other if other.as_number().is_some() => Ok(format_value(&other).into_bytes()),
                _ => Err(ScriptError::runtime("'__tostring' must return a string")),
            };
        }
        if let Some(address) = value.identity() {
            let name = value
                .metatable()
                .map(|mt| mt.borrow().get_str(b"__name"))
                .and_then(|name| name.as_bytes().map(|b| String::from_utf8_lossy(b).into_owned()))
                .unwrap_or_else(|| value.type_name().to_string());
            return Ok(format!("{}: 0x{:014x}", name, address).into_bytes());
        }
        Ok(match value {
            ScriptValue::String(s) => s.to_vec(),
            other => format_value(other).into_bytes(),
        })
    }
}

/// Number view for arithmetic, converting numeric strings
pub fn to_arith_number(value: &ScriptValue) -> Option<ScriptValue> {
    match value {
        ScriptValue::Integer(_) | ScriptValue::Number(_) => Some(value.clone()),
        ScriptValue::String(s) => parse_number(s),
        _ => None,
    }
}

fn concat_bytes(value: &ScriptValue) -> Option<Vec<u8>> {
    match value {
        ScriptValue::String(s) => Some(s.to_vec()),
        ScriptValue::Integer(_) | ScriptValue::Number(_) => Some(format_value(value).into_bytes()),
        _ => None,
    }
}

/// Parse a numeral the way `tonumber` does (surrounding whitespace allowed)
pub fn parse_number(bytes: &[u8]) -> Option<ScriptValue> {
    let text = std::str::from_utf8(bytes).ok()?.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let value = hex.bytes().fold(0i64, |acc, b| {
            acc.wrapping_mul(16)
                .wrapping_add((b as char).to_digit(16).unwrap_or(0) as i64)
        });
        return Some(ScriptValue::Integer(if negative { value.wrapping_neg() } else { value }));
    }
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')) {
        return None;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(ScriptValue::Integer(i));
    }
    text.parse::<f64>().ok().map(ScriptValue::Number)
}

/// `%.14g` rendering of a float, with ".0" appended to integral results
pub fn format_float(n: f64) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let formatted = format_general(n, 14);
    if formatted.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
        format!("{}.0", formatted)
    } else {
        formatted
    }
}

/// C-style `%.{precision}g`
fn format_general(n: f64, precision: usize) -> String {
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let scientific = format!("{:.*e}", precision - 1, n);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some(parts) => parts,
        None => return scientific,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if exponent < -4 || exponent >= precision as i32 {
        let mantissa = trim_fraction(mantissa);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, n)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Display form of a primitive value
pub fn format_value(value: &ScriptValue) -> String {
    match value {
        ScriptValue::Nil => "nil".to_string(),
        ScriptValue::Boolean(b) => b.to_string(),
        ScriptValue::Integer(i) => i.to_string(),
        ScriptValue::Number(n) => format_float(*n),
        ScriptValue::String(s) => String::from_utf8_lossy(s).into_owned(),
        other => format!("{}: 0x{:014x}", other.type_name(), other.identity().unwrap_or(0)),
    }
}

/// Integer view used by integer-only builtins
pub fn exact_integer(value: &ScriptValue) -> Option<i64> {
    match value {
        ScriptValue::Integer(i) => Some(*i),
        ScriptValue::Number(n) => float_to_integer(*n),
        ScriptValue::String(s) => parse_number(s).and_then(|v| exact_integer(&v)),
        _ => None,
    }
}
