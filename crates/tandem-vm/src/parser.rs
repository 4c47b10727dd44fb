//! Recursive-descent parser producing a resolved [`FunctionProto`].

use std::rc::Rc;

use tandem_sdk::{ScriptError, ScriptResult};

use crate::ast::*;
use crate::lexer::{tokenize, Numeral, Spanned, Token};
use crate::value::{ScriptString, StringInterner};

/// Maximum nesting depth of blocks and expressions
///
/// Kept low so deeply nested chunks are rejected before the recursive
/// descent exhausts the stack of a test thread.
pub const MAX_PARSE_DEPTH: usize = 100;

/// Priority of unary operators
const UNARY_PRIORITY: u8 = 12;

/// Per-function resolution state
#[derive(Default)]
struct FuncState {
    slot_names: Vec<String>,
    /// Visible locals, innermost last
    active: Vec<(String, usize)>,
    /// `active.len()` at the start of each open block
    scopes: Vec<usize>,
    upvalues: Vec<(String, UpvalueDesc)>,
    is_vararg: bool,
    loop_depth: usize,
}

impl FuncState {
    fn declare(&mut self, name: String) -> usize {
        let slot = self.slot_names.len();
        self.slot_names.push(name);
        slot
    }

    fn activate(&mut self, name: String, slot: usize) {
        self.active.push((name, slot));
    }

    fn find_local(&self, name: &str) -> Option<usize> {
        self.active.iter().rev().find(|(n, _)| n == name).map(|(_, slot)| *slot)
    }

    fn find_upvalue(&self, name: &str) -> Option<usize> {
        self.upvalues.iter().position(|(n, _)| n == name)
    }
}

/// Resolved variable
enum Var {
    Local(usize),
    Upvalue(usize),
}

/// Parser over a token vector
pub struct Parser<'a> {
    tokens: Vec<Spanned>,
    pos: usize,
    chunk: Rc<str>,
    interner: &'a mut StringInterner,
    funcs: Vec<FuncState>,
    depth: usize,
}

/// Parse a chunk into its main function
pub fn parse_chunk(source: &str, chunk: &str, interner: &mut StringInterner) -> ScriptResult<Rc<FunctionProto>> {
    let tokens = tokenize(source, chunk)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        chunk: Rc::from(chunk),
        interner,
        funcs: Vec::new(),
        depth: 0,
    };
    parser.main_function()
}

impl<'a> Parser<'a> {
    // ========================================================================
    // Token helpers
    // ========================================================================

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].token
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn accept(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> ScriptResult<T> {
        Err(ScriptError::Syntax {
            chunk: self.chunk.to_string(),
            line: self.line(),
            message: message.into(),
        })
    }

    fn error_near<T>(&self, message: &str) -> ScriptResult<T> {
        self.error(format!("{} near '{}'", message, self.peek().describe()))
    }

    fn expect(&mut self, token: Token, what: &str) -> ScriptResult<()> {
        if self.accept(&token) {
            Ok(())
        } else {
            self.error_near(&format!("'{}' expected", what))
        }
    }

    fn expect_closing(&mut self, token: Token, what: &str, opener: &str, line: u32) -> ScriptResult<()> {
        if self.accept(&token) {
            Ok(())
        } else if line == self.line() {
            self.error_near(&format!("'{}' expected", what))
        } else {
            self.error_near(&format!("'{}' expected (to close '{}' at line {})", what, opener, line))
        }
    }

    fn expect_name(&mut self) -> ScriptResult<String> {
        match self.peek().clone() {
            Token::Name(name) => {
                self.advance();
                Ok(name)
            }
            _ => self.error_near("<name> expected"),
        }
    }

    fn enter(&mut self) -> ScriptResult<()> {
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            return self.error(format!("chunk has too many syntax levels (limit is {})", MAX_PARSE_DEPTH));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn string(&mut self, bytes: &[u8]) -> ScriptString {
        self.interner.string(bytes)
    }

    // ========================================================================
    // Scopes and resolution
    // ========================================================================

    fn func(&mut self) -> &mut FuncState {
        let current = self.funcs.len() - 1;
        &mut self.funcs[current]
    }

    fn open_scope(&mut self) {
        let func = self.func();
        let mark = func.active.len();
        func.scopes.push(mark);
    }

    fn close_scope(&mut self) {
        let func = self.func();
        if let Some(mark) = func.scopes.pop() {
            func.active.truncate(mark);
        }
    }

    fn resolve(&mut self, name: &str) -> Option<Var> {
        let level = self.funcs.len() - 1;
        self.resolve_at(level, name)
    }

    fn resolve_at(&mut self, level: usize, name: &str) -> Option<Var> {
        if let Some(slot) = self.funcs[level].find_local(name) {
            return Some(Var::Local(slot));
        }
        if let Some(idx) = self.funcs[level].find_upvalue(name) {
            return Some(Var::Upvalue(idx));
        }
        if level == 0 {
            return None;
        }
        let desc = match self.resolve_at(level - 1, name)? {
            Var::Local(slot) => UpvalueDesc::Local(slot),
            Var::Upvalue(idx) => UpvalueDesc::Upvalue(idx),
        };
        let upvalues = &mut self.funcs[level].upvalues;
        upvalues.push((name.to_string(), desc));
        Some(Var::Upvalue(upvalues.len() - 1))
    }

    fn name_expr(&mut self, name: &str, line: u32) -> Expr {
        let kind = match self.resolve(name) {
            Some(Var::Local(slot)) => ExprKind::Local(slot),
            Some(Var::Upvalue(idx)) => ExprKind::Upvalue(idx),
            None => ExprKind::Global(self.string(name.as_bytes())),
        };
        Expr { kind, line }
    }

    // ========================================================================
    // Functions
    // ========================================================================

    fn main_function(&mut self) -> ScriptResult<Rc<FunctionProto>> {
        self.funcs.push(FuncState {
            is_vararg: true,
            ..Default::default()
        });
        self.open_scope();
        let body = self.block()?;
        if !self.check(&Token::Eof) {
            return self.error_near("'<eof>' expected");
        }
        let state = self.funcs.pop().unwrap_or_default();
        Ok(Rc::new(FunctionProto {
            name: "main chunk".to_string(),
            chunk: self.chunk.clone(),
            line: 0,
            num_params: 0,
            is_vararg: true,
            slot_names: state.slot_names,
            upvalues: Vec::new(),
            upvalue_names: Vec::new(),
            body,
        }))
    }

    /// Parse `(params) block end` after the `function` keyword
    fn function_body(&mut self, name: String, is_method: bool, line: u32) -> ScriptResult<Rc<FunctionProto>> {
        self.enter()?;
        self.funcs.push(FuncState::default());
        self.open_scope();
        if is_method {
            let slot = self.func().declare("self".to_string());
            self.func().activate("self".to_string(), slot);
        }

        self.expect(Token::LParen, "(")?;
        if !self.check(&Token::RParen) {
            loop {
                if self.accept(&Token::Ellipsis) {
                    self.func().is_vararg = true;
                    break;
                }
                let param = self.expect_name()?;
                let slot = self.func().declare(param.clone());
                self.func().activate(param, slot);
                if !self.accept(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen, ")")?;

        let num_params = self.func().active.len();
        let body = self.block()?;
        self.expect_closing(Token::End, "end", "function", line)?;

        let state = self.funcs.pop().unwrap_or_default();
        self.leave();
        let (upvalue_names, upvalues) = state.upvalues.into_iter().unzip();
        Ok(Rc::new(FunctionProto {
            name,
            chunk: self.chunk.clone(),
            line,
            num_params,
            is_vararg: state.is_vararg,
            slot_names: state.slot_names,
            upvalues,
            upvalue_names,
            body,
        }))
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn block_follow(&self) -> bool {
        matches!(
            self.peek(),
            Token::Else | Token::ElseIf | Token::End | Token::Until | Token::Eof
        )
    }

    fn block(&mut self) -> ScriptResult<Block> {
        self.enter()?;
        let mut stats = Vec::new();
        while !self.block_follow() {
            if self.check(&Token::Return) {
                stats.push(self.return_stat()?);
                break;
            }
            if let Some(stat) = self.statement()? {
                stats.push(stat);
            }
        }
        self.leave();
        Ok(stats)
    }

    fn scoped_block(&mut self) -> ScriptResult<Block> {
        self.open_scope();
        let block = self.block();
        self.close_scope();
        block
    }

    fn return_stat(&mut self) -> ScriptResult<Stat> {
        let line = self.line();
        self.advance();
        let values = if self.block_follow() || self.check(&Token::Semicolon) {
            Vec::new()
        } else {
            self.expr_list()?
        };
        self.accept(&Token::Semicolon);
        if !self.block_follow() {
            return self.error_near("'<eof>' expected");
        }
        Ok(Stat {
            kind: StatKind::Return(values),
            line,
        })
    }

    fn statement(&mut self) -> ScriptResult<Option<Stat>> {
        let line = self.line();
        let kind = match self.peek() {
            Token::Semicolon => {
                self.advance();
                return Ok(None);
            }
            Token::If => self.if_stat(line)?,
            Token::While => {
                self.advance();
                let cond = self.expr()?;
                self.expect(Token::Do, "do")?;
                let body = self.loop_body()?;
                self.expect_closing(Token::End, "end", "while", line)?;
                StatKind::While { cond, body }
            }
            Token::Do => {
                self.advance();
                let body = self.scoped_block()?;
                self.expect_closing(Token::End, "end", "do", line)?;
                StatKind::Do(body)
            }
            Token::For => self.for_stat(line)?,
            Token::Repeat => {
                self.advance();
                self.func().loop_depth += 1;
                self.open_scope();
                let body = self.block()?;
                self.expect_closing(Token::Until, "until", "repeat", line)?;
                let cond = self.expr();
                self.close_scope();
                self.func().loop_depth -= 1;
                StatKind::Repeat { body, cond: cond? }
            }
            Token::Function => self.function_stat(line)?,
            Token::Local => {
                self.advance();
                if self.accept(&Token::Function) {
                    let name = self.expect_name()?;
                    let slot = self.func().declare(name.clone());
                    self.func().activate(name.clone(), slot);
                    let func = self.function_body(name, false, line)?;
                    StatKind::LocalFunction { slot, func }
                } else {
                    self.local_stat()?
                }
            }
            Token::Break => {
                self.advance();
                if self.func().loop_depth == 0 {
                    return self.error(format!("break outside a loop at line {}", line));
                }
                StatKind::Break
            }
            _ => self.expr_stat()?,
        };
        Ok(Some(Stat { kind, line }))
    }

    fn loop_body(&mut self) -> ScriptResult<Block> {
        self.func().loop_depth += 1;
        let body = self.scoped_block();
        self.func().loop_depth -= 1;
        body
    }

    fn if_stat(&mut self, line: u32) -> ScriptResult<StatKind> {
        self.advance();
        let mut branches = Vec::new();
        let cond = self.expr()?;
        self.expect(Token::Then, "then")?;
        branches.push((cond, self.scoped_block()?));

        let mut otherwise = None;
        loop {
            if self.accept(&Token::ElseIf) {
                let cond = self.expr()?;
                self.expect(Token::Then, "then")?;
                branches.push((cond, self.scoped_block()?));
            } else if self.accept(&Token::Else) {
                otherwise = Some(self.scoped_block()?);
                self.expect_closing(Token::End, "end", "if", line)?;
                break;
            } else {
                self.expect_closing(Token::End, "end", "if", line)?;
                break;
            }
        }
        Ok(StatKind::If { branches, otherwise })
    }

    fn for_stat(&mut self, line: u32) -> ScriptResult<StatKind> {
        self.advance();
        let first = self.expect_name()?;
        if self.accept(&Token::Assign) {
            let start = self.expr()?;
            self.expect(Token::Comma, ",")?;
            let limit = self.expr()?;
            let step = if self.accept(&Token::Comma) {
                Some(self.expr()?)
            } else {
                None
            };
            self.expect(Token::Do, "do")?;
            self.open_scope();
            let slot = self.func().declare(first.clone());
            self.func().activate(first, slot);
            let body = self.loop_body();
            self.close_scope();
            let body = body?;
            self.expect_closing(Token::End, "end", "for", line)?;
            return Ok(StatKind::NumericFor {
                slot,
                start,
                limit,
                step,
                body,
            });
        }

        let mut names = vec![first];
        while self.accept(&Token::Comma) {
            names.push(self.expect_name()?);
        }
        if !self.accept(&Token::In) {
            return self.error_near("'=' or 'in' expected");
        }
        let exprs = self.expr_list()?;
        self.expect(Token::Do, "do")?;
        self.open_scope();
        let slots = names
            .into_iter()
            .map(|name| {
                let slot = self.func().declare(name.clone());
                self.func().activate(name, slot);
                slot
            })
            .collect();
        let body = self.loop_body();
        self.close_scope();
        let body = body?;
        self.expect_closing(Token::End, "end", "for", line)?;
        Ok(StatKind::GenericFor { slots, exprs, body })
    }

    fn function_stat(&mut self, line: u32) -> ScriptResult<StatKind> {
        self.advance();
        let first = self.expect_name()?;
        let mut full_name = first.clone();
        let mut target = self.name_expr(&first, line);
        let mut is_method = false;

        loop {
            let separator = if self.accept(&Token::Dot) {
                "."
            } else if self.accept(&Token::Colon) {
                is_method = true;
                ":"
            } else {
                break;
            };
            let key_line = self.line();
            let key = self.expect_name()?;
            full_name.push_str(separator);
            full_name.push_str(&key);
            let key = Expr {
                kind: ExprKind::String(self.string(key.as_bytes())),
                line: key_line,
            };
            target = Expr {
                kind: ExprKind::Index(Box::new(target), Box::new(key)),
                line: key_line,
            };
            if is_method {
                break;
            }
        }

        let func = self.function_body(full_name, is_method, line)?;
        Ok(StatKind::Assign {
            targets: vec![target],
            values: vec![Expr {
                kind: ExprKind::Function(func),
                line,
            }],
        })
    }

    fn local_stat(&mut self) -> ScriptResult<StatKind> {
        let mut names = Vec::new();
        loop {
            names.push(self.expect_name()?);
            // attributes (<const>, <close>) are accepted and ignored
            if self.accept(&Token::Less) {
                self.expect_name()?;
                self.expect(Token::Greater, ">")?;
            }
            if !self.accept(&Token::Comma) {
                break;
            }
        }
        let values = if self.accept(&Token::Assign) {
            self.expr_list()?
        } else {
            Vec::new()
        };
        let slots = names
            .into_iter()
            .map(|name| {
                let slot = self.func().declare(name.clone());
                self.func().activate(name, slot);
                slot
            })
            .collect();
        Ok(StatKind::Local { slots, values })
    }

    fn expr_stat(&mut self) -> ScriptResult<StatKind> {
        let first = self.suffixed_expr()?;
        if self.check(&Token::Assign) || self.check(&Token::Comma) {
            let mut targets = vec![first];
            while self.accept(&Token::Comma) {
                targets.push(self.suffixed_expr()?);
            }
            for target in &targets {
                if !matches!(
                    target.kind,
                    ExprKind::Local(_) | ExprKind::Upvalue(_) | ExprKind::Global(_) | ExprKind::Index(..)
                ) {
                    return self.error_near("syntax error");
                }
            }
            self.expect(Token::Assign, "=")?;
            let values = self.expr_list()?;
            return Ok(StatKind::Assign { targets, values });
        }
        if !matches!(first.kind, ExprKind::Call(..) | ExprKind::Method(..)) {
            return self.error_near("syntax error");
        }
        Ok(StatKind::Call(first))
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn expr_list(&mut self) -> ScriptResult<Vec<Expr>> {
        let mut exprs = vec![self.expr()?];
        while self.accept(&Token::Comma) {
            exprs.push(self.expr()?);
        }
        Ok(exprs)
    }

    /// Parse a full expression
    pub fn expr(&mut self) -> ScriptResult<Expr> {
        self.sub_expr(0)
    }

    fn binary_op(&self) -> Option<(BinOp, u8, u8)> {
        let op = match self.peek() {
            Token::Plus => (BinOp::Add, 10, 10),
            Token::Minus => (BinOp::Sub, 10, 10),
            Token::Star => (BinOp::Mul, 11, 11),
            Token::Slash => (BinOp::Div, 11, 11),
            Token::DoubleSlash => (BinOp::IDiv, 11, 11),
            Token::Percent => (BinOp::Mod, 11, 11),
            Token::Caret => (BinOp::Pow, 14, 13),
            Token::Concat => (BinOp::Concat, 9, 8),
            Token::Eq => (BinOp::Eq, 3, 3),
            Token::NotEq => (BinOp::NotEq, 3, 3),
            Token::Less => (BinOp::Lt, 3, 3),
            Token::LessEq => (BinOp::Le, 3, 3),
            Token::Greater => (BinOp::Gt, 3, 3),
            Token::GreaterEq => (BinOp::Ge, 3, 3),
            // and/or are handled as binary ops with their own node kinds
            Token::And => (BinOp::Eq, 2, 2),
            Token::Or => (BinOp::Eq, 1, 1),
            _ => return None,
        };
        Some(op)
    }

    fn sub_expr(&mut self, limit: u8) -> ScriptResult<Expr> {
        self.enter()?;
        let line = self.line();
        let unary = match self.peek() {
            Token::Not => Some(UnOp::Not),
            Token::Minus => Some(UnOp::Neg),
            Token::Hash => Some(UnOp::Len),
            _ => None,
        };

        let mut left = if let Some(op) = unary {
            self.advance();
            let operand = self.sub_expr(UNARY_PRIORITY)?;
            fold_unary(op, operand, line)
        } else {
            self.simple_expr()?
        };

        while let Some((op, left_priority, right_priority)) = self.binary_op() {
            if left_priority <= limit {
                break;
            }
            let op_token = self.advance();
            let right = self.sub_expr(right_priority)?;
            let kind = match op_token {
                Token::And => ExprKind::And(Box::new(left), Box::new(right)),
                Token::Or => ExprKind::Or(Box::new(left), Box::new(right)),
                _ => ExprKind::Binary(op, Box::new(left), Box::new(right)),
            };
            left = Expr { kind, line };
        }
        self.leave();
        Ok(left)
    }

    fn simple_expr(&mut self) -> ScriptResult<Expr> {
        let line = self.line();
        let kind = match self.peek().clone() {
            Token::Number(Numeral::Int(i)) => ExprKind::Integer(i),
            Token::Number(Numeral::Float(f)) => ExprKind::Number(f),
            Token::String(bytes) => ExprKind::String(self.string(&bytes)),
            Token::Nil => ExprKind::Nil,
            Token::True => ExprKind::True,
            Token::False => ExprKind::False,
            Token::Ellipsis => {
                if !self.func().is_vararg {
                    return self.error_near("cannot use '...' outside a vararg function");
                }
                ExprKind::Vararg
            }
            Token::LBrace => return self.table_constructor(),
            Token::Function => {
                self.advance();
                let func = self.function_body("anonymous".to_string(), false, line)?;
                return Ok(Expr {
                    kind: ExprKind::Function(func),
                    line,
                });
            }
            _ => return self.suffixed_expr(),
        };
        self.advance();
        Ok(Expr { kind, line })
    }

    fn primary_expr(&mut self) -> ScriptResult<Expr> {
        let line = self.line();
        match self.peek().clone() {
            Token::Name(name) => {
                self.advance();
                Ok(self.name_expr(&name, line))
            }
            Token::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect_closing(Token::RParen, ")", "(", line)?;
                Ok(Expr {
                    kind: ExprKind::Paren(Box::new(inner)),
                    line,
                })
            }
            _ => self.error_near("unexpected symbol"),
        }
    }

    fn suffixed_expr(&mut self) -> ScriptResult<Expr> {
        self.enter()?;
        let mut expr = self.primary_expr()?;
        loop {
            let line = self.line();
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let name = self.expect_name()?;
                    let key = Expr {
                        kind: ExprKind::String(self.string(name.as_bytes())),
                        line,
                    };
                    expr = Expr {
                        kind: ExprKind::Index(Box::new(expr), Box::new(key)),
                        line,
                    };
                }
                Token::LBracket => {
                    self.advance();
                    let key = self.expr()?;
                    self.expect(Token::RBracket, "]")?;
                    expr = Expr {
                        kind: ExprKind::Index(Box::new(expr), Box::new(key)),
                        line,
                    };
                }
                Token::Colon => {
                    self.advance();
                    let name = self.expect_name()?;
                    let name = self.string(name.as_bytes());
                    let args = self.call_args()?;
                    expr = Expr {
                        kind: ExprKind::Method(Box::new(expr), name, args),
                        line,
                    };
                }
                Token::LParen | Token::String(_) | Token::LBrace => {
                    let args = self.call_args()?;
                    expr = Expr {
                        kind: ExprKind::Call(Box::new(expr), args),
                        line,
                    };
                }
                _ => break,
            }
        }
        self.leave();
        Ok(expr)
    }

    fn call_args(&mut self) -> ScriptResult<Vec<Expr>> {
        let line = self.line();
        match self.peek().clone() {
            Token::String(bytes) => {
                self.advance();
                Ok(vec![Expr {
                    kind: ExprKind::String(self.string(&bytes)),
                    line,
                }])
            }
            Token::LBrace => Ok(vec![self.table_constructor()?]),
            Token::LParen => {
                self.advance();
                if self.accept(&Token::RParen) {
                    return Ok(Vec::new());
                }
                let args = self.expr_list()?;
                self.expect_closing(Token::RParen, ")", "(", line)?;
                Ok(args)
            }
            _ => self.error_near("function arguments expected"),
        }
    }

    fn table_constructor(&mut self) -> ScriptResult<Expr> {
        let line = self.line();
        self.expect(Token::LBrace, "{")?;
        let mut items = Vec::new();
        while !self.check(&Token::RBrace) {
            let keyed_by_name = matches!(self.peek_at(1), Token::Assign);
            let item = match self.peek().clone() {
                Token::LBracket => {
                    self.advance();
                    let key = self.expr()?;
                    self.expect(Token::RBracket, "]")?;
                    self.expect(Token::Assign, "=")?;
                    TableItem::Keyed(key, self.expr()?)
                }
                Token::Name(name) if keyed_by_name => {
                    let key_line = self.line();
                    self.advance();
                    self.advance();
                    let key = Expr {
                        kind: ExprKind::String(self.string(name.as_bytes())),
                        line: key_line,
                    };
                    TableItem::Keyed(key, self.expr()?)
                }
                _ => TableItem::Positional(self.expr()?),
            };
            items.push(item);
            if !self.accept(&Token::Comma) && !self.accept(&Token::Semicolon) {
                break;
            }
        }
        self.expect_closing(Token::RBrace, "}", "{", line)?;
        Ok(Expr {
            kind: ExprKind::Table(items),
            line,
        })
    }
}

/// Fold negation of numeric literals so `-1` is a constant
fn fold_unary(op: UnOp, operand: Expr, line: u32) -> Expr {
    let kind = match (op, operand.kind) {
        (UnOp::Neg, ExprKind::Integer(i)) => ExprKind::Integer(i.wrapping_neg()),
        (UnOp::Neg, ExprKind::Number(n)) => ExprKind::Number(-n),
        (op, kind) => ExprKind::Unary(
            op,
            Box::new(Expr {
                kind,
                line: operand.line,
            }),
        ),
    };
    Expr { kind, line }
}
