//! Resolved syntax tree.
//!
//! Variable references are resolved while parsing: every name is already a
//! frame slot, a captured upvalue, or a global by the time the tree reaches
//! the interpreter.

use std::rc::Rc;

use crate::value::ScriptString;

/// A sequence of statements
pub type Block = Vec<Stat>;

/// Compiled function body
#[derive(Debug)]
pub struct FunctionProto {
    /// Name used in diagnostics ("main chunk" for the top level)
    pub name: String,
    /// Chunk the function was loaded from
    pub chunk: Rc<str>,
    /// Line of the `function` keyword
    pub line: u32,
    /// Number of fixed parameters (slots `0..num_params`)
    pub num_params: usize,
    /// Whether the function accepts `...`
    pub is_vararg: bool,
    /// Debug names of every slot
    pub slot_names: Vec<String>,
    /// Captures, in upvalue index order
    pub upvalues: Vec<UpvalueDesc>,
    /// Debug names of the upvalues
    pub upvalue_names: Vec<String>,
    /// Body
    pub body: Block,
}

impl FunctionProto {
    /// Number of slots a frame of this function needs
    pub fn num_slots(&self) -> usize {
        self.slot_names.len()
    }
}

/// Where a closure finds a captured variable when it is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpvalueDesc {
    /// Slot of the enclosing frame
    Local(usize),
    /// Upvalue of the enclosing closure
    Upvalue(usize),
}

/// Statement with its line
#[derive(Debug)]
pub struct Stat {
    /// Statement kind
    pub kind: StatKind,
    /// Line of the first token
    pub line: u32,
}

/// Statement kinds
#[derive(Debug)]
pub enum StatKind {
    /// `local a, b = ...`
    Local { slots: Vec<usize>, values: Vec<Expr> },
    /// `local function f() end`
    LocalFunction { slot: usize, func: Rc<FunctionProto> },
    /// `a, t[k] = ...`
    Assign { targets: Vec<Expr>, values: Vec<Expr> },
    /// Function call used as a statement
    Call(Expr),
    /// `do ... end`
    Do(Block),
    /// `while cond do ... end`
    While { cond: Expr, body: Block },
    /// `repeat ... until cond`
    Repeat { body: Block, cond: Expr },
    /// `if ... elseif ... else ... end`
    If { branches: Vec<(Expr, Block)>, otherwise: Option<Block> },
    /// `for i = a, b, c do ... end`
    NumericFor {
        slot: usize,
        start: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Block,
    },
    /// `for k, v in explist do ... end`
    GenericFor { slots: Vec<usize>, exprs: Vec<Expr>, body: Block },
    /// `return ...`
    Return(Vec<Expr>),
    /// `break`
    Break,
}

/// Expression with its line
#[derive(Debug)]
pub struct Expr {
    /// Expression kind
    pub kind: ExprKind,
    /// Line of the first token
    pub line: u32,
}

/// Expression kinds
#[derive(Debug)]
pub enum ExprKind {
    Nil,
    True,
    False,
    Integer(i64),
    Number(f64),
    String(ScriptString),
    Vararg,
    Function(Rc<FunctionProto>),
    Local(usize),
    Upvalue(usize),
    Global(ScriptString),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Method(Box<Expr>, ScriptString, Vec<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Unary(UnOp, Box<Expr>),
    Table(Vec<TableItem>),
    Paren(Box<Expr>),
}

impl ExprKind {
    /// Whether the expression can produce more than one value
    pub fn is_multi(&self) -> bool {
        matches!(self, ExprKind::Call(..) | ExprKind::Method(..) | ExprKind::Vararg)
    }
}

/// Table constructor entries
#[derive(Debug)]
pub enum TableItem {
    /// Positional entry
    Positional(Expr),
    /// `name = value` or `[key] = value`
    Keyed(Expr, Expr),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    /// Metamethod event name for arithmetic and concatenation
    pub fn event(self) -> &'static str {
        match self {
            BinOp::Add => "__add",
            BinOp::Sub => "__sub",
            BinOp::Mul => "__mul",
            BinOp::Div => "__div",
            BinOp::IDiv => "__idiv",
            BinOp::Mod => "__mod",
            BinOp::Pow => "__pow",
            BinOp::Concat => "__concat",
            BinOp::Eq | BinOp::NotEq => "__eq",
            BinOp::Lt | BinOp::Gt => "__lt",
            BinOp::Le | BinOp::Ge => "__le",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    Len,
}
