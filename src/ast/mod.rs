//! The abstract syntax tree produced by the parser.
//!
//! The AST is a closed family of statement and expression nodes with owned
//! children. Scope maps are owned by the node that introduces the scope (the
//! function, each `if` arm, the `for` body, the `while` body), so scopes live
//! exactly as long as their nodes.

use std::collections::HashMap;
use std::fmt::{self, Display};

use indexmap::IndexMap;

mod display;

/// The semantic types of the language.
///
/// Integers are 32-bit signed two's-complement; floats are IEEE-754 binary32.
/// Arrays have a fixed length determined at declaration.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum Ty {
    Void,
    Int,
    Float,
    IntArray,
    FloatArray,
}

impl Ty {
    /// The type arrays load and store per element; scalars are their own
    /// element type.
    pub fn element(self) -> Ty {
        match self {
            Ty::IntArray => Ty::Int,
            Ty::FloatArray => Ty::Float,
            t => t,
        }
    }

    /// The array type with this scalar as element, if one exists.
    pub fn array_of(self) -> Option<Ty> {
        match self {
            Ty::Int => Some(Ty::IntArray),
            Ty::Float => Some(Ty::FloatArray),
            _ => None,
        }
    }

    pub fn is_array(self) -> bool {
        matches!(self, Ty::IntArray | Ty::FloatArray)
    }
}

impl Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Ty::Void => "void",
            Ty::Int => "int",
            Ty::Float => "float",
            Ty::IntArray => "int[]",
            Ty::FloatArray => "float[]",
        })
    }
}

/// A scope's mapping from variable name to semantic type.
pub type ScopeMap = HashMap<String, Ty>;

/// Signature of a defined function.
#[derive(PartialEq, Debug, Clone)]
pub struct FuncSig {
    pub ret: Ty,
    pub params: Vec<Ty>,
    /// Built-ins get an external declaration in the IR but no body.
    pub builtin: bool,
}

/// The process-wide function definition table, in definition order.
pub type FuncTable = IndexMap<String, FuncSig>;

#[derive(Debug, PartialEq)]
pub struct Program {
    pub funcs: Vec<FuncDecl>,
}

/// A function definition with its body and its own local-variable scope.
#[derive(Debug, PartialEq)]
pub struct FuncDecl {
    pub ret: Ty,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub locals: ScopeMap,
}

#[derive(Debug, PartialEq)]
pub struct Param {
    pub ty: Ty,
    pub name: String,
}

#[derive(Debug, PartialEq)]
pub enum Stmt {
    Assign(AssignStmt),
    Return(RetStmt),
    Call(CallStmt),
    If(IfStmt),
    For(ForStmt),
    While(WhileStmt),
}

/// A declaration or reassignment; the target is an identifier or an indexed
/// element.
#[derive(Debug, PartialEq)]
pub struct AssignStmt {
    pub target: Expr,
    pub value: Expr,
}

/// `return;` or `return expr;`
#[derive(Debug, PartialEq)]
pub struct RetStmt {
    pub value: Option<Expr>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CallKind {
    Builtin,
    User,
}

/// A call in statement position.
#[derive(Debug, PartialEq)]
pub struct CallStmt {
    pub kind: CallKind,
    pub call: CallExpr,
}

/// `if (cond) { … }` with an optional `else { … }`; each arm owns its scope.
#[derive(Debug, PartialEq)]
pub struct IfStmt {
    pub cond: Condition,
    pub taken: Vec<Stmt>,
    pub taken_scope: ScopeMap,
    pub not_taken: Vec<Stmt>,
    pub not_taken_scope: ScopeMap,
}

/// `for (init; cond; step) { … }`; the induction variable lives in the
/// statement's own scope.
#[derive(Debug, PartialEq)]
pub struct ForStmt {
    pub init: Box<AssignStmt>,
    pub cond: Condition,
    pub step: Box<AssignStmt>,
    pub body: Vec<Stmt>,
    pub scope: ScopeMap,
}

#[derive(Debug, PartialEq)]
pub struct WhileStmt {
    pub cond: Condition,
    pub body: Vec<Stmt>,
    pub scope: ScopeMap,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CmpOp {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
            CmpOp::Le => "<=",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        })
    }
}

/// A comparison between two expressions of one operand type.
#[derive(Debug, PartialEq)]
pub struct Condition {
    pub op: CmpOp,
    /// The type both operands evaluate at.
    pub ty: Ty,
    pub left: Expr,
    pub right: Expr,
}

#[derive(Debug, PartialEq)]
pub enum Expr {
    /// Variable access.
    Ident(String),

    /// An int or float literal.
    Literal(Literal),

    /// A binary arithmetic operation. Unary `+`/`-` is desugared by the
    /// parser into `0 ± operand`.
    Arith(ArithExpr),

    /// An array element access (e.g. `x[i]`).
    Index(IndexExpr),

    /// A function call.
    Call(CallExpr),

    /// An array literal; only appears as the value of an array declaration.
    Array(ArrayExpr),
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Literal {
    Int(i32),
    Float(f32),
}

impl Literal {
    /// Parse a numeric lexeme, trying the integer shape first.
    pub fn from_numeric(s: &str) -> Option<Self> {
        s.parse::<i32>()
            .map(Literal::Int)
            .ok()
            .or_else(|| s.parse::<f32>().map(Literal::Float).ok())
    }

    /// The zero value of a scalar type, used for bare declarations and the
    /// unary desugar.
    pub fn zero(ty: Ty) -> Self {
        match ty {
            Ty::Float => Literal::Float(0.0),
            _ => Literal::Int(0),
        }
    }

    pub fn ty(self) -> Ty {
        match self {
            Literal::Int(_) => Ty::Int,
            Literal::Float(_) => Ty::Float,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        })
    }
}

#[derive(Debug, PartialEq)]
pub struct ArithExpr {
    pub op: ArithOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Debug, PartialEq)]
pub struct IndexExpr {
    pub name: String,
    pub index: Box<Expr>,
}

#[derive(Debug, PartialEq)]
pub struct CallExpr {
    pub name: String,
    pub args: Vec<Expr>,
}

/// `[N] = { e₀, … }`; the element list is either empty (pre-allocation form)
/// or exactly `len` long, as enforced by the parser.
#[derive(Debug, PartialEq)]
pub struct ArrayExpr {
    pub len: u32,
    pub elems: Vec<Expr>,
}
