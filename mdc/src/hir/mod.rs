//! High-level IR: a desugared, typed tree (§4.1).
//!
//! HIR collapses every surface synonym to one canonical form, rewrites
//! `For Each` to an explicit counted `While`, and turns literal
//! collections into an explicit build-then-populate sequence. What
//! survives is small enough that MIR construction is a direct,
//! structural walk with no separate control-flow-graph assembly step.

mod lower;
mod types;

pub use lower::lower_program;
pub use types::TypeEnv;

use crate::ast::{InfixOp, PrefixOp, Span, TypeAnn};

/// A lowered program: top-level statements plus every utility defined
/// anywhere in the source, flattened into one table (§3.5: "a module is a
/// list of functions plus a top-level function").
#[derive(Debug, Clone)]
pub struct HProgram {
    pub top_level: Vec<HStmt>,
    pub utilities: Vec<HUtility>,
}

/// A utility (function) parameter after lowering.
#[derive(Debug, Clone)]
pub struct HParam {
    pub name: String,
    pub ty: TypeAnn,
    pub required: bool,
    /// Present iff `!required`; evaluated in the utility's *definition*
    /// environment at call time when the caller omits the argument (§4.5).
    pub default: Option<HExpr>,
}

/// A utility definition. `Interaction` collapses into this form (§4.1).
#[derive(Debug, Clone)]
pub struct HUtility {
    pub name: String,
    pub params: Vec<HParam>,
    pub output_ty: TypeAnn,
    pub body: Vec<HStmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum HStmt {
    /// `Set x to v`, and the lowered form of `Set-Using` (§4.1: "Set-Using
    /// lowers to a Call followed by a Set of the result register" — here
    /// the call lives directly in `value`, which amounts to the same
    /// thing once MIR splits evaluation from the store).
    Set { name: String, value: HExpr },
    Define { name: String, ty: TypeAnn },
    GiveBack(Option<HExpr>),
    /// `Tell` collapses into `Say` (§4.1).
    Say(HExpr),
    If {
        cond: HExpr,
        then_branch: Vec<HStmt>,
        else_branch: Vec<HStmt>,
    },
    While {
        cond: HExpr,
        body: Vec<HStmt>,
    },
    /// `Use` collapses into `Call` (§4.1). Result is discarded.
    Call(HCall),
    /// Append `value` to the list bound to `list`. Emitted only by literal
    /// list materialization (§4.1).
    ListAppend { list: String, value: HExpr },
    /// Set `dict[key]` to `value`. Emitted only by literal dict
    /// materialization (§4.1).
    DictSet {
        dict: String,
        key: String,
        value: HExpr,
    },
    Expr(HExpr),
}

#[derive(Debug, Clone)]
pub struct HExpr {
    pub kind: HExprKind,
    pub ty: TypeAnn,
    pub span: Span,
}

impl HExpr {
    pub fn new(kind: HExprKind, ty: TypeAnn, span: Span) -> Self {
        Self { kind, ty, span }
    }
}

#[derive(Debug, Clone)]
pub enum HExprKind {
    IntegerLit(i64),
    FloatLit(f64),
    StringLit(String),
    UrlLit(String),
    BooleanLit(bool),
    EmptyLit,
    Name(String),
    Prefix {
        op: PrefixOp,
        expr: Box<HExpr>,
    },
    Infix {
        left: Box<HExpr>,
        op: InfixOp,
        right: Box<HExpr>,
    },
    /// The lowered form of `A if C else B` (§4.1: "Conditional expressions
    /// ... become Select nodes").
    Select {
        cond: Box<HExpr>,
        then_expr: Box<HExpr>,
        else_expr: Box<HExpr>,
    },
    Call(HCall),
    /// An empty list with an optional declared element type, the first
    /// step of literal-collection materialization (§4.1).
    NewList(Option<TypeAnn>),
    NewDict,
    /// `list[index]`, introduced by `For Each` desugaring (§4.1).
    Index {
        collection: Box<HExpr>,
        index: Box<HExpr>,
    },
    Len(Box<HExpr>),
    /// Run `stmts` for effect, then yield `result`. Used to express literal
    /// list/dict materialization and counted-loop desugaring as ordinary
    /// expression-position values without inventing a second statement
    /// list inside an expression node.
    Block {
        stmts: Vec<HStmt>,
        result: Box<HExpr>,
    },
}

#[derive(Debug, Clone)]
pub enum HArg {
    Positional(HExpr),
    Named(String, HExpr),
}

#[derive(Debug, Clone)]
pub struct HCall {
    pub callee: String,
    pub args: Vec<HArg>,
}
