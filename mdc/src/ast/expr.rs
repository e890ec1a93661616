//! Expression AST nodes (§3.1)

use super::{Span, Spanned};
use serde::{Deserialize, Serialize};

/// Expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    IntegerLit(i64),
    FloatLit(f64),
    StringLit(String),
    /// A URL literal. Distinct from `StringLit` so the tag survives into the
    /// value model without re-inspecting the text (§4.6).
    UrlLit(String),
    BooleanLit(bool),
    EmptyLit,

    /// Reference to a bound identifier. Identifiers are case-sensitive and
    /// may contain spaces or arbitrary Unicode (§3.1).
    Identifier(String),

    Prefix {
        op: PrefixOp,
        expr: Box<Spanned<Expr>>,
    },

    Infix {
        left: Box<Spanned<Expr>>,
        op: InfixOp,
        right: Box<Spanned<Expr>>,
    },

    /// `A if C else B`.
    Conditional {
        cond: Box<Spanned<Expr>>,
        then_expr: Box<Spanned<Expr>>,
        else_expr: Box<Spanned<Expr>>,
    },

    Call(CallExpr),

    ListLit(Vec<Spanned<Expr>>),

    /// Dictionary keys are always strings (§3.2 invariant a).
    DictLit(Vec<(Spanned<String>, Spanned<Expr>)>),
}

/// Prefix (unary) operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrefixOp {
    /// Arithmetic negation.
    Neg,
    /// Logical `not`.
    Not,
}

/// Infix (binary) operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InfixOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    /// Value equality (`equals`): numeric coercion across Integer/Float.
    Eq,
    /// Strict equality (`is strictly equal to`): tag and value identity.
    StrictEq,
    /// Strict inequality.
    StrictNe,
    And,
    Or,
}

impl std::fmt::Display for InfixOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InfixOp::Add => "+",
            InfixOp::Sub => "-",
            InfixOp::Mul => "*",
            InfixOp::Div => "/",
            InfixOp::Lt => "<",
            InfixOp::Le => "<=",
            InfixOp::Gt => ">",
            InfixOp::Ge => ">=",
            InfixOp::Eq => "equals",
            InfixOp::StrictEq => "is strictly equal to",
            InfixOp::StrictNe => "is strictly unequal to",
            InfixOp::And => "and",
            InfixOp::Or => "or",
        };
        write!(f, "{s}")
    }
}

/// A single call argument, positional or named (§4.5 call protocol).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Arg {
    Positional(Spanned<Expr>),
    Named(Spanned<String>, Spanned<Expr>),
}

impl Arg {
    pub fn span(&self) -> Span {
        match self {
            Arg::Positional(e) => e.span,
            Arg::Named(name, value) => name.span.merge(value.span),
        }
    }
}

/// A call/use expression: `callee(args...)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallExpr {
    pub callee: Spanned<String>,
    pub args: Vec<Arg>,
}
