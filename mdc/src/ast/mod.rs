//! The AST contract (§3.1).
//!
//! The Markdown surface parser and CFG grammar validator are an external
//! collaborator (§1 Scope): this module only defines the typed tree that
//! collaborator is expected to hand to [`crate::hir::lower_program`]. Every
//! node derives `Serialize`/`Deserialize` so the tree can also be read from
//! or written to JSON at the `mdc compile` boundary (§6, OQ4 in
//! `SPEC_FULL.md`) when no in-process parser is available.

mod expr;
mod span;
mod types;

pub use expr::*;
pub use span::*;
pub use types::*;

use serde::{Deserialize, Serialize};

/// A program: an ordered sequence of top-level statements (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Spanned<Statement>>,
}

/// A statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
    /// `Set x to v`.
    Set {
        target: Spanned<String>,
        value: Spanned<Expr>,
    },
    /// `Set r using callee(...)`: assignment whose right-hand side is a
    /// utility invocation (the "Set using" glossary entry).
    SetUsing {
        target: Spanned<String>,
        call: CallExpr,
    },
    /// `Define x as <Type>`.
    Define {
        name: Spanned<String>,
        ty: Spanned<TypeAnn>,
    },
    /// `Give back <expr>` (return). `value` is `None` for a bare return.
    GiveBack { value: Option<Spanned<Expr>> },
    /// `Say <expr>`.
    Say { value: Spanned<Expr> },
    /// `Tell <expr>` — surface synonym for `Say`, collapsed at HIR lowering.
    Tell { value: Spanned<Expr> },
    /// `If <cond> then: ... [Else: ...]`.
    If {
        cond: Spanned<Expr>,
        then_branch: Vec<Spanned<Statement>>,
        else_branch: Option<Vec<Spanned<Statement>>>,
    },
    /// `When <cond> then: ... [Otherwise: ...]` — surface synonym for `If`.
    When {
        cond: Spanned<Expr>,
        then_branch: Vec<Spanned<Statement>>,
        otherwise_branch: Option<Vec<Spanned<Statement>>>,
    },
    /// `While <cond>: ...`.
    While {
        cond: Spanned<Expr>,
        body: Vec<Spanned<Statement>>,
    },
    /// `For each <var> in <collection>: ...`.
    ForEach {
        var: Spanned<String>,
        collection: Spanned<Expr>,
        body: Vec<Spanned<Statement>>,
    },
    /// A named-callable definition (heading syntax).
    UtilityDef(UtilityDef),
    /// Surface synonym for `UtilityDef` — no semantic difference (glossary:
    /// Interaction).
    InteractionDef(UtilityDef),
    /// `Call callee(...)` used in statement position; the result is
    /// discarded.
    Call(CallExpr),
    /// Surface synonym for `Call` — glossary: "Use".
    Use(CallExpr),
    /// A bare expression evaluated for effect (e.g. a call used as a
    /// statement without the `Call`/`Use` keyword).
    Expr(Spanned<Expr>),
}

/// A utility (function) parameter. Required iff `default` is `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: Spanned<String>,
    pub ty: Option<Spanned<TypeAnn>>,
    pub default: Option<Spanned<Expr>>,
}

impl Param {
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// A utility (function) definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtilityDef {
    pub name: Spanned<String>,
    pub params: Vec<Param>,
    pub output_ty: Option<Spanned<TypeAnn>>,
    pub body: Vec<Spanned<Statement>>,
    pub span: Span,
}
