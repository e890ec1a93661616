//! Compile-time diagnostics (§7).
//!
//! Diagnostics are collected, never thrown: [`crate::compile`] always
//! returns either a module or a non-empty [`Diagnostics`] list (invariant
//! I1). This module only models the *data*; `ariadne`-backed pretty
//! printing and the machine-readable JSON sibling mirror the pattern the
//! teacher crate used for its own warnings and errors.

mod runtime;
pub use runtime::{RuntimeError, RuntimeErrorKind};

use crate::ast::Span;
use serde::Serialize;
use thiserror::Error;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error,
    Warning,
    /// `UnreachableCode` is informational, not an error (§7).
    Info,
}

/// The kind of compile-time diagnostic (§7).
#[derive(Debug, Clone, Error, Serialize)]
pub enum DiagnosticKind {
    #[error("syntax error: {0}")]
    SyntaxError(String),
    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("arity mismatch calling `{callee}`: expected {expected} argument(s), found {found}")]
    ArityMismatch {
        callee: String,
        expected: usize,
        found: usize,
    },
    #[error("duplicate parameter `{0}`")]
    DuplicateParameter(String),
    #[error("unreachable code")]
    UnreachableCode,
    #[error("function `{function}` needs more than 255 live registers at once")]
    RegisterOverflow { function: String },
}

impl DiagnosticKind {
    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticKind::UnreachableCode => Severity::Info,
            _ => Severity::Error,
        }
    }
}

/// A single compile-time diagnostic: a kind, a location, and a severity.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub span: Span,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, span: Span) -> Self {
        let severity = kind.severity();
        Self {
            kind,
            span,
            severity,
        }
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

/// An accumulated list of diagnostics produced by one compilation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics(pub Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: DiagnosticKind, span: Span) {
        self.0.push(Diagnostic::new(kind, span));
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Print one diagnostic with `ariadne`, anchored at its span in `source`.
pub fn report_diagnostic(filename: &str, source: &str, diag: &Diagnostic) {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    let kind = match diag.severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
        Severity::Info => ReportKind::Advice,
    };
    let color = match diag.severity {
        Severity::Error => Color::Red,
        Severity::Warning => Color::Yellow,
        Severity::Info => Color::Blue,
    };

    Report::build(kind, (filename, diag.span.start..diag.span.end))
        .with_message(diag.message())
        .with_label(
            Label::new((filename, diag.span.start..diag.span.end))
                .with_message(diag.message())
                .with_color(color),
        )
        .finish()
        .print((filename, Source::from(source)))
        .ok();
}

/// Print every diagnostic in order.
pub fn report_diagnostics(filename: &str, source: &str, diags: &Diagnostics) {
    for diag in &diags.0 {
        report_diagnostic(filename, source, diag);
    }
}

/// Machine-readable (JSON-lines) diagnostic output, one object per line.
pub fn report_diagnostic_machine(filename: &str, diag: &Diagnostic) {
    #[derive(Serialize)]
    struct Wire<'a> {
        severity: Severity,
        file: &'a str,
        start: usize,
        end: usize,
        message: String,
    }
    let wire = Wire {
        severity: diag.severity,
        file: filename,
        start: diag.span.start,
        end: diag.span.end,
        message: diag.message(),
    };
    if let Ok(line) = serde_json::to_string(&wire) {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_errors_ignores_info() {
        let mut diags = Diagnostics::new();
        diags.push(DiagnosticKind::UnreachableCode, Span::synthetic());
        assert!(!diags.has_errors());
        diags.push(
            DiagnosticKind::UnknownIdentifier("x".into()),
            Span::synthetic(),
        );
        assert!(diags.has_errors());
    }
}
