//! Runtime errors (§7).
//!
//! A `RuntimeError` is a first-class [`crate::value::Value`] (tag `Error`):
//! it propagates upward unchanged until it reaches the top-level frame,
//! where the VM returns it as the program's final value (§3.2 invariant d,
//! §7 Propagation). There is no user-facing try/catch in the core language.

use thiserror::Error;

/// The kind of runtime error, per the §7 table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeErrorKind {
    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),
    #[error("unknown utility `{0}`")]
    UnknownUtility(String),
    #[error("missing required parameter `{0}`")]
    MissingRequiredParameter(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("index {index} out of range (length {length})")]
    IndexOutOfRange { index: i64, length: usize },
    #[error("key `{0}` not found")]
    KeyNotFound(String),
    #[error("value not found")]
    NotFound,
    #[error("stack overflow: call depth exceeded {0}")]
    StackOverflow(usize),
    #[error("register overflow: more than {0} live values")]
    RegisterOverflow(usize),
    #[error("malformed bytecode: {0}")]
    MalformedBytecode(String),
}

/// A runtime error value. Cheap to clone (wraps an `Rc`-free, small enum)
/// since it is carried around as an ordinary [`crate::value::Value`]
/// payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind) -> Self {
        Self { kind }
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}
