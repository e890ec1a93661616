//! Runtime values (§3.2).

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::TypeAnn;
use crate::error::{RuntimeError, RuntimeErrorKind};

use super::EnvRef;

/// A list value: an ordered sequence with an optional declared element type
/// that is checked on insertion/assignment (§3.2 invariant b).
#[derive(Debug, Clone)]
pub struct ListValue {
    pub elem_ty: Option<TypeAnn>,
    pub items: Vec<Value>,
}

impl ListValue {
    pub fn new(elem_ty: Option<TypeAnn>) -> Self {
        Self {
            elem_ty,
            items: Vec::new(),
        }
    }

    /// Check a value against the declared element type, if any.
    pub fn check_elem(&self, value: &Value) -> Result<(), RuntimeError> {
        if let Some(ty) = self.elem_ty {
            if !ty.compatible_with(value.runtime_type()) {
                return Err(RuntimeError::new(RuntimeErrorKind::TypeMismatch(format!(
                    "list accepts {ty} but got {}",
                    value.type_name()
                ))));
            }
        }
        Ok(())
    }
}

pub type ListRef = Rc<RefCell<ListValue>>;
pub type DictRef = Rc<RefCell<IndexMap<String, Value>>>;

/// A closure: a code pointer into the compiled module's function table plus
/// the environment captured at the utility's definition site (§3.2, §3.3).
#[derive(Debug)]
pub struct Closure {
    pub name: String,
    pub function_index: u32,
    pub env: EnvRef,
}

/// A tagged runtime value (§3.2).
///
/// `Empty` and each `Boolean` are specified as interned singletons so
/// identity checks are cheap and inspection output is canonical (§9). Since
/// both are represented here as plain `Copy` enum payloads rather than
/// heap-allocated objects, equality and identity already coincide for them
/// at zero cost — there is nothing further to intern.
#[derive(Debug, Clone)]
pub enum Value {
    Empty,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(Rc<str>),
    /// A `String` subtype distinguished only by tag for display purposes
    /// (§4.6): a URL keeps all of String's coercion and comparison
    /// behavior but is never silently re-tagged by `Copy`.
    Url(Rc<str>),
    List(ListRef),
    Dict(DictRef),
    Function(Rc<Closure>),
    /// The wrapper `Give Back` produces (§3.2 invariant c). The VM
    /// intercepts and unwraps this at the producing frame's exit; it is a
    /// decoding bug for one to reach arithmetic, comparison, or `Say`.
    Return(Box<Value>),
    /// A tagged runtime error (§7). Propagates upward unchanged (§3.2
    /// invariant d) until the VM returns it as the program's final value.
    Error(Rc<RuntimeError>),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn url(s: impl Into<Rc<str>>) -> Self {
        Value::Url(s.into())
    }

    pub fn list(elem_ty: Option<TypeAnn>) -> Self {
        Value::List(Rc::new(RefCell::new(ListValue::new(elem_ty))))
    }

    pub fn dict() -> Self {
        Value::Dict(Rc::new(RefCell::new(IndexMap::new())))
    }

    pub fn error(kind: RuntimeErrorKind) -> Self {
        Value::Error(Rc::new(RuntimeError::new(kind)))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// The value's runtime type, used for declared-element-type checks and
    /// diagnostics. `List`/`Dict` report their surface-neutral kind since
    /// "the adjective [Ordered/Unordered] is surface-only" (glossary).
    pub fn runtime_type(&self) -> TypeAnn {
        match self {
            Value::Empty => TypeAnn::Empty,
            Value::Boolean(_) => TypeAnn::YesNo,
            Value::Integer(_) => TypeAnn::WholeNumber,
            Value::Float(_) => TypeAnn::Float,
            Value::String(_) => TypeAnn::Text,
            Value::Url(_) => TypeAnn::Url,
            Value::List(_) => TypeAnn::OrderedList,
            Value::Dict(_) => TypeAnn::NamedList,
            Value::Function(_) => TypeAnn::Any,
            Value::Return(inner) => inner.runtime_type(),
            Value::Error(_) => TypeAnn::Any,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Empty => "Empty",
            Value::Boolean(_) => "Yes/No",
            Value::Integer(_) => "Whole Number",
            Value::Float(_) => "Float",
            Value::String(_) => "Text",
            Value::Url(_) => "URL",
            Value::List(_) => "List",
            Value::Dict(_) => "Named List",
            Value::Function(_) => "Function",
            Value::Return(_) => "Return",
            Value::Error(_) => "Error",
        }
    }

    /// The `Say` inspect rule (§4.5): Boolean -> Yes/No, Empty -> Empty,
    /// String/URL -> raw text, numerics -> decimal.
    pub fn inspect(&self) -> String {
        match self {
            Value::Empty => "Empty".to_string(),
            Value::Boolean(b) => {
                if *b {
                    "Yes".to_string()
                } else {
                    "No".to_string()
                }
            }
            Value::Integer(n) => n.to_string(),
            Value::Float(x) => x.to_string(),
            Value::String(s) | Value::Url(s) => s.to_string(),
            Value::List(l) => {
                let items = &l.borrow().items;
                let rendered: Vec<String> = items.iter().map(Value::inspect).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Dict(d) => {
                let rendered: Vec<String> = d
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", v.inspect()))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
            Value::Function(c) => format!("<utility {}>", c.name),
            Value::Return(inner) => inner.inspect(),
            Value::Error(e) => format!("Error: {e}"),
        }
    }

    /// Value equality (`equals`, §4.5): numeric coercion between Integer
    /// and Float, deep structural equality within a tag, `false` across
    /// any other pair of tags.
    pub fn value_eq(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Integer(a), Integer(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Integer(a), Float(b)) | (Float(b), Integer(a)) => (*a as f64) == *b,
            (Boolean(a), Boolean(b)) => a == b,
            (Empty, Empty) => true,
            (String(a), String(b)) => a == b,
            (Url(a), Url(b)) => a == b,
            (List(a), List(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.items.len() == b.items.len()
                    && a.items
                        .iter()
                        .zip(b.items.iter())
                        .all(|(x, y)| x.value_eq(y))
            }
            (Dict(a), Dict(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|bv| v.value_eq(bv)))
            }
            _ => false,
        }
    }

    /// Strict equality (`is strictly equal to`, §4.5): tag must match
    /// exactly as well as value (e.g. Integer 5 is not strictly equal to
    /// Float 5.0).
    pub fn strict_eq(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Integer(_), Float(_)) | (Float(_), Integer(_)) => false,
            _ => self.value_eq(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_and_float_equal_by_value_not_strict() {
        let i = Value::Integer(5);
        let f = Value::Float(5.0);
        assert!(i.value_eq(&f));
        assert!(!i.strict_eq(&f));
    }

    #[test]
    fn empty_and_booleans_are_canonical() {
        assert!(Value::Empty.value_eq(&Value::Empty));
        assert!(Value::Boolean(true).strict_eq(&Value::Boolean(true)));
        assert!(!Value::Boolean(true).value_eq(&Value::Boolean(false)));
    }

    #[test]
    fn inspect_matches_say_rule() {
        assert_eq!(Value::Boolean(true).inspect(), "Yes");
        assert_eq!(Value::Boolean(false).inspect(), "No");
        assert_eq!(Value::Empty.inspect(), "Empty");
        assert_eq!(Value::Integer(42).inspect(), "42");
    }

    #[test]
    fn list_declared_type_rejects_mismatch() {
        let list = ListValue::new(Some(TypeAnn::WholeNumber));
        assert!(list.check_elem(&Value::Integer(1)).is_ok());
        assert!(list.check_elem(&Value::string("nope")).is_err());
    }
}
