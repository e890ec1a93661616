//! Environment for named-variable bindings (§3.3).
//!
//! Every *frame* (the top-level program, or one utility call) owns exactly
//! one `Environment`; `If`/`While`/`For Each` bodies run directly in their
//! enclosing frame's environment rather than opening a child scope of
//! their own, so a plain block never needs to walk past itself to update a
//! variable set earlier in the same frame. A *call*, by contrast, always
//! opens a fresh environment: `Set` inside a utility body writes into that
//! call's own environment and never back into the caller's, even when the
//! name is also bound there (§8 scenario 7, "utility scope isolation").
//! Reads still walk the parent chain, so a utility can still see other
//! utilities and constants bound at the scope it was defined in (§3.3
//! lexical capture) — only writes are call-local.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::Value;

/// Shared reference to an environment. Utility closures hold one of these
/// captured at their definition site so later calls resolve reads through
/// the definer's lexical scope rather than the caller's (§3.3).
pub type EnvRef = Rc<RefCell<Environment>>;

/// A mutable string -> value map with a parent pointer (§3.3).
#[derive(Debug)]
pub struct Environment {
    bindings: HashMap<String, Value>,
    parent: Option<EnvRef>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            bindings: HashMap::new(),
            parent: None,
        }
    }

    pub fn with_parent(parent: EnvRef) -> Self {
        Environment {
            bindings: HashMap::new(),
            parent: Some(parent),
        }
    }

    pub fn into_ref(self) -> EnvRef {
        Rc::new(RefCell::new(self))
    }

    /// `Define x as <Type>`: declares `x` in this frame.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// `Set x to v`: binds `x` in this frame, shadowing (but never
    /// mutating) any binding of the same name further up the chain.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.bindings.get(name) {
            Some(value.clone())
        } else if let Some(parent) = &self.parent {
            parent.borrow().get(name)
        } else {
            None
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.borrow().contains(name))
    }

    /// This frame's parent, if any — lets the VM walk the chain looking
    /// for a utility's global closure binding without re-exposing the
    /// bindings map itself.
    pub fn parent(&self) -> Option<EnvRef> {
        self.parent.as_ref().map(Rc::clone)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a child environment from a parent reference.
pub fn child_env(parent: &EnvRef) -> EnvRef {
    Environment::with_parent(Rc::clone(parent)).into_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_get() {
        let mut env = Environment::new();
        env.define("x", Value::Integer(42));
        assert!(matches!(env.get("x"), Some(Value::Integer(42))));
        assert!(env.get("y").is_none());
    }

    #[test]
    fn child_reads_through_to_parent() {
        let parent = Environment::new().into_ref();
        parent.borrow_mut().define("x", Value::Integer(1));
        let child = child_env(&parent);
        assert!(matches!(child.borrow().get("x"), Some(Value::Integer(1))));
    }

    #[test]
    fn utility_call_frame_never_writes_through_to_caller() {
        // §8 scenario 7: a utility that does `Set x to 42` and returns `x`
        // yields 42 from the call, but the caller's own `x` (bound in an
        // ancestor environment reachable only by read) is unaffected.
        let global = Environment::new().into_ref();
        global.borrow_mut().define("x", Value::Integer(100));

        let call_frame = child_env(&global);
        call_frame.borrow_mut().set("x", Value::Integer(42));

        assert!(matches!(
            call_frame.borrow().get("x"),
            Some(Value::Integer(42))
        ));
        assert!(matches!(global.borrow().get("x"), Some(Value::Integer(100))));
    }
}
