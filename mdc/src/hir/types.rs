//! The lexical type environment used by HIR's top-down type-attachment
//! pass (§4.1).

use std::collections::HashMap;

use crate::ast::TypeAnn;

/// A stack of scopes mapping a name to its declared or inferred type.
/// Lookups walk outward; `Any` is the fallback when nothing is known,
/// matching the dynamically-checked VM underneath (§4.1).
#[derive(Debug, Default)]
pub struct TypeEnv {
    scopes: Vec<HashMap<String, TypeAnn>>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn declare(&mut self, name: impl Into<String>, ty: TypeAnn) {
        self.scopes
            .last_mut()
            .expect("at least one scope")
            .insert(name.into(), ty);
    }

    pub fn lookup(&self, name: &str) -> Option<TypeAnn> {
        self.scopes.iter().rev().find_map(|s| s.get(name).copied())
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.contains_key(name))
    }
}
