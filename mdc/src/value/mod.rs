//! The runtime value model and environment (§3.2, §3.3).

mod env;
mod value;

pub use env::{child_env, Environment, EnvRef};
pub use value::{Closure, DictRef, ListRef, ListValue, Value};
