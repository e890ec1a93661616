//! Marshalling the VM's final [`Value`] to a host-native representation
//! (§6 "Value return to host").

use crate::value::Value;

/// A host-native value: what an embedder receives back from
/// [`super::Vm::execute`] once runtime tags are stripped away.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<HostValue>),
    Map(Vec<(String, HostValue)>),
    /// A runtime error that escaped all the way to the top level,
    /// carrying its `§7` kind's display message.
    Error(String),
}

impl From<&Value> for HostValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Empty => HostValue::Null,
            Value::Boolean(b) => HostValue::Boolean(*b),
            Value::Integer(n) => HostValue::Integer(*n),
            Value::Float(x) => HostValue::Float(*x),
            Value::String(s) | Value::Url(s) => HostValue::String(s.to_string()),
            Value::List(l) => HostValue::List(l.borrow().items.iter().map(HostValue::from).collect()),
            Value::Dict(d) => HostValue::Map(
                d.borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), HostValue::from(v)))
                    .collect(),
            ),
            Value::Function(c) => HostValue::String(format!("<utility {}>", c.name)),
            Value::Return(inner) => HostValue::from(inner.as_ref()),
            Value::Error(e) => HostValue::Error(e.to_string()),
        }
    }
}

impl From<Value> for HostValue {
    fn from(value: Value) -> Self {
        HostValue::from(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans_and_empty_marshal_to_host_primitives() {
        assert_eq!(HostValue::from(Value::Boolean(true)), HostValue::Boolean(true));
        assert_eq!(HostValue::from(Value::Empty), HostValue::Null);
    }

    #[test]
    fn list_marshals_element_wise() {
        let list = Value::list(None);
        if let Value::List(l) = &list {
            l.borrow_mut().items.push(Value::Integer(1));
            l.borrow_mut().items.push(Value::Integer(2));
        }
        assert_eq!(
            HostValue::from(&list),
            HostValue::List(vec![HostValue::Integer(1), HostValue::Integer(2)])
        );
    }
}
