//! Arithmetic, comparison, and coercion semantics (§4.5, §4.6).

use std::cmp::Ordering;

use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::value::Value;

fn type_mismatch(op: &str, lhs: &Value, rhs: &Value) -> RuntimeError {
    RuntimeError::new(RuntimeErrorKind::TypeMismatch(format!(
        "`{op}` does not accept {} and {}",
        lhs.type_name(),
        rhs.type_name()
    )))
}

fn overflow(op: &str) -> RuntimeError {
    RuntimeError::new(RuntimeErrorKind::TypeMismatch(format!(
        "integer overflow in `{op}`"
    )))
}

/// Integer/Float arithmetic promotion (§4.6): Integer+Integer stays
/// Integer, any Float operand promotes the whole operation to Float.
pub(super) fn add(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    use Value::*;
    match (lhs, rhs) {
        (Integer(a), Integer(b)) => a.checked_add(*b).map(Integer).ok_or_else(|| overflow("+")),
        (Float(a), Float(b)) => Ok(Float(a + b)),
        (Integer(a), Float(b)) | (Float(b), Integer(a)) => Ok(Float(*a as f64 + b)),
        _ => Err(type_mismatch("+", lhs, rhs)),
    }
}

pub(super) fn sub(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    use Value::*;
    match (lhs, rhs) {
        (Integer(a), Integer(b)) => a.checked_sub(*b).map(Integer).ok_or_else(|| overflow("-")),
        (Float(a), Float(b)) => Ok(Float(a - b)),
        (Integer(a), Float(b)) => Ok(Float(*a as f64 - b)),
        (Float(a), Integer(b)) => Ok(Float(a - *b as f64)),
        _ => Err(type_mismatch("-", lhs, rhs)),
    }
}

pub(super) fn mul(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    use Value::*;
    match (lhs, rhs) {
        (Integer(a), Integer(b)) => a.checked_mul(*b).map(Integer).ok_or_else(|| overflow("*")),
        (Float(a), Float(b)) => Ok(Float(a * b)),
        (Integer(a), Float(b)) | (Float(b), Integer(a)) => Ok(Float(*a as f64 * b)),
        _ => Err(type_mismatch("*", lhs, rhs)),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Integer(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

/// `/` always yields Float (§4.2, §4.5), even for two Integer operands.
pub(super) fn div(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    let (a, b) = match (as_f64(lhs), as_f64(rhs)) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(type_mismatch("/", lhs, rhs)),
    };
    if b == 0.0 {
        return Err(RuntimeError::new(RuntimeErrorKind::DivisionByZero));
    }
    Ok(Value::Float(a / b))
}

pub(super) fn neg(v: &Value) -> Result<Value, RuntimeError> {
    match v {
        Value::Integer(n) => n.checked_neg().map(Value::Integer).ok_or_else(|| overflow("-")),
        Value::Float(x) => Ok(Value::Float(-x)),
        _ => Err(RuntimeError::new(RuntimeErrorKind::TypeMismatch(format!(
            "unary `-` does not accept {}",
            v.type_name()
        )))),
    }
}

pub(super) fn not(v: &Value) -> Result<Value, RuntimeError> {
    match v {
        Value::Boolean(b) => Ok(Value::Boolean(!b)),
        _ => Err(RuntimeError::new(RuntimeErrorKind::TypeMismatch(format!(
            "`not` does not accept {}",
            v.type_name()
        )))),
    }
}

/// Ordering for `</<=/>/>=` (§4.5): numeric coercion to Float when tags
/// differ but both are numeric; codepoint order for Text/URL; any other
/// pairing is a cross-type mismatch (OQ3).
fn compare(lhs: &Value, rhs: &Value) -> Result<Ordering, RuntimeError> {
    use Value::*;
    match (lhs, rhs) {
        (Integer(a), Integer(b)) => Ok(a.cmp(b)),
        (String(a), String(b)) | (Url(a), Url(b)) | (String(a), Url(b)) | (Url(a), String(b)) => {
            Ok(a.as_ref().cmp(b.as_ref()))
        }
        _ => match (as_f64(lhs), as_f64(rhs)) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or_else(|| RuntimeError::new(RuntimeErrorKind::TypeMismatch("comparison against NaN".into()))),
            _ => Err(type_mismatch("comparison", lhs, rhs)),
        },
    }
}

pub(super) fn lt(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    Ok(Value::Boolean(compare(lhs, rhs)? == Ordering::Less))
}

pub(super) fn le(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    Ok(Value::Boolean(compare(lhs, rhs)? != Ordering::Greater))
}

pub(super) fn gt(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    Ok(Value::Boolean(compare(lhs, rhs)? == Ordering::Greater))
}

pub(super) fn ge(lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    Ok(Value::Boolean(compare(lhs, rhs)? != Ordering::Less))
}

/// A 1-based list index (§4.5 "Collections") converted to a 0-based
/// offset, or `IndexOutOfRange` if it falls outside `[1, len]`.
pub(super) fn list_index(index: &Value, len: usize) -> Result<usize, RuntimeError> {
    let idx = match index {
        Value::Integer(n) => *n,
        _ => {
            return Err(RuntimeError::new(RuntimeErrorKind::TypeMismatch(format!(
                "list index must be a Whole Number, found {}",
                index.type_name()
            ))))
        }
    };
    if idx < 1 || idx as usize > len {
        return Err(RuntimeError::new(RuntimeErrorKind::IndexOutOfRange { index: idx, length: len }));
    }
    Ok((idx - 1) as usize)
}

/// A 1-based insertion position (§4.5: "Insert x at position n in L shifts
/// right"), which additionally permits `len + 1` to append at the end.
pub(super) fn insert_position(index: &Value, len: usize) -> Result<usize, RuntimeError> {
    let idx = match index {
        Value::Integer(n) => *n,
        _ => {
            return Err(RuntimeError::new(RuntimeErrorKind::TypeMismatch(format!(
                "list index must be a Whole Number, found {}",
                index.type_name()
            ))))
        }
    };
    if idx < 1 || idx as usize > len + 1 {
        return Err(RuntimeError::new(RuntimeErrorKind::IndexOutOfRange { index: idx, length: len }));
    }
    Ok((idx - 1) as usize)
}

/// A dictionary key (§4.5: "Dictionaries support key lookup"; §3.2
/// invariant a: "Dictionary keys are strings").
pub(super) fn dict_key(key: &Value) -> Result<String, RuntimeError> {
    match key {
        Value::String(s) | Value::Url(s) => Ok(s.to_string()),
        _ => Err(RuntimeError::new(RuntimeErrorKind::TypeMismatch(format!(
            "dictionary key must be Text, found {}",
            key.type_name()
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_always_produces_float() {
        let v = div(&Value::Integer(15), &Value::Integer(3)).unwrap();
        assert!(matches!(v, Value::Float(x) if x == 5.0));
    }

    #[test]
    fn division_by_zero_errors() {
        let err = div(&Value::Integer(1), &Value::Integer(0)).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::DivisionByZero);
    }

    #[test]
    fn mixed_integer_float_addition_promotes_to_float() {
        let v = add(&Value::Integer(2), &Value::Float(0.5)).unwrap();
        assert!(matches!(v, Value::Float(x) if x == 2.5));
    }

    #[test]
    fn cross_type_ordering_is_a_type_mismatch() {
        let err = lt(&Value::Integer(1), &Value::string("a")).unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::TypeMismatch(_)));
    }

    #[test]
    fn string_ordering_is_codepoint_order() {
        let v = lt(&Value::string("apple"), &Value::string("banana")).unwrap();
        assert!(matches!(v, Value::Boolean(true)));
    }

    #[test]
    fn list_index_rejects_out_of_range() {
        let err = list_index(&Value::Integer(0), 3).unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::IndexOutOfRange { .. }));
        assert!(list_index(&Value::Integer(3), 3).is_ok());
        assert!(list_index(&Value::Integer(4), 3).is_err());
    }

    #[test]
    fn insert_position_allows_one_past_the_end() {
        assert!(insert_position(&Value::Integer(4), 3).is_ok());
        assert!(insert_position(&Value::Integer(5), 3).is_err());
    }
}
