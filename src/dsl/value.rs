//! Runtime value type the condition evaluator operates on. Distinct from
//! [`serde_json::Value`] so that attribute/subscript access on a missing
//! key can fall back to an empty string instead of erroring, matching the
//! permissive semantics conditions are specified to have.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Value>),
    Dict(HashMap<String, Value>),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Dict(map) => !map.is_empty(),
        }
    }

    pub fn as_str_lossy(&self) -> String {
        match self {
            Value::None => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Value::Str(s) => s.clone(),
            Value::List(_) | Value::Dict(_) => String::new(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Best-effort equality across differing representations, mirroring
    /// the permissive comparisons the original condition grammar allows.
    pub fn loose_eq(&self, other: &Value) -> bool {
        if self == other {
            return true;
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self.as_str_lossy() == other.as_str_lossy(),
        }
    }

    /// Ordering used for `<`, `<=`, `>`, `>=`. Returns `None` when the two
    /// values cannot be meaningfully compared, which the evaluator treats
    /// as the comparison being false rather than an error.
    pub fn partial_cmp_loose(&self, other: &Value) -> Option<std::cmp::Ordering> {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => match (self, other) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => None,
            },
        }
    }

    pub fn contains(&self, needle: &Value) -> bool {
        match self {
            Value::Str(haystack) => haystack.contains(&needle.as_str_lossy()),
            Value::List(items) => items.iter().any(|v| v.loose_eq(needle)),
            Value::Dict(map) => map.contains_key(&needle.as_str_lossy()),
            _ => false,
        }
    }
}

impl From<&JsonValue> for Value {
    fn from(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::None,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => Value::Num(n.as_f64().unwrap_or(0.0)),
            JsonValue::String(s) => Value::Str(s.clone()),
            JsonValue::Array(items) => Value::List(items.iter().map(Value::from).collect()),
            JsonValue::Object(map) => {
                Value::Dict(map.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect())
            }
        }
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Value::from(&json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loose_eq_compares_across_number_and_string() {
        assert!(Value::Num(3.0).loose_eq(&Value::Str("3".into())));
        assert!(!Value::Num(3.0).loose_eq(&Value::Str("3.5".into())));
    }

    #[test]
    fn contains_checks_substrings_and_lists() {
        assert!(Value::Str("file.delete".into()).contains(&Value::Str("delete".into())));
        assert!(Value::List(vec![Value::Num(1.0), Value::Num(2.0)]).contains(&Value::Num(2.0)));
    }

    #[test]
    fn incomparable_values_have_no_ordering() {
        assert!(Value::Dict(HashMap::new())
            .partial_cmp_loose(&Value::Str("x".into()))
            .is_none());
    }
}
