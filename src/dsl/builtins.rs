//! PII detection, sensitive-path checks, and the whitelisted builtin
//! functions / methods available inside a compiled condition.

use once_cell::sync::Lazy;
use regex::Regex;

use super::value::Value;

static PII_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap(), // SSN
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap(), // email
        Regex::new(r"\b\d{16}\b").unwrap(),            // credit card
        Regex::new(r"\b\d{3}[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap(), // phone
    ]
});

const SENSITIVE_PATHS: &[&str] = &[
    "/etc",
    "/sys",
    "/proc",
    "/boot",
    "/root",
    "/var/log",
    "/usr/sbin",
    "C:\\Windows\\System32",
];

const MAX_SCAN_DEPTH: usize = 5;

/// Recursively scan a value's strings (and dict keys) for PII patterns,
/// capped at [`MAX_SCAN_DEPTH`] to bound recursion on attacker-controlled
/// nested parameters.
pub fn contains_pii(value: &Value) -> bool {
    fn scan(value: &Value, depth: usize) -> bool {
        if depth > MAX_SCAN_DEPTH {
            return false;
        }
        match value {
            Value::Str(s) => PII_PATTERNS.iter().any(|p| p.is_match(s)),
            Value::Dict(map) => map
                .iter()
                .any(|(k, v)| PII_PATTERNS.iter().any(|p| p.is_match(k)) || scan(v, depth + 1)),
            Value::List(items) => items.iter().any(|v| scan(v, depth + 1)),
            _ => false,
        }
    }
    scan(value, 0)
}

/// Check whether a path falls under a known sensitive system directory.
pub fn is_sensitive_path(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    SENSITIVE_PATHS
        .iter()
        .map(|p| p.replace('\\', "/"))
        .any(|prefix| normalized.starts_with(&prefix))
}

/// Dispatch a whitelisted bare-name function call (`contains_pii(...)`,
/// `len(...)`, etc). Returns `None` for unknown names so the caller can
/// surface a `ConditionError`.
pub fn call_function(name: &str, args: &[Value]) -> Option<Value> {
    match name {
        "contains_pii" => {
            let target = args.first().cloned().unwrap_or(Value::Dict(Default::default()));
            Some(Value::Bool(contains_pii(&target)))
        }
        "is_sensitive_path" => {
            let path = args.first().map(|v| v.as_str_lossy()).unwrap_or_default();
            Some(Value::Bool(is_sensitive_path(&path)))
        }
        "len" => Some(Value::Num(match args.first() {
            Some(Value::Str(s)) => s.chars().count() as f64,
            Some(Value::List(items)) => items.len() as f64,
            Some(Value::Dict(map)) => map.len() as f64,
            _ => 0.0,
        })),
        "str" => Some(Value::Str(
            args.first().map(|v| v.as_str_lossy()).unwrap_or_default(),
        )),
        "int" => Some(Value::Num(
            args.first().and_then(|v| v.as_f64()).unwrap_or(0.0).trunc(),
        )),
        "bool" => Some(Value::Bool(args.first().map(|v| v.truthy()).unwrap_or(false))),
        "isinstance" => {
            let value = args.first();
            let type_name = args.get(1).map(|v| v.as_str_lossy()).unwrap_or_default();
            let matches = match (value, type_name.as_str()) {
                (Some(Value::Str(_)), "str") => true,
                (Some(Value::Num(_)), "int" | "float") => true,
                (Some(Value::Dict(_)), "dict") => true,
                (Some(Value::List(_)), "list") => true,
                _ => false,
            };
            Some(Value::Bool(matches))
        }
        _ => None,
    }
}

/// Dispatch a whitelisted method call on a value (`path.startswith(...)`,
/// `params.get(...)`, etc).
pub fn call_method(receiver: &Value, method: &str, args: &[Value]) -> Option<Value> {
    match (receiver, method) {
        (Value::None, "startswith" | "endswith" | "contains") => Some(Value::Bool(false)),
        (Value::Str(s), "startswith") => Some(Value::Bool(
            s.starts_with(&args.first().map(|v| v.as_str_lossy()).unwrap_or_default()),
        )),
        (Value::Str(s), "endswith") => Some(Value::Bool(
            s.ends_with(&args.first().map(|v| v.as_str_lossy()).unwrap_or_default()),
        )),
        (Value::Str(s), "contains") => Some(Value::Bool(
            s.contains(&args.first().map(|v| v.as_str_lossy()).unwrap_or_default()),
        )),
        (Value::Str(s), "lower") => Some(Value::Str(s.to_lowercase())),
        (Value::Str(s), "upper") => Some(Value::Str(s.to_uppercase())),
        (Value::Dict(map), "get") => {
            let key = args.first().map(|v| v.as_str_lossy()).unwrap_or_default();
            let default = args.get(1).cloned().unwrap_or(Value::Str(String::new()));
            Some(map.get(&key).cloned().unwrap_or(default))
        }
        (Value::Dict(map), "keys") => {
            Some(Value::List(map.keys().map(|k| Value::Str(k.clone())).collect()))
        }
        (Value::Dict(map), "values") => Some(Value::List(map.values().cloned().collect())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn detects_ssn_and_email() {
        assert!(contains_pii(&Value::Str("123-45-6789".into())));
        assert!(contains_pii(&Value::Str("a@b.com".into())));
        assert!(!contains_pii(&Value::Str("hello world".into())));
    }

    #[test]
    fn recurses_into_nested_dicts_and_lists() {
        let mut inner = HashMap::new();
        inner.insert("note".to_string(), Value::Str("ssn is 123-45-6789".into()));
        let value = Value::List(vec![Value::Dict(inner)]);
        assert!(contains_pii(&value));
    }

    #[test]
    fn depth_cap_stops_runaway_recursion() {
        let mut value = Value::Str("123-45-6789".into());
        for _ in 0..10 {
            value = Value::List(vec![value]);
        }
        assert!(!contains_pii(&value));
    }

    #[test]
    fn sensitive_path_prefix_matching() {
        assert!(is_sensitive_path("/etc/passwd"));
        assert!(is_sensitive_path("C:\\Windows\\System32\\drivers"));
        assert!(!is_sensitive_path("/home/user/file.txt"));
    }
}
