//! Tree-walking evaluator for a parsed condition, plus the compiled
//! wrapper that parses once (at policy load) and evaluates many times.

use std::collections::HashMap;

use thiserror::Error;

use super::ast::{BoolOp, CompareOp, Expr, Literal};
use super::builtins::{call_function, call_method};
use super::parser::parse;
use super::value::Value;

#[derive(Debug, Error, Clone)]
pub enum ConditionError {
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("unsupported call target")]
    UnsupportedCallTarget,
}

/// A context a compiled condition evaluates against. Mirrors the context
/// dict the policy engine builds for every evaluation.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub values: HashMap<String, Value>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    fn get(&self, name: &str) -> Value {
        self.values.get(name).cloned().unwrap_or(Value::Str(String::new()))
    }
}

/// A compiled condition. Parsing happens once in [`CompiledCondition::new`];
/// [`CompiledCondition::evaluate`] only walks the cached AST.
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    pub source: String,
    expr: Expr,
}

impl CompiledCondition {
    pub fn new(source: impl Into<String>) -> Result<Self, super::lexer::ParseError> {
        let source = source.into();
        let expr = parse(&source)?;
        Ok(Self { source, expr })
    }

    pub fn evaluate(&self, ctx: &EvalContext) -> Result<bool, ConditionError> {
        Ok(eval(&self.expr, ctx)?.truthy())
    }
}

fn eval(expr: &Expr, ctx: &EvalContext) -> Result<Value, ConditionError> {
    match expr {
        Expr::Literal(Literal::Num(n)) => Ok(Value::Num(*n)),
        Expr::Literal(Literal::Str(s)) => Ok(Value::Str(s.clone())),
        Expr::Literal(Literal::Bool(b)) => Ok(Value::Bool(*b)),
        Expr::Literal(Literal::None) => Ok(Value::None),

        Expr::Name(name) => Ok(ctx.get(name)),

        Expr::Attribute(base, attr) => {
            let value = eval(base, ctx)?;
            Ok(match value {
                Value::Dict(map) => map.get(attr).cloned().unwrap_or(Value::Str(String::new())),
                Value::None => Value::Str(String::new()),
                _ => Value::Str(String::new()),
            })
        }

        Expr::Subscript(base, index) => {
            let value = eval(base, ctx)?;
            let index = eval(index, ctx)?;
            Ok(match (&value, &index) {
                (Value::Dict(map), _) => map
                    .get(&index.as_str_lossy())
                    .cloned()
                    .unwrap_or(Value::Str(String::new())),
                (Value::List(items), Value::Num(n)) => {
                    let idx = *n as i64;
                    let resolved = if idx < 0 { items.len() as i64 + idx } else { idx };
                    if resolved >= 0 && (resolved as usize) < items.len() {
                        items[resolved as usize].clone()
                    } else {
                        Value::Str(String::new())
                    }
                }
                _ => Value::Str(String::new()),
            })
        }

        Expr::Compare(left, rest) => {
            let mut left_val = eval(left, ctx)?;
            for (op, rhs_expr) in rest {
                let right_val = eval(rhs_expr, ctx)?;
                let passed = match op {
                    CompareOp::Eq => left_val.loose_eq(&right_val),
                    CompareOp::Ne => !left_val.loose_eq(&right_val),
                    CompareOp::Gt => left_val
                        .partial_cmp_loose(&right_val)
                        .is_some_and(|o| o == std::cmp::Ordering::Greater),
                    CompareOp::Lt => left_val
                        .partial_cmp_loose(&right_val)
                        .is_some_and(|o| o == std::cmp::Ordering::Less),
                    CompareOp::Ge => left_val
                        .partial_cmp_loose(&right_val)
                        .is_some_and(|o| o != std::cmp::Ordering::Less),
                    CompareOp::Le => left_val
                        .partial_cmp_loose(&right_val)
                        .is_some_and(|o| o != std::cmp::Ordering::Greater),
                    CompareOp::In => right_val.contains(&left_val),
                    CompareOp::NotIn => !right_val.contains(&left_val),
                };
                if !passed {
                    return Ok(Value::Bool(false));
                }
                left_val = right_val;
            }
            Ok(Value::Bool(true))
        }

        Expr::BoolOp(BoolOp::And, values) => {
            for v in values {
                if !eval(v, ctx)?.truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        Expr::BoolOp(BoolOp::Or, values) => {
            for v in values {
                if eval(v, ctx)?.truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }

        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, ctx)?.truthy())),

        Expr::Call { func, args } => {
            let arg_values = args.iter().map(|a| eval(a, ctx)).collect::<Result<Vec<_>, _>>()?;
            if func == "rate_last_5min" {
                return Ok(ctx.get("_rate_last_5min"));
            }
            call_function(func, &arg_values).ok_or_else(|| ConditionError::UnknownFunction(func.clone()))
        }

        Expr::MethodCall { receiver, method, args } => {
            let receiver_val = eval(receiver, ctx)?;
            let arg_values = args.iter().map(|a| eval(a, ctx)).collect::<Result<Vec<_>, _>>()?;
            call_method(&receiver_val, method, &arg_values)
                .ok_or_else(|| ConditionError::UnsupportedMethod(method.clone()))
        }

        Expr::List(items) => {
            let values = items.iter().map(|e| eval(e, ctx)).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(values))
        }

        Expr::Ternary { test, body, orelse } => {
            if eval(test, ctx)?.truthy() {
                eval(body, ctx)
            } else {
                eval(orelse, ctx)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with(pairs: &[(&str, Value)]) -> EvalContext {
        let mut ctx = EvalContext::new();
        for (k, v) in pairs {
            ctx.set(*k, v.clone());
        }
        ctx
    }

    #[test]
    fn evaluates_simple_comparison() {
        let cond = CompiledCondition::new("estimated_cost > 0.5").unwrap();
        assert!(cond
            .evaluate(&ctx_with(&[("estimated_cost", Value::Num(1.0))]))
            .unwrap());
        assert!(!cond
            .evaluate(&ctx_with(&[("estimated_cost", Value::Num(0.1))]))
            .unwrap());
    }

    #[test]
    fn evaluates_and_or_logic() {
        let cond = CompiledCondition::new("a == 1 and b == 2").unwrap();
        assert!(cond
            .evaluate(&ctx_with(&[("a", Value::Num(1.0)), ("b", Value::Num(2.0))]))
            .unwrap());
        assert!(!cond
            .evaluate(&ctx_with(&[("a", Value::Num(1.0)), ("b", Value::Num(3.0))]))
            .unwrap());
    }

    #[test]
    fn missing_identifier_resolves_to_empty_string_not_error() {
        let cond = CompiledCondition::new("missing_field == \"\"").unwrap();
        assert!(cond.evaluate(&EvalContext::new()).unwrap());
    }

    #[test]
    fn calls_contains_pii_builtin() {
        let cond = CompiledCondition::new("contains_pii(parameters)").unwrap();
        let mut params = HashMap::new();
        params.insert("ssn".to_string(), Value::Str("123-45-6789".into()));
        assert!(cond
            .evaluate(&ctx_with(&[("parameters", Value::Dict(params))]))
            .unwrap());
    }

    #[test]
    fn calls_startswith_method() {
        let cond = CompiledCondition::new("path.startswith(\"/etc\")").unwrap();
        assert!(cond
            .evaluate(&ctx_with(&[("path", Value::Str("/etc/passwd".into()))]))
            .unwrap());
    }

    #[test]
    fn unknown_function_is_an_error_not_a_panic() {
        let cond = CompiledCondition::new("nonexistent_fn(1)").unwrap();
        assert!(cond.evaluate(&EvalContext::new()).is_err());
    }
}
