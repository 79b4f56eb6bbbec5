//! Condition compiler (`spec.md` §4.1): parses a restricted expression
//! grammar once at policy load time and evaluates the resulting AST
//! against a per-call context. Never panics and never raises at eval
//! time for recoverable situations — unresolved attribute lookups fall
//! back to an empty string; truly unsupported syntax surfaces a
//! [`ConditionError`] that the policy engine catches and treats as "this
//! policy did not trigger".

mod ast;
mod builtins;
mod compiled;
mod lexer;
mod parser;
mod value;

pub use builtins::{call_function, call_method, contains_pii, is_sensitive_path};
pub use compiled::{CompiledCondition, ConditionError, EvalContext};
pub use lexer::ParseError;
pub use value::Value;
