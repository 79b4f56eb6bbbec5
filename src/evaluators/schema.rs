//! Structural validation of an [`ActionIntent`] before any other
//! evaluator runs.

use crate::types::{ActionIntent, EvaluatorResult, Verdict};

use super::Evaluator;

/// Validates that an intent is well-formed: non-empty identifiers, a
/// non-negative estimated cost.
///
/// Empty `parameters` is accepted — an action with no arguments (e.g.
/// `session.close`) is well-formed, not malformed, so this evaluator does
/// not reject on an empty parameter map.
#[derive(Debug, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for SchemaValidator {
    fn name(&self) -> &str {
        "schema_validator"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn evaluate(&self, intent: &ActionIntent) -> EvaluatorResult {
        let mut errors = Vec::new();

        if intent.action_type.trim().is_empty() {
            errors.push("action_type must be non-empty".to_string());
        }
        if intent.tool_name.trim().is_empty() {
            errors.push("tool_name must be non-empty".to_string());
        }
        if intent.agent_id.trim().is_empty() {
            errors.push("agent_id must be non-empty".to_string());
        }
        if intent.estimated_cost < 0.0 {
            errors.push("estimated_cost must be non-negative".to_string());
        }
        if intent.action_id.is_empty() {
            errors.push("action_id must be non-empty".to_string());
        }

        if !errors.is_empty() {
            return EvaluatorResult::new(
                Verdict::Block,
                format!("Schema validation failed: {}", errors.join("; ")),
                self.name(),
            );
        }

        EvaluatorResult::new(Verdict::Allow, "ActionIntent is well-formed", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn blocks_on_empty_action_type() {
        let mut intent = ActionIntent::new("", "tool", "agent-1", HashMap::new());
        intent.action_type = String::new();
        let result = SchemaValidator::new().evaluate(&intent);
        assert_eq!(result.verdict, Verdict::Block);
    }

    #[test]
    fn allows_empty_parameters() {
        let intent = ActionIntent::new("session.close", "close_session", "agent-1", HashMap::new());
        let result = SchemaValidator::new().evaluate(&intent);
        assert_eq!(result.verdict, Verdict::Allow);
    }

    #[test]
    fn blocks_on_negative_cost() {
        let mut intent = ActionIntent::new("file.read", "read_file", "agent-1", HashMap::new());
        intent.estimated_cost = -1.0;
        let result = SchemaValidator::new().evaluate(&intent);
        assert_eq!(result.verdict, Verdict::Block);
    }
}
