//! User-defined policies: declarative rules matched by action type and an
//! optional condition expression, evaluated in priority order with
//! inheritance and conflict detection.

use serde::Deserialize;

use crate::dsl::{CompiledCondition, EvalContext, Value};
use crate::types::{ActionIntent, EvaluatorResult, Verdict};

use super::Evaluator;

/// A single declarative rule. `condition` is compiled once, at load time,
/// via [`Policy::compile`]; evaluation only ever walks the cached AST.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct Policy {
    pub name: String,
    pub action_types: Vec<String>,
    #[serde(default)]
    pub condition: Option<String>,
    pub verdict: Verdict,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub escalate_to: Option<String>,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub priority: i32,

    #[serde(skip)]
    compiled: Option<CompiledCondition>,
}

impl Policy {
    /// True if `action_type` matches any of this policy's patterns.
    /// Patterns may end in `*` for a prefix match, mirroring `fnmatch`
    /// used for simple glob patterns in the original.
    pub fn matches_action_type(&self, action_type: &str) -> bool {
        self.action_types.iter().any(|pattern| glob_match(pattern, action_type))
    }

    /// Parses `condition` if present, caching the compiled form. Must be
    /// called once after deserialization (and after `inherit_from`, since
    /// inheritance can fill in a condition from a parent policy).
    pub fn compile(&mut self) -> Result<(), crate::dsl::ParseError> {
        if let Some(source) = &self.condition {
            self.compiled = Some(CompiledCondition::new(source.clone())?);
        }
        Ok(())
    }

    /// Fills in any fields left unset (zero-value) from `parent`, mirroring
    /// the original's shallow single-level inheritance semantics. Explicit
    /// fields on the child always win.
    pub fn inherit_from(&mut self, parent: &Policy) {
        if self.action_types.is_empty() {
            self.action_types = parent.action_types.clone();
        }
        if self.condition.is_none() {
            self.condition = parent.condition.clone();
        }
        if self.message.is_none() {
            self.message = parent.message.clone();
        }
        if self.escalate_to.is_none() {
            self.escalate_to = parent.escalate_to.clone();
        }
    }

    fn build_context(&self, intent: &ActionIntent, rate_last_5min: usize) -> EvalContext {
        let mut ctx = EvalContext::new();
        ctx.set("action_type", Value::Str(intent.action_type.clone()));
        ctx.set("tool_name", Value::Str(intent.tool_name.clone()));
        ctx.set("agent_id", Value::Str(intent.agent_id.clone()));
        ctx.set("task_context", Value::Str(intent.task_context.clone()));
        ctx.set("estimated_cost", Value::Num(intent.estimated_cost));
        ctx.set("risk_level", Value::Str(format!("{:?}", intent.risk_level).to_uppercase()));
        ctx.set(
            "parameters",
            Value::Dict(
                intent
                    .parameters
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        );
        ctx.set(
            "metadata",
            Value::Dict(intent.metadata.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect()),
        );
        ctx.set("_rate_last_5min", Value::Num(rate_last_5min as f64));
        ctx
    }

    /// Evaluates this policy's condition (if any) against an intent.
    /// `Ok(true)` means the policy is triggered. A [`crate::dsl::ConditionError`]
    /// (unsupported function/method in the condition) is surfaced so the
    /// caller can treat it as "this policy did not trigger" rather than a
    /// hard failure.
    fn matches_condition(
        &self,
        intent: &ActionIntent,
        rate_last_5min: usize,
    ) -> Result<bool, crate::dsl::ConditionError> {
        match &self.compiled {
            None => Ok(true),
            Some(compiled) => compiled.evaluate(&self.build_context(intent, rate_last_5min)),
        }
    }
}

fn glob_match(pattern: &str, value: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        value.starts_with(prefix)
    } else {
        pattern == value
    }
}

/// A detected overlap between two policies that could both match the same
/// action with differing verdicts.
#[derive(Debug, Clone)]
pub struct PolicyConflict {
    pub policy_a: String,
    pub policy_b: String,
    pub overlapping_action_types: Vec<String>,
}

impl std::fmt::Display for PolicyConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "policies '{}' and '{}' both match {:?}",
            self.policy_a, self.policy_b, self.overlapping_action_types
        )
    }
}

/// Result of dry-running an intent through the policy set without
/// recording anything or affecting state.
#[derive(Debug, Clone)]
pub struct PolicyDryRunResult {
    pub would_block: bool,
    pub matched_policies: Vec<String>,
    pub summary: String,
}

/// Loads, compiles, and evaluates a set of [`Policy`] values in priority
/// order. The first policy whose action-type pattern and condition both
/// match an intent determines the verdict.
pub struct PolicyEngine {
    policies: Vec<Policy>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self { policies: Vec::new() }
    }

    /// Loads policies from parsed YAML/JSON documents, resolving
    /// `extends` references and compiling every condition up front so a
    /// malformed policy fails at load time, not mid-evaluation.
    pub fn load_policies(&mut self, mut policies: Vec<Policy>) -> Result<(), crate::error::PolicyError> {
        Self::resolve_inheritance(&mut policies);
        for policy in &mut policies {
            policy.compile().map_err(|source| crate::error::PolicyError::ParseError {
                policy: policy.name.clone(),
                source,
            })?;
        }
        policies.sort_by_key(|p| p.priority);
        self.policies = policies;
        Ok(())
    }

    pub fn add_policy(&mut self, mut policy: Policy) -> Result<(), crate::error::PolicyError> {
        if let Some(parent_name) = policy.extends.clone() {
            if let Some(parent) = self.policies.iter().find(|p| p.name == parent_name).cloned() {
                policy.inherit_from(&parent);
            }
        }
        policy
            .compile()
            .map_err(|source| crate::error::PolicyError::ParseError {
                policy: policy.name.clone(),
                source,
            })?;
        let insert_at = self.policies.partition_point(|p| p.priority <= policy.priority);
        self.policies.insert(insert_at, policy);
        Ok(())
    }

    fn resolve_inheritance(policies: &mut [Policy]) {
        let snapshot = policies.to_vec();
        for policy in policies.iter_mut() {
            if let Some(parent_name) = &policy.extends {
                if let Some(parent) = snapshot.iter().find(|p| &p.name == parent_name) {
                    policy.inherit_from(parent);
                }
            }
        }
    }

    fn find_overlapping_types(a: &Policy, b: &Policy) -> Vec<String> {
        a.action_types
            .iter()
            .filter(|pattern| b.action_types.iter().any(|other| other == *pattern || glob_match(other, pattern)))
            .cloned()
            .collect()
    }

    /// Flags pairs of policies whose action-type patterns overlap and
    /// whose verdicts differ, which is very likely a misconfiguration.
    pub fn detect_conflicts(&self) -> Vec<PolicyConflict> {
        let mut conflicts = Vec::new();
        for (i, a) in self.policies.iter().enumerate() {
            for b in &self.policies[i + 1..] {
                if a.verdict == b.verdict {
                    continue;
                }
                let overlap = Self::find_overlapping_types(a, b);
                if !overlap.is_empty() {
                    conflicts.push(PolicyConflict {
                        policy_a: a.name.clone(),
                        policy_b: b.name.clone(),
                        overlapping_action_types: overlap,
                    });
                }
            }
        }
        conflicts
    }

    /// Runs every policy against an intent without side effects, reporting
    /// which policies would have matched and what the outcome would be.
    pub fn dry_run(&self, intent: &ActionIntent, rate_last_5min: usize) -> PolicyDryRunResult {
        let mut matched_policies = Vec::new();
        let mut would_block = false;

        for policy in &self.policies {
            if !policy.matches_action_type(&intent.action_type) {
                continue;
            }
            match policy.matches_condition(intent, rate_last_5min) {
                Ok(true) => {
                    matched_policies.push(policy.name.clone());
                    if policy.verdict.is_blocking() {
                        would_block = true;
                    }
                }
                Ok(false) => continue,
                Err(_) => continue,
            }
        }

        let summary = if matched_policies.is_empty() {
            "No policy matched this action".to_string()
        } else {
            format!("Matched policies: {}", matched_policies.join(", "))
        };

        PolicyDryRunResult {
            would_block,
            matched_policies,
            summary,
        }
    }

    fn find_first_match(
        &self,
        intent: &ActionIntent,
        rate_last_5min: usize,
    ) -> Option<&Policy> {
        for policy in &self.policies {
            if !policy.matches_action_type(&intent.action_type) {
                continue;
            }
            // A condition that raises at evaluation time is treated as
            // "did not trigger", same as the original's `except
            // PolicyConditionError: continue`.
            match policy.matches_condition(intent, rate_last_5min) {
                Ok(true) => return Some(policy),
                Ok(false) | Err(_) => continue,
            }
        }
        None
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for PolicyEngine {
    fn name(&self) -> &str {
        "policy_engine"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn evaluate(&self, intent: &ActionIntent) -> EvaluatorResult {
        let rate_last_5min = intent
            .metadata
            .get("_rate_last_5min")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize;

        match self.find_first_match(intent, rate_last_5min) {
            Some(policy) => {
                let reason = policy
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("Policy '{}' matched", policy.name));
                let mut result = EvaluatorResult::new(policy.verdict, reason, self.name())
                    .with_metadata("policy_name", serde_json::json!(policy.name));
                if let Some(target) = &policy.escalate_to {
                    result = result.with_metadata("escalate_to", serde_json::json!(target));
                }
                result
            }
            None => EvaluatorResult::new(Verdict::Allow, "No policy matched", self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn policy(name: &str, action_type: &str, verdict: Verdict, priority: i32) -> Policy {
        Policy {
            name: name.to_string(),
            action_types: vec![action_type.to_string()],
            condition: None,
            verdict,
            message: None,
            escalate_to: None,
            extends: None,
            priority,
            compiled: None,
        }
    }

    #[test]
    fn matches_glob_action_type() {
        let mut p = policy("block-shell", "shell.*", Verdict::Block, 0);
        p.compile().unwrap();
        assert!(p.matches_action_type("shell.exec"));
        assert!(!p.matches_action_type("file.read"));
    }

    #[test]
    fn first_matching_policy_wins_by_priority() {
        let mut engine = PolicyEngine::new();
        engine
            .load_policies(vec![
                policy("allow-all-files", "file.*", Verdict::Allow, 10),
                policy("block-delete", "file.delete", Verdict::Block, 0),
            ])
            .unwrap();

        let intent = ActionIntent::new("file.delete", "delete_file", "agent-1", HashMap::new());
        let result = engine.evaluate(&intent);
        assert_eq!(result.verdict, Verdict::Block);
    }

    #[test]
    fn no_match_allows() {
        let mut engine = PolicyEngine::new();
        engine.load_policies(vec![policy("block-shell", "shell.*", Verdict::Block, 0)]).unwrap();

        let intent = ActionIntent::new("file.read", "read_file", "agent-1", HashMap::new());
        assert_eq!(engine.evaluate(&intent).verdict, Verdict::Allow);
    }

    #[test]
    fn condition_gates_policy_trigger() {
        let mut p = policy("expensive-escalate", "http.*", Verdict::Escalate, 0);
        p.condition = Some("estimated_cost > 10".to_string());
        let mut engine = PolicyEngine::new();
        engine.load_policies(vec![p]).unwrap();

        let mut cheap = ActionIntent::new("http.post", "submit", "agent-1", HashMap::new());
        cheap.estimated_cost = 1.0;
        assert_eq!(engine.evaluate(&cheap).verdict, Verdict::Allow);

        let mut expensive = ActionIntent::new("http.post", "submit", "agent-1", HashMap::new());
        expensive.estimated_cost = 50.0;
        assert_eq!(engine.evaluate(&expensive).verdict, Verdict::Escalate);
    }

    #[test]
    fn detects_conflicting_overlapping_policies() {
        let mut engine = PolicyEngine::new();
        engine
            .load_policies(vec![
                policy("allow-files", "file.*", Verdict::Allow, 0),
                policy("block-files", "file.*", Verdict::Block, 1),
            ])
            .unwrap();
        assert_eq!(engine.detect_conflicts().len(), 1);
    }
}
