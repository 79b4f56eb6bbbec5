//! Times and runs the underlying operation once a verdict has allowed it,
//! and builds the audit record for whatever happened.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value as JsonValue;

use crate::types::{ActionIntent, AuditEntry, Verdict};

const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "secret",
    "token",
    "api_key",
    "apikey",
    "credential",
    "private_key",
    "access_token",
    "refresh_token",
    "auth",
];

const REDACTED: &str = "***REDACTED***";

/// Recursively redacts values of sensitive-sounding keys before they're
/// written to the audit log. Case-insensitive, operates on JSON objects
/// and arrays.
pub fn sanitize_params(params: &HashMap<String, JsonValue>) -> HashMap<String, JsonValue> {
    params.iter().map(|(k, v)| (k.clone(), sanitize_value(k, v))).collect()
}

fn sanitize_value(key: &str, value: &JsonValue) -> JsonValue {
    if is_sensitive_key(key) {
        return JsonValue::String(REDACTED.to_string());
    }
    match value {
        JsonValue::Object(map) => {
            JsonValue::Object(map.iter().map(|(k, v)| (k.clone(), sanitize_value(k, v))).collect())
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(|v| sanitize_value(key, v)).collect()),
        other => other.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|k| lower == *k)
}

/// Outcome of running the guarded operation.
pub struct ExecutionOutcome {
    pub success: bool,
    pub output: Option<JsonValue>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Executes the caller-supplied operation for an allowed intent, or
/// short-circuits with zero duration for a blocking verdict.
#[derive(Clone, Default)]
pub struct ExecutionGate;

impl ExecutionGate {
    pub fn new() -> Self {
        Self
    }

    /// Runs `operation` and times it, capturing success/output/error. The
    /// caller is expected to have already checked that `verdict` permits
    /// execution; this function does not itself inspect the verdict.
    pub async fn execute<F, Fut>(&self, operation: F) -> ExecutionOutcome
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<JsonValue, anyhow::Error>>,
    {
        let started = Instant::now();
        match operation().await {
            Ok(output) => ExecutionOutcome {
                success: true,
                output: Some(output),
                error: None,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            Err(err) => ExecutionOutcome {
                success: false,
                output: None,
                error: Some(err.to_string()),
                duration_ms: started.elapsed().as_millis() as u64,
            },
        }
    }

    /// Builds the audit entry for a blocking verdict: zero duration, no
    /// execution attempted.
    pub fn build_blocked_audit(
        &self,
        intent: &ActionIntent,
        verdict: Verdict,
        reason: &str,
        policy_triggered: Option<String>,
    ) -> AuditEntry {
        AuditEntry {
            action_id: intent.action_id.clone(),
            agent_id: intent.agent_id.clone(),
            action_type: intent.action_type.clone(),
            verdict,
            risk_score: 0.0,
            task_id: intent.task_id.clone(),
            policy_triggered,
            evaluator_results: Vec::new(),
            instruction_chain: intent.instruction_chain.clone(),
            parameters: sanitize_params(&intent.parameters),
            duration_ms: 0,
            timestamp: chrono::Utc::now(),
            rolled_back: false,
            error: Some(reason.to_string()),
        }
    }

    /// Builds the audit entry for an executed (non-blocking) action.
    pub fn build_executed_audit(
        &self,
        intent: &ActionIntent,
        verdict: Verdict,
        outcome: &ExecutionOutcome,
    ) -> AuditEntry {
        AuditEntry {
            action_id: intent.action_id.clone(),
            agent_id: intent.agent_id.clone(),
            action_type: intent.action_type.clone(),
            verdict,
            risk_score: 0.0,
            task_id: intent.task_id.clone(),
            policy_triggered: None,
            evaluator_results: Vec::new(),
            instruction_chain: intent.instruction_chain.clone(),
            parameters: sanitize_params(&intent.parameters),
            duration_ms: outcome.duration_ms,
            timestamp: chrono::Utc::now(),
            rolled_back: false,
            error: outcome.error.clone(),
        }
    }
}
