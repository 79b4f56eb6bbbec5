//! Core data model: intents, verdicts, and the records that flow through
//! the evaluation pipeline and audit log.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Result of evaluating an [`ActionIntent`].
///
/// Ordered by severity from most to least restrictive: `BLOCK` < `ESCALATE`
/// < `DEFER` < `WARN` < `ALLOW`. [`Verdict::severity`] encodes this order so
/// the pipeline can pick the worst of several results with a plain `min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Allow,
    Block,
    Escalate,
    Defer,
    Warn,
}

impl Verdict {
    /// Lower is more severe. Used to pick the worst verdict among several.
    pub fn severity(self) -> u8 {
        match self {
            Verdict::Block => 0,
            Verdict::Escalate => 1,
            Verdict::Defer => 2,
            Verdict::Warn => 3,
            Verdict::Allow => 4,
        }
    }

    /// True if the action may proceed.
    pub fn is_permissive(self) -> bool {
        matches!(self, Verdict::Allow | Verdict::Warn)
    }

    /// True if the action must not execute.
    pub fn is_blocking(self) -> bool {
        matches!(self, Verdict::Block | Verdict::Escalate | Verdict::Defer)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Allow => "ALLOW",
            Verdict::Block => "BLOCK",
            Verdict::Escalate => "ESCALATE",
            Verdict::Defer => "DEFER",
            Verdict::Warn => "WARN",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pre-declared risk classification for an action type, used as the
/// baseline before the dynamic risk scorer (§4.3) adjusts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn base_score(self) -> f64 {
        match self {
            RiskLevel::Low => 0.1,
            RiskLevel::Medium => 0.3,
            RiskLevel::High => 0.6,
            RiskLevel::Critical => 0.9,
        }
    }
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Medium
    }
}

/// Trust classification for agents in a multi-agent system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrustLevel {
    Human,
    Orchestrator,
    Peer,
    SubAgent,
    Unknown,
}

impl TrustLevel {
    pub fn score(self) -> f64 {
        match self {
            TrustLevel::Human => 1.0,
            TrustLevel::Orchestrator => 0.8,
            TrustLevel::Peer => 0.5,
            TrustLevel::SubAgent => 0.3,
            TrustLevel::Unknown => 0.0,
        }
    }
}

/// One hop in a multi-agent delegation chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCall {
    pub agent_id: String,
    pub trust_level: f64,
    pub instruction: String,
    pub timestamp: DateTime<Utc>,
}

/// A pending action an agent wants to execute. This is the primary value
/// that flows through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionIntent {
    pub action_type: String,
    pub tool_name: String,
    pub parameters: HashMap<String, JsonValue>,
    pub agent_id: String,
    #[serde(default)]
    pub task_context: String,
    #[serde(default = "Uuid::new_v4_string")]
    pub action_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub instruction_chain: Vec<AgentCall>,
    #[serde(default)]
    pub metadata: HashMap<String, JsonValue>,
}

// serde's `default = "path"` needs a zero-arg free function; give Uuid one
// via an extension trait so callers never see plumbing.
trait NewV4String {
    fn new_v4_string() -> String;
}
impl NewV4String for Uuid {
    fn new_v4_string() -> String {
        Uuid::new_v4().to_string()
    }
}

impl ActionIntent {
    /// Build a new intent with freshly generated `action_id`/`timestamp`.
    pub fn new(
        action_type: impl Into<String>,
        tool_name: impl Into<String>,
        agent_id: impl Into<String>,
        parameters: HashMap<String, JsonValue>,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            tool_name: tool_name.into(),
            parameters,
            agent_id: agent_id.into(),
            task_context: String::new(),
            action_id: Uuid::new_v4().to_string(),
            task_id: None,
            timestamp: Utc::now(),
            estimated_cost: 0.0,
            risk_level: RiskLevel::Medium,
            instruction_chain: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

/// The output of a single evaluator in the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorResult {
    pub verdict: Verdict,
    pub reason: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub evaluator_name: String,
    #[serde(default)]
    pub suggested_action: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, JsonValue>,
}

fn default_confidence() -> f64 {
    1.0
}

impl EvaluatorResult {
    pub fn new(verdict: Verdict, reason: impl Into<String>, evaluator_name: impl Into<String>) -> Self {
        Self {
            verdict,
            reason: reason.into(),
            confidence: 1.0,
            evaluator_name: evaluator_name.into(),
            suggested_action: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// The result of executing a guarded action.
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub action_id: String,
    pub success: bool,
    pub output: Option<JsonValue>,
    pub duration_ms: u64,
    pub rolled_back: bool,
    pub audit_entry: Option<AuditEntry>,
    pub error: Option<String>,
}

/// Immutable audit record written for every action evaluated by the guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action_id: String,
    pub agent_id: String,
    pub action_type: String,
    pub verdict: Verdict,
    #[serde(default)]
    pub risk_score: f64,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub policy_triggered: Option<String>,
    #[serde(default)]
    pub evaluator_results: Vec<EvaluatorResult>,
    #[serde(default)]
    pub instruction_chain: Vec<AgentCall>,
    #[serde(default)]
    pub parameters: HashMap<String, JsonValue>,
    #[serde(default)]
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub rolled_back: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Filter criteria for querying the audit log.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
    pub verdict: Option<Verdict>,
    pub action_type: Option<String>,
    pub from_time: Option<DateTime<Utc>>,
    pub to_time: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }
}

/// Summary of a batch rollback operation (e.g. `rollback_task`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct RollbackReport {
    pub task_id: String,
    pub total_actions: usize,
    pub rolled_back: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
}

impl RollbackReport {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            ..Default::default()
        }
    }

    /// True only when every tracked action for the task rolled back cleanly.
    pub fn success(&self) -> bool {
        self.failed.is_empty() && !self.rolled_back.is_empty()
    }
}

/// Aggregate metrics snapshot, folded from the audit log.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GuardMetrics {
    pub total_actions: u64,
    pub allowed_actions: u64,
    pub blocked_actions: u64,
    pub escalated_actions: u64,
    pub warned_actions: u64,
    pub deferred_actions: u64,
    pub rollbacks: u64,
    pub rollback_failures: u64,
    pub total_cost: f64,
    pub avg_risk_score: f64,
    pub avg_duration_ms: f64,
    pub actions_by_agent: HashMap<String, u64>,
    pub actions_by_type: HashMap<String, u64>,
    pub verdicts_by_policy: HashMap<String, u64>,
}

impl GuardMetrics {
    /// Render as Prometheus text exposition format.
    pub fn to_prometheus(&self) -> String {
        let mut lines = vec![
            format!("actionguard_total_actions {}", self.total_actions),
            format!("actionguard_allowed_actions {}", self.allowed_actions),
            format!("actionguard_blocked_actions {}", self.blocked_actions),
            format!("actionguard_escalated_actions {}", self.escalated_actions),
            format!("actionguard_warned_actions {}", self.warned_actions),
            format!("actionguard_deferred_actions {}", self.deferred_actions),
            format!("actionguard_rollbacks {}", self.rollbacks),
            format!("actionguard_rollback_failures {}", self.rollback_failures),
            format!("actionguard_total_cost {}", self.total_cost),
            format!("actionguard_avg_risk_score {}", self.avg_risk_score),
            format!("actionguard_avg_duration_ms {}", self.avg_duration_ms),
        ];
        for (agent_id, count) in &self.actions_by_agent {
            lines.push(format!(
                "actionguard_actions_by_agent{{agent_id=\"{agent_id}\"}} {count}"
            ));
        }
        for (action_type, count) in &self.actions_by_type {
            lines.push(format!(
                "actionguard_actions_by_type{{action_type=\"{action_type}\"}} {count}"
            ));
        }
        lines.join("\n") + "\n"
    }
}
