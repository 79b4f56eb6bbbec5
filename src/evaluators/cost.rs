//! Per-agent and per-task budget ceilings, distinct from the facade-level
//! global budget manager in `state::budget`. Both run; either blocking is
//! sufficient to stop an action. Only the global budget manager records
//! the authoritative spend ledger used for cross-agent gaming detection.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::types::{ActionIntent, EvaluatorResult, Verdict};

use super::Evaluator;

#[derive(Default)]
struct Ledger {
    per_agent_spend: HashMap<String, f64>,
    per_task_spend: HashMap<String, f64>,
}

/// Tracks running spend against per-agent and per-task ceilings, and
/// escalates a single action whose own cost crosses a configured
/// threshold regardless of cumulative spend.
pub struct CostEstimator {
    max_per_agent: f64,
    max_per_task: f64,
    single_action_escalation_threshold: f64,
    ledger: Mutex<Ledger>,
}

impl CostEstimator {
    pub fn new(max_per_agent: f64, max_per_task: f64, single_action_escalation_threshold: f64) -> Self {
        Self {
            max_per_agent,
            max_per_task,
            single_action_escalation_threshold,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Records the actual cost of a completed action against both
    /// ledgers. Called by the facade after execution, not during
    /// evaluation, so that blocked actions never consume budget.
    pub fn record_cost(&self, agent_id: &str, task_id: &str, cost: f64) {
        let mut ledger = self.ledger.lock();
        *ledger.per_agent_spend.entry(agent_id.to_string()).or_insert(0.0) += cost;
        *ledger.per_task_spend.entry(task_id.to_string()).or_insert(0.0) += cost;
    }

    pub fn agent_spend(&self, agent_id: &str) -> f64 {
        self.ledger.lock().per_agent_spend.get(agent_id).copied().unwrap_or(0.0)
    }

    pub fn task_spend(&self, task_id: &str) -> f64 {
        self.ledger.lock().per_task_spend.get(task_id).copied().unwrap_or(0.0)
    }
}

impl Evaluator for CostEstimator {
    fn name(&self) -> &str {
        "cost_estimator"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn evaluate(&self, intent: &ActionIntent) -> EvaluatorResult {
        if intent.estimated_cost >= self.single_action_escalation_threshold {
            return EvaluatorResult::new(
                Verdict::Escalate,
                format!(
                    "Single action cost {:.2} exceeds escalation threshold {:.2}",
                    intent.estimated_cost, self.single_action_escalation_threshold
                ),
                self.name(),
            );
        }

        let projected_agent = self.agent_spend(&intent.agent_id) + intent.estimated_cost;
        if projected_agent > self.max_per_agent {
            return EvaluatorResult::new(
                Verdict::Block,
                format!(
                    "Projected agent spend {projected_agent:.2} exceeds per-agent budget {:.2}",
                    self.max_per_agent
                ),
                self.name(),
            );
        }

        if let Some(task_id) = &intent.task_id {
            let projected_task = self.task_spend(task_id) + intent.estimated_cost;
            if projected_task > self.max_per_task {
                return EvaluatorResult::new(
                    Verdict::Block,
                    format!(
                        "Projected task spend {projected_task:.2} exceeds per-task budget {:.2}",
                        self.max_per_task
                    ),
                    self.name(),
                );
            }
        }

        EvaluatorResult::new(Verdict::Allow, "Within cost budget", self.name())
    }
}
