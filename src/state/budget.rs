//! Authoritative cross-agent spend ledger, consulted by the facade before
//! an action is allowed to run. Distinct from [`crate::evaluators::CostEstimator`],
//! which only enforces per-agent/per-task ceilings inside the pipeline;
//! this manager is additionally responsible for detecting "budget gaming"
//! — many agents quietly converging on the same task's budget — and for
//! recrediting spend when an action is rolled back.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::types::Verdict;

#[derive(Debug, Default)]
struct TaskLedger {
    total_spend: f64,
    agents_seen: HashSet<String>,
    action_spend: HashMap<String, f64>,
}

/// Outcome of a budget check prior to executing an action.
#[derive(Debug, Clone)]
pub struct BudgetCheckResult {
    pub verdict: Verdict,
    pub reason: String,
}

impl BudgetCheckResult {
    fn allow() -> Self {
        Self {
            verdict: Verdict::Allow,
            reason: "Within budget".to_string(),
        }
    }
}

/// Tracks spend per agent and per task, across the lifetime of the guard.
pub struct GlobalBudgetManager {
    per_task_budget: f64,
    gaming_agent_threshold: usize,
    gaming_spend_fraction: f64,
    tasks: Mutex<HashMap<String, TaskLedger>>,
}

impl GlobalBudgetManager {
    pub fn new(per_task_budget: f64) -> Self {
        Self {
            per_task_budget,
            gaming_agent_threshold: 3,
            gaming_spend_fraction: 0.8,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Checks whether `estimated_cost` may be spent against `task_id`
    /// without exceeding the per-task budget, and flags likely budget
    /// gaming: more than `gaming_agent_threshold` distinct agents drawing
    /// from the same task while projected spend already crosses
    /// `gaming_spend_fraction` of the per-task budget.
    pub fn check(&self, agent_id: &str, task_id: &str, estimated_cost: f64) -> BudgetCheckResult {
        let tasks = self.tasks.lock();
        let empty = TaskLedger::default();
        let ledger = tasks.get(task_id).unwrap_or(&empty);

        let projected = ledger.total_spend + estimated_cost;
        if projected > self.per_task_budget {
            return BudgetCheckResult {
                verdict: Verdict::Block,
                reason: format!(
                    "Task '{task_id}' projected spend {projected:.2} exceeds budget {:.2}",
                    self.per_task_budget
                ),
            };
        }

        let mut agents_seen = ledger.agents_seen.clone();
        agents_seen.insert(agent_id.to_string());
        if agents_seen.len() > self.gaming_agent_threshold
            && projected > self.per_task_budget * self.gaming_spend_fraction
        {
            return BudgetCheckResult {
                verdict: Verdict::Escalate,
                reason: format!(
                    "Possible budget gaming on task '{task_id}': {} distinct agents, {projected:.2}/{:.2} spent",
                    agents_seen.len(),
                    self.per_task_budget
                ),
            };
        }

        BudgetCheckResult::allow()
    }

    /// Records authoritative spend for a completed action. Called by the
    /// facade after execution, never speculatively.
    pub fn register_action(&self, agent_id: &str, task_id: &str, action_id: &str, cost: f64) {
        let mut tasks = self.tasks.lock();
        let ledger = tasks.entry(task_id.to_string()).or_default();
        ledger.total_spend += cost;
        ledger.agents_seen.insert(agent_id.to_string());
        ledger.action_spend.insert(action_id.to_string(), cost);
    }

    /// Returns spend to the task's ledger after a successful rollback.
    pub fn recredit(&self, task_id: &str, action_id: &str) {
        let mut tasks = self.tasks.lock();
        if let Some(ledger) = tasks.get_mut(task_id) {
            if let Some(cost) = ledger.action_spend.remove(action_id) {
                ledger.total_spend -= cost;
            }
        }
    }

    pub fn task_spend(&self, task_id: &str) -> f64 {
        self.tasks.lock().get(task_id).map(|l| l.total_spend).unwrap_or(0.0)
    }
}
