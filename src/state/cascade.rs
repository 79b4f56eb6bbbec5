//! Delegation cascade tracking: bounds how deep and how wide a chain of
//! agents delegating to one another may grow, and detects cycles.

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;

use crate::types::AgentCall;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CascadeError {
    #[error("delegation cascade depth {depth} exceeds maximum {max_depth}")]
    DepthExceeded { depth: usize, max_depth: usize },

    #[error("delegation cycle detected: agent '{agent_id}' already appears in the instruction chain")]
    CycleDetected { agent_id: String },

    #[error("orchestrator '{orchestrator_id}' has {active} concurrent delegations, exceeding {max_concurrent}")]
    ConcurrencyExceeded {
        orchestrator_id: String,
        active: usize,
        max_concurrent: usize,
    },
}

/// Validates a proposed delegation chain against depth, cycle, and
/// concurrency limits.
pub struct CascadeController {
    max_depth: usize,
    max_concurrent_per_orchestrator: usize,
    active_delegations: Mutex<HashMap<String, usize>>,
}

impl CascadeController {
    pub fn new(max_depth: usize, max_concurrent_per_orchestrator: usize) -> Self {
        Self {
            max_depth,
            max_concurrent_per_orchestrator,
            active_delegations: Mutex::new(HashMap::new()),
        }
    }

    /// Checks a proposed delegation: `chain` is the instruction chain
    /// accumulated so far (not including `current_agent`), and
    /// `current_agent` is the agent about to act.
    pub fn check(&self, chain: &[AgentCall], current_agent: &str) -> Result<(), CascadeError> {
        if chain.len() >= self.max_depth {
            return Err(CascadeError::DepthExceeded {
                depth: chain.len(),
                max_depth: self.max_depth,
            });
        }

        if chain.iter().any(|call| call.agent_id == current_agent) {
            return Err(CascadeError::CycleDetected {
                agent_id: current_agent.to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for call in chain {
            if !seen.insert(&call.agent_id) {
                return Err(CascadeError::CycleDetected {
                    agent_id: call.agent_id.clone(),
                });
            }
        }

        Ok(())
    }

    /// Call when a delegation begins; pairs with [`Self::record_delegation_end`].
    pub fn record_delegation_start(&self, orchestrator_id: &str) -> Result<(), CascadeError> {
        let mut active = self.active_delegations.lock();
        let count = active.entry(orchestrator_id.to_string()).or_insert(0);
        if *count >= self.max_concurrent_per_orchestrator {
            return Err(CascadeError::ConcurrencyExceeded {
                orchestrator_id: orchestrator_id.to_string(),
                active: *count,
                max_concurrent: self.max_concurrent_per_orchestrator,
            });
        }
        *count += 1;
        Ok(())
    }

    pub fn record_delegation_end(&self, orchestrator_id: &str) {
        let mut active = self.active_delegations.lock();
        if let Some(count) = active.get_mut(orchestrator_id) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn active_count(&self, orchestrator_id: &str) -> usize {
        self.active_delegations.lock().get(orchestrator_id).copied().unwrap_or(0)
    }

    pub fn reset(&self) {
        self.active_delegations.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn call(agent_id: &str) -> AgentCall {
        AgentCall {
            agent_id: agent_id.to_string(),
            trust_level: 0.5,
            instruction: "do thing".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn allows_short_acyclic_chain() {
        let controller = CascadeController::new(5, 10);
        let chain = vec![call("orchestrator"), call("sub-agent-1")];
        assert!(controller.check(&chain, "sub-agent-2").is_ok());
    }

    #[test]
    fn rejects_chain_at_max_depth() {
        let controller = CascadeController::new(2, 10);
        let chain = vec![call("a"), call("b")];
        assert!(matches!(
            controller.check(&chain, "c"),
            Err(CascadeError::DepthExceeded { .. })
        ));
    }

    #[test]
    fn rejects_agent_reappearing_in_chain() {
        let controller = CascadeController::new(5, 10);
        let chain = vec![call("orchestrator"), call("sub-agent")];
        assert!(matches!(
            controller.check(&chain, "orchestrator"),
            Err(CascadeError::CycleDetected { .. })
        ));
    }

    #[test]
    fn concurrency_limit_is_enforced_and_released() {
        let controller = CascadeController::new(5, 1);
        controller.record_delegation_start("orchestrator").unwrap();
        assert!(controller.record_delegation_start("orchestrator").is_err());
        controller.record_delegation_end("orchestrator");
        assert!(controller.record_delegation_start("orchestrator").is_ok());
    }
}
