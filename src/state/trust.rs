//! Per-agent trust tracking: registration, action/error/violation counters,
//! and delegation permission.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::types::TrustLevel;

/// A registered agent's trust profile.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub agent_id: String,
    pub trust_level: TrustLevel,
    pub trust_score: f64,
    pub can_delegate_to: HashSet<String>,
    pub max_actions_per_run: Option<u32>,
    pub action_count: u32,
    pub error_count: u32,
    pub violation_count: u32,
}

impl AgentProfile {
    pub fn new(agent_id: impl Into<String>, trust_level: TrustLevel) -> Self {
        Self {
            agent_id: agent_id.into(),
            trust_score: trust_level.score(),
            trust_level,
            can_delegate_to: HashSet::new(),
            max_actions_per_run: None,
            action_count: 0,
            error_count: 0,
            violation_count: 0,
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.action_count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.action_count as f64
        }
    }

    pub fn has_actions_remaining(&self) -> bool {
        match self.max_actions_per_run {
            Some(max) => self.action_count < max,
            None => true,
        }
    }
}

/// Registry of agent trust profiles, shared across evaluations.
pub struct TrustLedger {
    block_unknown: bool,
    agents: RwLock<HashMap<String, AgentProfile>>,
}

impl TrustLedger {
    pub fn new(block_unknown: bool) -> Self {
        Self {
            block_unknown,
            agents: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, profile: AgentProfile) {
        self.agents.write().insert(profile.agent_id.clone(), profile);
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.agents.read().contains_key(agent_id)
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentProfile> {
        self.agents.read().get(agent_id).cloned()
    }

    /// Trust score for an agent, or `0.0` for an unregistered one.
    pub fn trust_score(&self, agent_id: &str) -> f64 {
        self.agents.read().get(agent_id).map(|p| p.trust_score).unwrap_or(0.0)
    }

    /// True if this ledger is configured to reject unknown agents
    /// outright, used by the facade before any evaluation runs.
    pub fn blocks_unknown(&self) -> bool {
        self.block_unknown
    }

    pub fn record_action(&self, agent_id: &str) {
        if let Some(profile) = self.agents.write().get_mut(agent_id) {
            profile.action_count += 1;
        }
    }

    pub fn record_error(&self, agent_id: &str) {
        if let Some(profile) = self.agents.write().get_mut(agent_id) {
            profile.error_count += 1;
        }
    }

    /// Records a policy violation and reduces trust score by a fixed
    /// penalty, clamped to `[0.0, 1.0]`.
    pub fn record_violation(&self, agent_id: &str) {
        if let Some(profile) = self.agents.write().get_mut(agent_id) {
            profile.violation_count += 1;
            profile.trust_score = (profile.trust_score - 0.05).clamp(0.0, 1.0);
        }
    }

    pub fn can_delegate(&self, from_agent: &str, to_agent: &str) -> bool {
        self.agents
            .read()
            .get(from_agent)
            .is_some_and(|p| p.can_delegate_to.contains(to_agent))
    }

    pub fn has_actions_remaining(&self, agent_id: &str) -> bool {
        self.agents.read().get(agent_id).is_none_or(|p| p.has_actions_remaining())
    }

    pub fn list_agents(&self) -> Vec<String> {
        self.agents.read().keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.agents.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_agent_has_zero_trust() {
        let ledger = TrustLedger::new(true);
        assert_eq!(ledger.trust_score("ghost"), 0.0);
        assert!(!ledger.is_registered("ghost"));
    }

    #[test]
    fn violation_reduces_trust_score_and_is_clamped() {
        let ledger = TrustLedger::new(false);
        ledger.register(AgentProfile::new("agent-1", TrustLevel::Peer));
        for _ in 0..20 {
            ledger.record_violation("agent-1");
        }
        assert_eq!(ledger.trust_score("agent-1"), 0.0);
    }

    #[test]
    fn action_budget_exhausts_after_max_actions() {
        let ledger = TrustLedger::new(false);
        let mut profile = AgentProfile::new("agent-1", TrustLevel::SubAgent);
        profile.max_actions_per_run = Some(2);
        ledger.register(profile);

        assert!(ledger.has_actions_remaining("agent-1"));
        ledger.record_action("agent-1");
        ledger.record_action("agent-1");
        assert!(!ledger.has_actions_remaining("agent-1"));
    }

    #[test]
    fn error_rate_is_fraction_of_actions() {
        let ledger = TrustLedger::new(false);
        ledger.register(AgentProfile::new("agent-1", TrustLevel::Peer));
        ledger.record_action("agent-1");
        ledger.record_action("agent-1");
        ledger.record_error("agent-1");
        assert_eq!(ledger.get("agent-1").unwrap().error_rate(), 0.5);
    }
}
