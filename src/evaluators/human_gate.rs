//! Routes high-risk actions to a human approver before they may proceed.

use std::collections::HashSet;
use std::sync::Arc;

use crate::types::{ActionIntent, EvaluatorResult, RiskLevel, Verdict};

use super::Evaluator;

/// Decides whether a pending action is approved. Implementors may prompt a
/// human, call out to an approval queue, or (in the default) auto-approve
/// with a loud warning — approving everything is never appropriate for a
/// production deployment, but it keeps the guard usable out of the box.
pub trait ApprovalCallback: Send + Sync {
    fn approve(&self, intent: &ActionIntent) -> bool;
}

/// Auto-approves every request it's asked about. Logs a warning on every
/// call so this never silently substitutes for real human review.
pub struct AutoApprove;

impl ApprovalCallback for AutoApprove {
    fn approve(&self, intent: &ActionIntent) -> bool {
        tracing::warn!(
            action_id = %intent.action_id,
            action_type = %intent.action_type,
            "human_gate has no approval callback configured; auto-approving"
        );
        true
    }
}

/// Escalates to a human approver when an action's risk level or type
/// matches a configured trigger set.
pub struct HumanGate {
    require_for_risk_levels: HashSet<RiskLevel>,
    require_for_action_types: HashSet<String>,
    callback: Arc<dyn ApprovalCallback>,
}

impl HumanGate {
    pub fn new(
        require_for_risk_levels: HashSet<RiskLevel>,
        require_for_action_types: HashSet<String>,
        callback: Arc<dyn ApprovalCallback>,
    ) -> Self {
        Self {
            require_for_risk_levels,
            require_for_action_types,
            callback,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            HashSet::from([RiskLevel::Critical]),
            HashSet::new(),
            Arc::new(AutoApprove),
        )
    }

    fn requires_approval(&self, intent: &ActionIntent) -> bool {
        self.require_for_risk_levels.contains(&intent.risk_level)
            || self.require_for_action_types.contains(&intent.action_type)
    }
}

impl Evaluator for HumanGate {
    fn name(&self) -> &str {
        "human_gate"
    }

    fn priority(&self) -> i32 {
        60
    }

    fn evaluate(&self, intent: &ActionIntent) -> EvaluatorResult {
        if !self.requires_approval(intent) {
            return EvaluatorResult::new(Verdict::Allow, "No human approval required", self.name());
        }

        if self.callback.approve(intent) {
            EvaluatorResult::new(Verdict::Allow, "Approved by human reviewer", self.name())
        } else {
            EvaluatorResult::new(Verdict::Block, "Rejected by human reviewer", self.name())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct AlwaysReject;
    impl ApprovalCallback for AlwaysReject {
        fn approve(&self, _intent: &ActionIntent) -> bool {
            false
        }
    }

    #[test]
    fn skips_approval_when_not_triggered() {
        let gate = HumanGate::with_defaults();
        let intent = ActionIntent::new("file.read", "read_file", "agent-1", HashMap::new());
        assert_eq!(gate.evaluate(&intent).verdict, Verdict::Allow);
    }

    #[test]
    fn requires_approval_for_critical_risk() {
        let gate = HumanGate::new(
            HashSet::from([RiskLevel::Critical]),
            HashSet::new(),
            Arc::new(AlwaysReject),
        );
        let mut intent = ActionIntent::new("shell.exec", "run_shell", "agent-1", HashMap::new());
        intent.risk_level = RiskLevel::Critical;
        assert_eq!(gate.evaluate(&intent).verdict, Verdict::Block);
    }

    #[test]
    fn action_type_trigger_also_requires_approval() {
        let gate = HumanGate::new(
            HashSet::new(),
            HashSet::from(["shell.exec".to_string()]),
            Arc::new(AlwaysReject),
        );
        let intent = ActionIntent::new("shell.exec", "run_shell", "agent-1", HashMap::new());
        assert_eq!(gate.evaluate(&intent).verdict, Verdict::Block);
    }
}
