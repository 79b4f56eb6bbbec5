//! Folds the audit log into an aggregate [`GuardMetrics`] snapshot.

use crate::audit::AuditLog;
use crate::types::{GuardMetrics, Verdict};

/// Computes a [`GuardMetrics`] snapshot from an [`AuditLog`]. Stateless —
/// every call re-folds the full log, which is fine at the log's bounded
/// size but would need incremental accumulation at much higher volume.
#[derive(Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    pub fn collect(&self, log: &AuditLog) -> GuardMetrics {
        let entries = log.all();
        let mut metrics = GuardMetrics::default();

        let mut risk_sum = 0.0;
        let mut duration_sum: u128 = 0;

        for entry in &entries {
            metrics.total_actions += 1;
            match entry.verdict {
                Verdict::Allow => metrics.allowed_actions += 1,
                Verdict::Block => metrics.blocked_actions += 1,
                Verdict::Escalate => metrics.escalated_actions += 1,
                Verdict::Warn => metrics.warned_actions += 1,
                Verdict::Defer => metrics.deferred_actions += 1,
            }
            if entry.rolled_back {
                metrics.rollbacks += 1;
            }

            risk_sum += entry.risk_score;
            duration_sum += entry.duration_ms as u128;

            *metrics.actions_by_agent.entry(entry.agent_id.clone()).or_insert(0) += 1;
            *metrics.actions_by_type.entry(entry.action_type.clone()).or_insert(0) += 1;
            if let Some(policy) = &entry.policy_triggered {
                *metrics.verdicts_by_policy.entry(policy.clone()).or_insert(0) += 1;
            }
        }

        if !entries.is_empty() {
            metrics.avg_risk_score = risk_sum / entries.len() as f64;
            metrics.avg_duration_ms = duration_sum as f64 / entries.len() as f64;
        }

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuditEntry;
    use chrono::Utc;
    use std::collections::HashMap;

    fn entry(agent_id: &str, verdict: Verdict, risk_score: f64) -> AuditEntry {
        AuditEntry {
            action_id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            action_type: "file.read".to_string(),
            verdict,
            risk_score,
            task_id: None,
            policy_triggered: None,
            evaluator_results: Vec::new(),
            instruction_chain: Vec::new(),
            parameters: HashMap::new(),
            duration_ms: 10,
            timestamp: Utc::now(),
            rolled_back: false,
            error: None,
        }
    }

    #[test]
    fn aggregates_totals_and_averages() {
        let log = AuditLog::new(10);
        log.record(entry("agent-1", Verdict::Allow, 0.1));
        log.record(entry("agent-1", Verdict::Block, 0.9));

        let metrics = MetricsCollector::new().collect(&log);
        assert_eq!(metrics.total_actions, 2);
        assert_eq!(metrics.allowed_actions, 1);
        assert_eq!(metrics.blocked_actions, 1);
        assert_eq!(metrics.avg_risk_score, 0.5);
        assert_eq!(*metrics.actions_by_agent.get("agent-1").unwrap(), 2);
    }

    #[test]
    fn empty_log_has_zeroed_averages() {
        let log = AuditLog::new(10);
        let metrics = MetricsCollector::new().collect(&log);
        assert_eq!(metrics.avg_risk_score, 0.0);
    }
}
