//! Bounded, queryable log of every evaluated action.

use std::collections::VecDeque;

use parking_lot::RwLock;

use crate::types::{AuditEntry, AuditFilter};

const DEFAULT_CAPACITY: usize = 10_000;

/// A fixed-capacity FIFO ring buffer of [`AuditEntry`] values. Once full,
/// the oldest entry is dropped to make room for the newest — the audit
/// log trades unbounded retention for a bounded memory footprint, and is
/// not a substitute for exporting to durable storage via an exporter.
pub struct AuditLog {
    capacity: usize,
    entries: RwLock<VecDeque<AuditEntry>>,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn record(&self, entry: AuditEntry) {
        let mut entries = self.entries.write();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns entries matching `filter`, most recent first, capped at
    /// `filter.limit`.
    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        let entries = self.entries.read();
        entries
            .iter()
            .rev()
            .filter(|e| filter.agent_id.as_deref().is_none_or(|a| e.agent_id == a))
            .filter(|e| filter.task_id.is_none() || e.task_id == filter.task_id)
            .filter(|e| filter.verdict.is_none_or(|v| e.verdict == v))
            .filter(|e| filter.action_type.as_deref().is_none_or(|t| e.action_type == t))
            .filter(|e| filter.from_time.is_none_or(|from| e.timestamp >= from))
            .filter(|e| filter.to_time.is_none_or(|to| e.timestamp <= to))
            .take(filter.limit)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<AuditEntry> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Verdict;
    use chrono::Utc;
    use std::collections::HashMap;

    fn entry(agent_id: &str, verdict: Verdict) -> AuditEntry {
        AuditEntry {
            action_id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            action_type: "file.read".to_string(),
            verdict,
            risk_score: 0.1,
            task_id: None,
            policy_triggered: None,
            evaluator_results: Vec::new(),
            instruction_chain: Vec::new(),
            parameters: HashMap::new(),
            duration_ms: 5,
            timestamp: Utc::now(),
            rolled_back: false,
            error: None,
        }
    }

    #[test]
    fn drops_oldest_entry_once_capacity_is_reached() {
        let log = AuditLog::new(2);
        log.record(entry("agent-1", Verdict::Allow));
        log.record(entry("agent-2", Verdict::Allow));
        log.record(entry("agent-3", Verdict::Allow));
        assert_eq!(log.len(), 2);
        let all = log.all();
        assert!(all.iter().all(|e| e.agent_id != "agent-1"));
    }

    #[test]
    fn query_filters_by_agent_and_verdict() {
        let log = AuditLog::new(10);
        log.record(entry("agent-1", Verdict::Allow));
        log.record(entry("agent-1", Verdict::Block));
        log.record(entry("agent-2", Verdict::Block));

        let mut filter = AuditFilter::new();
        filter.agent_id = Some("agent-1".to_string());
        filter.verdict = Some(Verdict::Block);

        let results = log.query(&filter);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].agent_id, "agent-1");
    }
}
