//! Always-available exporter that logs audit entries through `tracing`.

use async_trait::async_trait;

use crate::error::InfrastructureError;
use crate::types::AuditEntry;

use super::Exporter;

/// Writes each audit entry as a structured `tracing` event. Useful as a
/// default and in tests; production deployments typically add a durable
/// exporter alongside it rather than instead of it.
pub struct StdoutExporter;

impl StdoutExporter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StdoutExporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Exporter for StdoutExporter {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn export(&self, entry: &AuditEntry) -> Result<(), InfrastructureError> {
        tracing::info!(
            action_id = %entry.action_id,
            agent_id = %entry.agent_id,
            action_type = %entry.action_type,
            verdict = %entry.verdict,
            duration_ms = entry.duration_ms,
            "action audited"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    #[tokio::test]
    async fn export_never_fails() {
        let exporter = StdoutExporter::new();
        let entry = AuditEntry {
            action_id: "a1".to_string(),
            agent_id: "agent-1".to_string(),
            action_type: "file.read".to_string(),
            verdict: crate::types::Verdict::Allow,
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
        };
        assert!(exporter.export(&entry).await.is_ok());
    }
}
