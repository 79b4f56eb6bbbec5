//! Orchestrates undoing one or more previously executed actions: looks up
//! the snapshot, resolves a handler, restores, and removes the snapshot on
//! success.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::RollbackError;
use crate::types::RollbackReport;

use super::handler::{RollbackRegistry, Snapshot};
use super::manager::SnapshotManager;

/// One row of the coordinator's internal action log, used to resolve
/// `rollback_last`/`rollback_task` without re-querying every snapshot.
#[derive(Debug, Clone)]
struct ActionLogEntry {
    action_id: String,
    action_type: String,
    agent_id: String,
    task_id: Option<String>,
    rolled_back: bool,
}

/// Coordinates rollback of individual actions or whole tasks.
pub struct RollbackCoordinator {
    pub(crate) manager: Arc<SnapshotManager>,
    registry: Arc<RollbackRegistry>,
    action_log: Mutex<Vec<ActionLogEntry>>,
}

impl RollbackCoordinator {
    pub fn new(manager: Arc<SnapshotManager>, registry: Arc<RollbackRegistry>) -> Self {
        Self {
            manager,
            registry,
            action_log: Mutex::new(Vec::new()),
        }
    }

    /// Records a successfully executed action so it becomes a candidate
    /// for `rollback_last`/`rollback_task`. Called by the facade after a
    /// successful (non-blocked) execution, not during evaluation.
    pub fn record_action(&self, action_id: &str, action_type: &str, agent_id: &str, task_id: Option<String>) {
        self.action_log.lock().push(ActionLogEntry {
            action_id: action_id.to_string(),
            action_type: action_type.to_string(),
            agent_id: agent_id.to_string(),
            task_id,
            rolled_back: false,
        });
    }

    async fn restore_one(&self, snapshot: &Snapshot) -> Result<(), RollbackError> {
        let handler = self
            .registry
            .get_handler(&snapshot.action_type)
            .ok_or_else(|| RollbackError::HandlerNotFound(snapshot.action_type.clone()))?;
        handler.restore(snapshot).await?;
        self.manager.mark_restored(&snapshot.action_id).await?;
        self.manager.remove(&snapshot.action_id).await?;
        Ok(())
    }

    /// Rolls back a single action by ID.
    pub async fn rollback_action(&self, action_id: &str) -> Result<(), RollbackError> {
        let snapshot = self.manager.get(action_id).await?;
        self.restore_one(&snapshot).await?;
        let mut log = self.action_log.lock();
        if let Some(entry) = log.iter_mut().find(|e| e.action_id == action_id) {
            entry.rolled_back = true;
        }
        Ok(())
    }

    /// Rolls back the last `n` recorded actions (optionally scoped to one
    /// agent), most recent first. Best-effort: continues past individual
    /// failures and returns how many succeeded.
    pub async fn rollback_last(&self, n: usize, agent_id: Option<&str>) -> RollbackReport {
        let candidates: Vec<String> = {
            let log = self.action_log.lock();
            log.iter()
                .rev()
                .filter(|e| !e.rolled_back)
                .filter(|e| agent_id.is_none_or(|a| e.agent_id == a))
                .take(n)
                .map(|e| e.action_id.clone())
                .collect()
        };

        let mut report = RollbackReport::new("ad-hoc");
        report.total_actions = candidates.len();
        for action_id in candidates {
            match self.rollback_action(&action_id).await {
                Ok(()) => report.rolled_back.push(action_id),
                Err(_) => report.failed.push(action_id),
            }
        }
        report
    }

    /// Rolls back every recorded, not-yet-rolled-back action for a task,
    /// most recent first, across all agents. Actions with no handler are
    /// skipped rather than counted as failures.
    pub async fn rollback_task(&self, task_id: &str) -> RollbackReport {
        let candidates: Vec<ActionLogEntry> = {
            let log = self.action_log.lock();
            log.iter()
                .rev()
                .filter(|e| e.task_id.as_deref() == Some(task_id))
                .filter(|e| !e.rolled_back)
                .cloned()
                .collect()
        };

        let mut report = RollbackReport::new(task_id);
        report.total_actions = candidates.len();

        for entry in candidates {
            if !self.registry.has_handler(&entry.action_type) {
                report.skipped.push(entry.action_id);
                continue;
            }
            match self.rollback_action(&entry.action_id).await {
                Ok(()) => report.rolled_back.push(entry.action_id),
                Err(_) => report.failed.push(entry.action_id),
            }
        }

        report
    }
}
