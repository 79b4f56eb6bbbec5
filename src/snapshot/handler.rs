//! Rollback handler contract and the registry that resolves a handler for
//! a given action type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::error::RollbackError;

/// Captured pre-action state, persisted by [`crate::snapshot::SnapshotManager`]
/// and handed back to a handler's `restore` on rollback.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub action_id: String,
    pub action_type: String,
    pub agent_id: String,
    pub data: JsonValue,
    pub captured_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A pluggable strategy for capturing and restoring the state touched by
/// one family of action types.
#[async_trait]
pub trait RollbackHandler: Send + Sync {
    /// Action-type glob patterns this handler owns, e.g. `["file.*"]`.
    fn action_types(&self) -> &[String];

    /// Captures whatever state is needed to undo `action_type` with
    /// `parameters`, returned as opaque JSON for the snapshot store.
    async fn capture(&self, action_type: &str, parameters: &JsonValue) -> Result<JsonValue, RollbackError>;

    /// Restores state from a previously captured snapshot.
    async fn restore(&self, snapshot: &Snapshot) -> Result<(), RollbackError>;

    /// Default glob match against [`Self::action_types`]; handlers with
    /// unusual matching needs may override this.
    fn can_handle(&self, action_type: &str) -> bool {
        self.action_types().iter().any(|pattern| glob_match(pattern, action_type))
    }
}

fn glob_match(pattern: &str, value: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        value.starts_with(prefix)
    } else {
        pattern == value
    }
}

/// Resolves a [`RollbackHandler`] for an action type. Handlers registered
/// for an exact action type via [`Self::register_for_type`] take
/// precedence over glob-pattern handlers registered via [`Self::register`].
#[derive(Default)]
pub struct RollbackRegistry {
    exact: std::collections::HashMap<String, std::sync::Arc<dyn RollbackHandler>>,
    patterned: Vec<std::sync::Arc<dyn RollbackHandler>>,
}

impl RollbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: std::sync::Arc<dyn RollbackHandler>) {
        self.patterned.push(handler);
    }

    pub fn register_for_type(&mut self, action_type: impl Into<String>, handler: std::sync::Arc<dyn RollbackHandler>) {
        self.exact.insert(action_type.into(), handler);
    }

    pub fn has_handler(&self, action_type: &str) -> bool {
        self.exact.contains_key(action_type) || self.patterned.iter().any(|h| h.can_handle(action_type))
    }

    pub fn get_handler(&self, action_type: &str) -> Option<std::sync::Arc<dyn RollbackHandler>> {
        if let Some(handler) = self.exact.get(action_type) {
            return Some(handler.clone());
        }
        self.patterned.iter().find(|h| h.can_handle(action_type)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler {
        types: Vec<String>,
    }

    #[async_trait]
    impl RollbackHandler for NoopHandler {
        fn action_types(&self) -> &[String] {
            &self.types
        }
        async fn capture(&self, _action_type: &str, _parameters: &JsonValue) -> Result<JsonValue, RollbackError> {
            Ok(JsonValue::Null)
        }
        async fn restore(&self, _snapshot: &Snapshot) -> Result<(), RollbackError> {
            Ok(())
        }
    }

    #[test]
    fn exact_registration_beats_glob_pattern() {
        let mut registry = RollbackRegistry::new();
        registry.register(std::sync::Arc::new(NoopHandler { types: vec!["file.*".to_string()] }));
        registry.register_for_type("file.delete", std::sync::Arc::new(NoopHandler { types: vec!["file.delete".to_string()] }));

        assert!(registry.has_handler("file.delete"));
        assert!(registry.has_handler("file.write"));
    }

    #[test]
    fn no_handler_found_for_unregistered_type() {
        let registry = RollbackRegistry::new();
        assert!(!registry.has_handler("shell.exec"));
        assert!(registry.get_handler("shell.exec").is_none());
    }
}
