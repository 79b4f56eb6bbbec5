//! Error taxonomy. Blocking verdicts are never represented as `Err` — a
//! refused action is an `Ok(EvaluatorResult)` carrying a blocking
//! [`crate::types::Verdict`]. These types cover genuine failures: malformed
//! configuration, a policy condition that could not be parsed, an
//! execution that raised, or a rollback/infrastructure fault.

use thiserror::Error;

/// Errors raised while loading or validating guard configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised while compiling or evaluating a policy condition.
///
/// `ParseError` happens once, at policy load time, and is fatal to loading
/// that policy. `ConditionError` happens per-evaluation and is caught by
/// the policy engine: the policy that raised it simply did not trigger.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid condition syntax in {policy:?}: {source}")]
    ParseError {
        policy: String,
        #[source]
        source: crate::dsl::ParseError,
    },

    #[error("condition evaluation error: {0}")]
    ConditionError(String),
}

/// Errors surfaced when a guarded action cannot proceed or fails.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("action blocked: {reason}")]
    Blocked { reason: String },

    #[error("action escalated: {reason}")]
    Escalated { reason: String },

    #[error("action deferred: {reason}")]
    Deferred { reason: String },

    #[error("agent '{agent_id}' violated trust constraints: {reason}")]
    TrustViolation { agent_id: String, reason: String },

    #[error("delegation cascade depth exceeded: {depth} > {max_depth}")]
    CascadeDepthExceeded { depth: usize, max_depth: usize },

    #[error("delegation cycle detected for agent '{agent_id}'")]
    CycleDetected { agent_id: String },

    #[error("agent '{0}' is not registered")]
    AgentNotRegistered(String),

    #[error("the guarded operation failed: {0}")]
    OperationFailed(String),
}

/// Errors surfaced by the rollback subsystem. These never propagate out of
/// `RollbackCoordinator` — they are converted into a `false`/skipped
/// outcome and logged, since a failed rollback must not itself crash the
/// caller.
#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("no snapshot found for action '{0}'")]
    SnapshotNotFound(String),

    #[error("no rollback handler registered for action type '{0}'")]
    HandlerNotFound(String),

    #[error("rollback handler failed for action '{action_id}': {source}")]
    HandlerFailed {
        action_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("snapshot store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Errors from components on the edges of the system — exporters and the
/// snapshot backing store — that must be logged and isolated rather than
/// allowed to take down evaluation.
#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("exporter '{name}' failed: {source}")]
    Exporter {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("audit log error: {0}")]
    AuditLog(String),
}

/// Top-level error type returned by the [`crate::facade::Guard`] for
/// everything that is not itself a verdict.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Rollback(#[from] RollbackError),

    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
}
