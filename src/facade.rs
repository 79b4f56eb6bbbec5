//! The guard facade: wires every subsystem together and exposes the
//! single entry point most callers use — `Guard::protect`.
//!
//! The sequence mirrors the original's `_run_pipeline`: inject per-agent
//! metadata, check the delegation cascade, check the global budget,
//! evaluate the pipeline, and only then (if nothing blocked) snapshot and
//! execute. Bookkeeping — audit, metrics, cost recording, trust updates —
//! happens once, after the outcome is known either way.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::audit::AuditLog;
use crate::config::Config;
use crate::error::{ExecutionError, GuardError};
use crate::evaluators::{CostEstimator, Evaluator, HumanGate, PolicyEngine, RateLimiter, RiskScorer, SchemaValidator};
use crate::exporters::{Exporter, StdoutExporter};
use crate::gate::ExecutionGate;
use crate::metrics::MetricsCollector;
use crate::pipeline::{EvaluationPipeline, Position};
use crate::snapshot::{RollbackCoordinator, RollbackRegistry, Snapshot, SnapshotManager};
use crate::state::{AgentProfile, CascadeController, GlobalBudgetManager, TrustLedger};
use crate::types::{ActionIntent, ActionResult, AuditEntry, GuardMetrics, RollbackReport, Verdict};

/// Outcome of [`Guard::protect`] when evaluation did not block the
/// action.
/// The assembled guard. Cheap to clone (everything inside is `Arc`'d) so
/// it can be shared across tasks.
#[derive(Clone)]
pub struct Guard {
    pipeline: Arc<EvaluationPipeline>,
    rate_limiter: Arc<RateLimiter>,
    cost_estimator: Arc<CostEstimator>,
    trust_ledger: Arc<TrustLedger>,
    cascade: Arc<CascadeController>,
    budget: Arc<GlobalBudgetManager>,
    snapshots: Option<Arc<SnapshotManager>>,
    rollback_registry: Arc<RollbackRegistry>,
    rollback: Option<Arc<RollbackCoordinator>>,
    execution_gate: ExecutionGate,
    audit_log: Arc<AuditLog>,
    metrics: MetricsCollector,
    exporters: Vec<Arc<dyn Exporter>>,
}

impl Guard {
    /// Builds a guard from configuration. Rollback support is wired up
    /// only if `config.rollback.enabled`; callers that want it must use
    /// [`Guard::connect`] instead, since opening the snapshot store is
    /// async.
    pub fn new(config: Config) -> Result<Self, GuardError> {
        let (per_tool_limits, per_agent_limit) = config
            .rate_limits
            .parse()
            .map_err(GuardError::Config)?;
        let rate_limiter = Arc::new(RateLimiter::new(per_tool_limits, per_agent_limit));
        let cost_estimator = Arc::new(CostEstimator::new(
            config.cost.max_per_agent,
            config.cost.max_per_task,
            config.cost.single_action_escalation_threshold,
        ));
        let risk_scorer = RiskScorer::new(config.risk.max_risk_score);
        let trust_ledger = Arc::new(TrustLedger::new(config.trust.block_unknown_agents));
        for agent in &config.agents {
            let mut profile = AgentProfile::new(agent.agent_id.clone(), agent.trust_level);
            profile.can_delegate_to = agent.can_delegate_to.iter().cloned().collect();
            profile.max_actions_per_run = agent.max_actions_per_run;
            trust_ledger.register(profile);
        }

        let mut policy_engine = PolicyEngine::new();
        policy_engine
            .load_policies(config.policies.clone())
            .map_err(GuardError::Policy)?;

        let mut pipeline = EvaluationPipeline::new();
        pipeline.add(Box::new(SchemaValidator::new()), Position::ByPriority);
        pipeline.add(Box::new(policy_engine), Position::ByPriority);
        pipeline.add(Box::new(risk_scorer), Position::ByPriority);
        pipeline.add(Box::new(RateLimiterEvaluatorHandle(rate_limiter.clone())), Position::ByPriority);
        pipeline.add(Box::new(CostEstimatorEvaluatorHandle(cost_estimator.clone())), Position::ByPriority);
        pipeline.add(Box::new(HumanGate::with_defaults()), Position::ByPriority);

        Ok(Self {
            pipeline: Arc::new(pipeline),
            rate_limiter,
            cost_estimator,
            trust_ledger,
            cascade: Arc::new(CascadeController::new(
                config.cascade.max_depth,
                config.cascade.max_concurrent_per_orchestrator,
            )),
            budget: Arc::new(GlobalBudgetManager::new(config.budget.per_task_budget)),
            snapshots: None,
            rollback_registry: Arc::new(RollbackRegistry::new()),
            rollback: None,
            execution_gate: ExecutionGate::new(),
            audit_log: Arc::new(AuditLog::new(config.audit.capacity)),
            metrics: MetricsCollector::new(),
            exporters: vec![Arc::new(StdoutExporter::new())],
        })
    }

    /// Like [`Guard::new`], but also opens the durable snapshot store and
    /// wires rollback support when `config.rollback.enabled`. Handlers
    /// cannot be registered on the returned guard afterwards — use
    /// [`Guard::new`] followed by [`Guard::enable_rollback`] instead if you
    /// need to register handlers between construction and opening the
    /// store.
    #[cfg(feature = "sqlite")]
    pub async fn connect(config: Config) -> Result<Self, GuardError> {
        let rollback_enabled = config.rollback.enabled;
        let database_url = config.rollback.database_url.clone();
        let mut guard = Self::new(config)?;

        if rollback_enabled {
            guard.enable_rollback(&database_url).await?;
        }

        Ok(guard)
    }

    /// Opens the durable snapshot store and wires rollback support. Call
    /// this after registering any custom handlers via
    /// [`Guard::register_rollback_handler`] /
    /// [`Guard::register_rollback_handler_for_type`] — once this runs, the
    /// registry is shared with the rollback coordinator and can no longer
    /// be mutated through `Arc::get_mut`.
    #[cfg(feature = "sqlite")]
    pub async fn enable_rollback(&mut self, database_url: &str) -> Result<(), GuardError> {
        let manager = Arc::new(SnapshotManager::connect(database_url).await.map_err(GuardError::Rollback)?);
        self.snapshots = Some(manager.clone());
        self.rollback = Some(Arc::new(RollbackCoordinator::new(manager, self.rollback_registry.clone())));
        Ok(())
    }

    /// Registers a handler for an exact action type, taking precedence
    /// over glob-pattern handlers. Must be called before [`Guard::connect`]
    /// hands a clone of the registry to the rollback coordinator.
    pub fn register_rollback_handler_for_type(
        &mut self,
        action_type: impl Into<String>,
        handler: Arc<dyn crate::snapshot::RollbackHandler>,
    ) {
        Arc::get_mut(&mut self.rollback_registry)
            .expect("register rollback handlers before calling Guard::connect")
            .register_for_type(action_type, handler);
    }

    /// Registers a glob-pattern handler. See [`Self::register_rollback_handler_for_type`].
    pub fn register_rollback_handler(&mut self, handler: Arc<dyn crate::snapshot::RollbackHandler>) {
        Arc::get_mut(&mut self.rollback_registry)
            .expect("register rollback handlers before calling Guard::connect")
            .register(handler);
    }

    pub fn add_exporter(&mut self, exporter: Arc<dyn Exporter>) {
        self.exporters.push(exporter);
    }

    pub fn register_agent(&self, profile: AgentProfile) {
        self.trust_ledger.register(profile);
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }

    pub fn metrics(&self) -> GuardMetrics {
        self.metrics.collect(&self.audit_log)
    }

    fn inject_agent_metadata(&self, intent: &mut ActionIntent) {
        if let Some(profile) = self.trust_ledger.get(&intent.agent_id) {
            intent
                .metadata
                .insert("agent_error_rate".to_string(), JsonValue::from(profile.error_rate()));
            intent
                .metadata
                .insert("agent_violations".to_string(), JsonValue::from(profile.violation_count));
            intent
                .metadata
                .insert("agent_action_count".to_string(), JsonValue::from(profile.action_count));
        }
        let last_5min = self.rate_limiter.last_5min_count(&intent.agent_id);
        intent
            .metadata
            .insert("_rate_last_5min".to_string(), JsonValue::from(last_5min as u64));
    }

    fn worst_verdict(results: &[crate::types::EvaluatorResult]) -> Verdict {
        EvaluationPipeline::worst_result(results)
            .map(|r| r.verdict)
            .unwrap_or(Verdict::Allow)
    }

    async fn dispatch_exporters(&self, entry: &AuditEntry) {
        for exporter in &self.exporters {
            if let Err(err) = exporter.export(entry).await {
                tracing::warn!(exporter = exporter.name(), error = %err, "exporter failed");
            }
        }
    }

    /// Evaluates and, if permitted, executes `operation` for `intent`.
    /// Returns `Err` only for a blocking verdict or an infrastructure
    /// fault; a successfully executed action that itself failed is
    /// reported inside `Ok(ActionResult)` with `success: false`.
    pub async fn protect<F, Fut>(&self, mut intent: ActionIntent, operation: F) -> Result<ActionResult, GuardError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<JsonValue, anyhow::Error>>,
    {
        if self.trust_ledger.blocks_unknown() && !self.trust_ledger.is_registered(&intent.agent_id) {
            return Err(GuardError::Execution(ExecutionError::AgentNotRegistered(intent.agent_id.clone())));
        }

        self.inject_agent_metadata(&mut intent);

        if let Some(last_hop) = intent.instruction_chain.last().cloned() {
            let chain_without_current = &intent.instruction_chain[..intent.instruction_chain.len() - 1];
            if let Err(cascade_err) = self.cascade.check(chain_without_current, &last_hop.agent_id) {
                let execution_err = match cascade_err {
                    crate::state::CascadeError::DepthExceeded { depth, max_depth } => {
                        ExecutionError::CascadeDepthExceeded { depth, max_depth }
                    }
                    crate::state::CascadeError::CycleDetected { agent_id } => ExecutionError::CycleDetected { agent_id },
                    crate::state::CascadeError::ConcurrencyExceeded { .. } => {
                        ExecutionError::OperationFailed("delegation concurrency exceeded".to_string())
                    }
                };
                return Err(GuardError::Execution(execution_err));
            }
        }

        let task_id = intent.task_id.clone().unwrap_or_default();
        if !task_id.is_empty() {
            let budget_check = self.budget.check(&intent.agent_id, &task_id, intent.estimated_cost);
            if budget_check.verdict.is_blocking() {
                let entry = self.execution_gate.build_blocked_audit(&intent, budget_check.verdict, &budget_check.reason, None);
                self.audit_log.record(entry.clone());
                self.dispatch_exporters(&entry).await;
                self.trust_ledger.record_violation(&intent.agent_id);
                return Err(GuardError::Execution(ExecutionError::Blocked {
                    reason: budget_check.reason,
                }));
            }
        }

        let results = self.pipeline.evaluate(&intent);
        let verdict = Self::worst_verdict(&results);
        let policy_triggered = results
            .iter()
            .find_map(|r| r.metadata.get("policy_name").and_then(|v| v.as_str()).map(str::to_string));

        if verdict.is_blocking() {
            let reason = results
                .iter()
                .find(|r| r.verdict == verdict)
                .map(|r| r.reason.clone())
                .unwrap_or_else(|| "blocked".to_string());
            let entry = self.execution_gate.build_blocked_audit(&intent, verdict, &reason, policy_triggered);
            self.audit_log.record(entry.clone());
            self.dispatch_exporters(&entry).await;
            self.trust_ledger.record_violation(&intent.agent_id);

            return Err(GuardError::Execution(match verdict {
                Verdict::Block => ExecutionError::Blocked { reason },
                Verdict::Escalate => ExecutionError::Escalated { reason },
                Verdict::Defer => ExecutionError::Deferred { reason },
                _ => unreachable!("is_blocking() only returns true for Block/Escalate/Defer"),
            }));
        }

        if let Some(manager) = &self.snapshots {
            if let Some(handler) = self.rollback_registry.get_handler(&intent.action_type) {
                if let Ok(data) = handler.capture(&intent.action_type, &serde_json::to_value(&intent.parameters).unwrap_or(JsonValue::Null)).await {
                    let _ = manager
                        .capture(Snapshot {
                            action_id: intent.action_id.clone(),
                            action_type: intent.action_type.clone(),
                            agent_id: intent.agent_id.clone(),
                            data,
                            captured_at: chrono::Utc::now(),
                            expires_at: None,
                        })
                        .await;
                }
            }
        }

        let outcome = self.execution_gate.execute(operation).await;
        let entry = self.execution_gate.build_executed_audit(&intent, verdict, &outcome);
        self.audit_log.record(entry.clone());
        self.dispatch_exporters(&entry).await;

        self.trust_ledger.record_action(&intent.agent_id);
        if !outcome.success {
            self.trust_ledger.record_error(&intent.agent_id);
        }
        self.cost_estimator.record_cost(&intent.agent_id, &task_id, intent.estimated_cost);
        if !task_id.is_empty() {
            self.budget
                .register_action(&intent.agent_id, &task_id, &intent.action_id, intent.estimated_cost);
        }
        if let Some(rollback) = &self.rollback {
            rollback.record_action(&intent.action_id, &intent.action_type, &intent.agent_id, intent.task_id.clone());
        }

        Ok(ActionResult {
            action_id: intent.action_id,
            success: outcome.success,
            output: outcome.output,
            duration_ms: outcome.duration_ms,
            rolled_back: false,
            audit_entry: Some(entry),
            error: outcome.error,
        })
    }

    pub async fn rollback_action(&self, action_id: &str) -> Result<(), GuardError> {
        let rollback = self.rollback.as_ref().ok_or_else(|| {
            GuardError::Execution(ExecutionError::OperationFailed("rollback support is not enabled".to_string()))
        })?;
        rollback.rollback_action(action_id).await.map_err(GuardError::Rollback)
    }

    pub async fn rollback_last(&self, n: usize, agent_id: Option<&str>) -> RollbackReport {
        match &self.rollback {
            Some(rollback) => rollback.rollback_last(n, agent_id).await,
            None => RollbackReport::new("ad-hoc"),
        }
    }

    pub async fn rollback_task(&self, task_id: &str) -> RollbackReport {
        match &self.rollback {
            Some(rollback) => rollback.rollback_task(task_id).await,
            None => RollbackReport::new(task_id),
        }
    }
}

struct RateLimiterEvaluatorHandle(Arc<RateLimiter>);

impl Evaluator for RateLimiterEvaluatorHandle {
    fn name(&self) -> &str {
        self.0.name()
    }
    fn priority(&self) -> i32 {
        self.0.priority()
    }
    fn evaluate(&self, intent: &ActionIntent) -> crate::types::EvaluatorResult {
        self.0.evaluate(intent)
    }
}

struct CostEstimatorEvaluatorHandle(Arc<CostEstimator>);

impl Evaluator for CostEstimatorEvaluatorHandle {
    fn name(&self) -> &str {
        self.0.name()
    }
    fn priority(&self) -> i32 {
        self.0.priority()
    }
    fn evaluate(&self, intent: &ActionIntent) -> crate::types::EvaluatorResult {
        self.0.evaluate(intent)
    }
}
