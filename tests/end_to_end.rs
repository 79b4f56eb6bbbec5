//! End-to-end scenarios and cross-cutting properties run through the
//! public `Guard` facade and the subsystems it wires together.

use std::collections::HashMap;

use actionguard::config::Config;
use actionguard::evaluators::{Policy, PolicyEngine};
use actionguard::types::{ActionIntent, EvaluatorResult, Verdict};
use actionguard::{Guard, GuardError};

fn block_system_path_policy() -> Policy {
    serde_yaml::from_str(
        r#"
name: block-etc
action_types: ["file.*"]
condition: "parameters.path.startswith(\"/etc\")"
verdict: BLOCK
message: "refusing to touch system paths"
"#,
    )
    .unwrap()
}

fn unregistered_config() -> Config {
    let mut config = Config::default();
    config.trust.block_unknown_agents = false;
    config
}

fn intent_with_path(action_type: &str, agent_id: &str, path: &str) -> ActionIntent {
    let mut params = HashMap::new();
    params.insert("path".to_string(), serde_json::json!(path));
    ActionIntent::new(action_type, "fs_tool", agent_id, params)
}

// Scenario 1: block on system path.
#[tokio::test]
async fn blocks_write_to_system_path() {
    let mut config = unregistered_config();
    config.policies = vec![block_system_path_policy()];
    let guard = Guard::new(config).unwrap();

    let intent = intent_with_path("file.delete", "agent-1", "/etc/passwd");
    let result = guard.protect(intent, || async { Ok(serde_json::Value::Null) }).await;

    assert!(matches!(result, Err(GuardError::Execution(_))));
    assert_eq!(guard.audit_log().len(), 1);
    let entry = guard.audit_log().all().into_iter().next().unwrap();
    assert_eq!(entry.verdict, Verdict::Block);
    assert_eq!(entry.policy_triggered.as_deref(), Some("block-etc"));
}

// Scenario 2: rate limit throttles the 4th call.
#[tokio::test]
async fn rate_limit_throttles_fourth_call() {
    let mut config = unregistered_config();
    config.rate_limits.per_tool.insert("fs_tool".to_string(), "3/minute".to_string());
    let guard = Guard::new(config).unwrap();

    let mut outcomes = Vec::new();
    for i in 0..5 {
        let intent = intent_with_path("file.read", "agent-1", &format!("/tmp/f{i}"));
        outcomes.push(guard.protect(intent, || async { Ok(serde_json::Value::Null) }).await);
    }

    assert!(outcomes[0].is_ok());
    assert!(outcomes[1].is_ok());
    assert!(outcomes[2].is_ok());
    assert!(outcomes[3].is_err());
    assert!(outcomes[4].is_err());

    if let Err(GuardError::Execution(err)) = &outcomes[3] {
        let message = err.to_string();
        assert!(message.contains('3'));
    } else {
        panic!("expected the 4th call to be blocked");
    }
}

// Scenario 3: task budget blocks gaming once projected spend exceeds the
// per-task ceiling.
#[tokio::test]
async fn task_budget_blocks_once_exhausted() {
    let mut config = unregistered_config();
    config.budget.per_task_budget = 1.00;
    let guard = Guard::new(config).unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..5 {
        let mut intent = intent_with_path("db.query", "agent-1", "n/a");
        intent.estimated_cost = 0.30;
        intent.task_id = Some("T".to_string());
        outcomes.push(guard.protect(intent, || async { Ok(serde_json::Value::Null) }).await);
    }

    assert!(outcomes[0].is_ok());
    assert!(outcomes[1].is_ok());
    assert!(outcomes[2].is_ok());
    assert!(outcomes[3].is_err());
    assert!(outcomes[4].is_err());
}

// Scenario 5: dry-run reports every matching policy without affecting
// state, while ordinary evaluation short-circuits on the first BLOCK.
#[test]
fn dry_run_reports_all_matching_policies() {
    let block: Policy = serde_yaml::from_str(
        "name: p-block\naction_types: [\"file.*\"]\nverdict: BLOCK\npriority: 10\n",
    )
    .unwrap();
    let escalate: Policy = serde_yaml::from_str(
        "name: p-escalate\naction_types: [\"file.*\"]\nverdict: ESCALATE\npriority: 20\n",
    )
    .unwrap();
    let warn: Policy = serde_yaml::from_str(
        "name: p-warn\naction_types: [\"file.*\"]\nverdict: WARN\npriority: 30\n",
    )
    .unwrap();

    let mut engine = PolicyEngine::new();
    engine.load_policies(vec![block, escalate, warn]).unwrap();

    let intent = intent_with_path("file.write", "agent-1", "/tmp/x");
    let dry_run = engine.dry_run(&intent, 0);
    assert_eq!(dry_run.matched_policies.len(), 3);
    assert!(dry_run.would_block);

    use actionguard::evaluators::Evaluator;
    let result = engine.evaluate(&intent);
    assert_eq!(result.verdict, Verdict::Block);
    assert_eq!(result.metadata["policy_name"], serde_json::json!("p-block"));
}

// Scenario 6: cycle detected across a delegation chain, never reaching
// the policy engine because cascade runs before the pipeline.
#[tokio::test]
async fn cycle_in_delegation_chain_blocks_before_policy_engine() {
    use actionguard::types::AgentCall;
    use chrono::Utc;

    let config = unregistered_config();
    let guard = Guard::new(config).unwrap();

    let hop = |agent_id: &str| AgentCall {
        agent_id: agent_id.to_string(),
        trust_level: 0.5,
        instruction: "delegate".to_string(),
        timestamp: Utc::now(),
    };

    let mut intent = intent_with_path("file.read", "B", "/tmp/x");
    intent.instruction_chain = vec![hop("O"), hop("A"), hop("O")];

    let result = guard.protect(intent, || async { Ok(serde_json::Value::Null) }).await;
    match result {
        Err(GuardError::Execution(err)) => assert!(err.to_string().contains("cycle")),
        other => panic!("expected a cascade cycle error, got {other:?}"),
    }
    // The cascade check short-circuits before any audit entry is written,
    // since it runs before the pipeline and before the execution gate.
    assert_eq!(guard.audit_log().len(), 0);
}

// Testable property: verdict monotonicity — order of evaluator results
// doesn't change the pipeline's chosen worst verdict.
#[test]
fn worst_result_is_order_independent() {
    use actionguard::pipeline::EvaluationPipeline;

    let a = EvaluatorResult::new(Verdict::Warn, "warn", "eval-a");
    let b = EvaluatorResult::new(Verdict::Block, "block", "eval-b");

    let forward = EvaluationPipeline::worst_result(&[a.clone(), b.clone()]).unwrap();
    let backward = EvaluationPipeline::worst_result(&[b, a]).unwrap();
    assert_eq!(forward.verdict, Verdict::Block);
    assert_eq!(backward.verdict, Verdict::Block);
}

// Testable property: audit completeness across concurrent calls with
// distinct action_ids.
#[tokio::test]
async fn audit_log_has_one_entry_per_concurrent_call() {
    let guard = Guard::new(unregistered_config()).unwrap();
    let mut handles = Vec::new();
    for i in 0..20 {
        let guard = guard.clone();
        handles.push(tokio::spawn(async move {
            let intent = intent_with_path("file.read", "agent-1", &format!("/tmp/{i}"));
            guard.protect(intent, || async { Ok(serde_json::Value::Null) }).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let entries = guard.audit_log().all();
    assert_eq!(entries.len(), 20);
    let mut ids: Vec<_> = entries.iter().map(|e| e.action_id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 20);
}

// Testable property: budget monotonicity and the recredit invariant.
#[test]
fn budget_recredit_restores_prior_spend() {
    use actionguard::state::GlobalBudgetManager;

    let budget = GlobalBudgetManager::new(100.0);
    let before = budget.task_spend("T");
    budget.register_action("agent-1", "T", "a1", 10.0);
    assert!(budget.task_spend("T") > before);

    budget.recredit("T", "a1");
    assert_eq!(budget.task_spend("T"), before);
}

// Testable property: parameter sanitization never leaks sensitive values
// into an audit entry.
#[tokio::test]
async fn sensitive_parameters_are_redacted_in_audit_entry() {
    let guard = Guard::new(unregistered_config()).unwrap();
    let mut params = HashMap::new();
    params.insert("password".to_string(), serde_json::json!("hunter2"));
    params.insert("note".to_string(), serde_json::json!("ok"));
    let intent = ActionIntent::new("file.read", "fs_tool", "agent-1", params);

    guard.protect(intent, || async { Ok(serde_json::Value::Null) }).await.unwrap();

    let entry = guard.audit_log().all().into_iter().next().unwrap();
    assert_eq!(entry.parameters["password"], serde_json::json!("***REDACTED***"));
    assert_eq!(entry.parameters["note"], serde_json::json!("ok"));
}

// Testable property: condition compiler safety — forbidden constructs
// fail to compile; valid expressions compile and evaluate deterministically.
#[test]
fn condition_compiler_rejects_forbidden_syntax() {
    use actionguard::dsl::CompiledCondition;

    for forbidden in [
        "def f(): pass",
        "parameters.path = 1",
        "import os",
        "[x for x in parameters]",
        "{1, 2, 3}",
    ] {
        assert!(
            CompiledCondition::new(forbidden).is_err(),
            "expected {forbidden:?} to fail to compile"
        );
    }
}

#[test]
fn condition_compiler_evaluates_valid_expressions_deterministically() {
    use actionguard::dsl::{CompiledCondition, EvalContext, Value};

    let mut ctx = EvalContext::new();
    ctx.set("estimated_cost", Value::Num(12.5));

    let cond = CompiledCondition::new("estimated_cost > 10").unwrap();
    assert_eq!(cond.evaluate(&ctx).unwrap(), cond.evaluate(&ctx).unwrap());
    assert!(cond.evaluate(&ctx).unwrap());
}

// Testable property: rate-limit bound never exceeded within the window.
#[tokio::test]
async fn rate_limit_never_exceeds_k_within_window() {
    let mut per_tool = HashMap::new();
    per_tool.insert("fs_tool".to_string(), "3/minute".to_string());
    let mut config = unregistered_config();
    config.rate_limits.per_tool = per_tool;
    let guard = Guard::new(config).unwrap();

    let mut allowed = 0;
    for i in 0..10 {
        let intent = intent_with_path("file.read", "agent-1", &format!("/tmp/{i}"));
        if guard.protect(intent, || async { Ok(serde_json::Value::Null) }).await.is_ok() {
            allowed += 1;
        }
    }
    assert!(allowed <= 3);
}
