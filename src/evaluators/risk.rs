//! Dynamic risk scoring: a weighted combination of five signals mapped to
//! a verdict threshold.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::types::{ActionIntent, EvaluatorResult, Verdict};

use super::Evaluator;

const WEIGHT_ACTION_TYPE: f64 = 0.30;
const WEIGHT_PARAM_SENSITIVITY: f64 = 0.25;
const WEIGHT_BLAST_RADIUS: f64 = 0.15;
const WEIGHT_AGENT_HISTORY: f64 = 0.15;
const WEIGHT_CONTEXT_ALIGNMENT: f64 = 0.15;

const MAX_SCAN_DEPTH: usize = 5;

fn action_base_risk() -> &'static HashMap<&'static str, f64> {
    use once_cell::sync::Lazy;
    static MAP: Lazy<HashMap<&str, f64>> = Lazy::new(|| {
        HashMap::from([
            ("file.read", 0.1),
            ("db.select", 0.1),
            ("http.get", 0.1),
            ("db.query", 0.1),
            ("file.create", 0.3),
            ("db.insert", 0.3),
            ("http.post", 0.3),
            ("email.send", 0.3),
            ("file.write", 0.5),
            ("db.update", 0.5),
            ("http.put", 0.5),
            ("http.patch", 0.5),
            ("file.delete", 0.8),
            ("db.delete", 0.8),
            ("http.delete", 0.8),
            ("shell.exec", 0.9),
            ("code.exec", 0.9),
            ("system.exec", 0.9),
        ])
    });
    &MAP
}

fn category_base_risk() -> &'static HashMap<&'static str, f64> {
    use once_cell::sync::Lazy;
    static MAP: Lazy<HashMap<&str, f64>> = Lazy::new(|| {
        HashMap::from([
            ("read", 0.1),
            ("get", 0.1),
            ("query", 0.1),
            ("select", 0.1),
            ("create", 0.3),
            ("post", 0.3),
            ("insert", 0.3),
            ("send", 0.3),
            ("write", 0.5),
            ("update", 0.5),
            ("put", 0.5),
            ("patch", 0.5),
            ("delete", 0.8),
            ("destroy", 0.8),
            ("remove", 0.8),
            ("exec", 0.9),
            ("execute", 0.9),
            ("shell", 0.9),
            ("run", 0.9),
        ])
    });
    &MAP
}

const SENSITIVE_WORDS: &[&str] = &[
    "password",
    "secret",
    "token",
    "api_key",
    "apikey",
    "credential",
    "private_key",
];

const SYSTEM_PATH_PREFIXES: &[&str] = &[
    "/etc/",
    "/sys/",
    "/proc/",
    "/boot/",
    "/root/",
    "/var/log/",
    "/usr/sbin/",
    "C:\\Windows\\",
];

/// Computes a risk score in `[0.0, 1.0]` for an intent and maps it to a
/// verdict via fixed thresholds. See `spec.md` §4.3 for the weighting.
pub struct RiskScorer {
    max_risk_score: f64,
}

impl RiskScorer {
    pub fn new(max_risk_score: f64) -> Self {
        Self { max_risk_score }
    }

    fn score_action_type(&self, action_type: &str) -> f64 {
        if let Some(score) = action_base_risk().get(action_type) {
            return *score;
        }
        for part in action_type.to_lowercase().split('.').rev() {
            if let Some(score) = category_base_risk().get(part) {
                return *score;
            }
        }
        0.3
    }

    fn score_parameter_sensitivity(&self, params: &HashMap<String, JsonValue>) -> f64 {
        fn scan(value: &JsonValue, depth: usize, score: &mut f64) {
            if depth > MAX_SCAN_DEPTH {
                return;
            }
            match value {
                JsonValue::String(s) => {
                    let lower = s.to_lowercase();
                    if SENSITIVE_WORDS.iter().any(|w| lower.contains(w))
                        || crate::dsl::contains_pii(&crate::dsl::Value::from(value))
                    {
                        *score = (*score + 0.1_f64).min(0.3);
                    }
                    if SYSTEM_PATH_PREFIXES.iter().any(|p| s.starts_with(p)) {
                        *score = (*score + 0.15_f64).min(0.3);
                    }
                }
                JsonValue::Object(map) => {
                    for (k, v) in map {
                        let lower = k.to_lowercase();
                        if SENSITIVE_WORDS.iter().any(|w| lower.contains(w)) {
                            *score = (*score + 0.1_f64).min(0.3);
                        }
                        scan(v, depth + 1, score);
                    }
                }
                JsonValue::Array(items) => {
                    for item in items {
                        scan(item, depth + 1, score);
                    }
                }
                _ => {}
            }
        }

        let mut score = 0.0;
        for v in params.values() {
            scan(v, 0, &mut score);
        }
        score.min(0.3)
    }

    fn score_blast_radius(&self, intent: &ActionIntent) -> f64 {
        let mut score = 0.0;
        for value in intent.parameters.values() {
            match value {
                JsonValue::String(s) => {
                    if s.contains('*') || s.contains('%') {
                        score += 0.1;
                    }
                    if s == "all" || s == "ALL" || s == "*" {
                        score += 0.15;
                    }
                }
                JsonValue::Array(items) if items.len() > 10 => score += 0.1,
                _ => {}
            }
        }
        let lower = intent.action_type.to_lowercase();
        if ["delete", "destroy", "drop", "truncate"].iter().any(|kw| lower.contains(kw)) {
            score += 0.1;
        }
        score.min(0.2)
    }

    fn score_agent_history(&self, intent: &ActionIntent) -> f64 {
        let error_rate = intent
            .metadata
            .get("agent_error_rate")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        let violations = intent
            .metadata
            .get("agent_violations")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        (error_rate * 0.1 + (violations * 0.05).min(0.1)).min(0.2)
    }

    fn score_context_alignment(&self, intent: &ActionIntent) -> f64 {
        if intent.task_context.is_empty() {
            return 0.1;
        }
        let mut action_words: std::collections::HashSet<String> = intent
            .action_type
            .to_lowercase()
            .replace('.', " ")
            .split_whitespace()
            .map(str::to_string)
            .collect();
        action_words.extend(
            intent
                .tool_name
                .to_lowercase()
                .replace('_', " ")
                .split_whitespace()
                .map(str::to_string),
        );
        let context_words: std::collections::HashSet<String> = intent
            .task_context
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        if action_words.is_empty() || context_words.is_empty() {
            return 0.1;
        }
        if action_words.intersection(&context_words).next().is_some() {
            0.0
        } else {
            0.1
        }
    }

    pub fn compute_score(&self, intent: &ActionIntent) -> f64 {
        let s1 = self.score_action_type(&intent.action_type);
        let s2 = self.score_parameter_sensitivity(&intent.parameters);
        let s3 = self.score_blast_radius(intent);
        let s4 = self.score_agent_history(intent);
        let s5 = self.score_context_alignment(intent);

        let raw = s1 * WEIGHT_ACTION_TYPE
            + s2 * WEIGHT_PARAM_SENSITIVITY
            + s3 * WEIGHT_BLAST_RADIUS
            + s4 * WEIGHT_AGENT_HISTORY
            + s5 * WEIGHT_CONTEXT_ALIGNMENT;

        (raw * 10000.0).round() / 10000.0
    }

    fn score_to_verdict(&self, score: f64) -> (Verdict, &'static str) {
        if score >= self.max_risk_score {
            (Verdict::Block, "Risk score exceeds configured ceiling")
        } else if score >= 0.8 {
            (Verdict::Block, "Risk score exceeds critical threshold")
        } else if score >= 0.6 {
            (Verdict::Escalate, "Risk score is high \u{2014} requires approval")
        } else if score >= 0.3 {
            (Verdict::Warn, "Risk score is elevated")
        } else {
            (Verdict::Allow, "Risk score is within acceptable range")
        }
    }
}

impl Evaluator for RiskScorer {
    fn name(&self) -> &str {
        "risk_scorer"
    }

    fn priority(&self) -> i32 {
        30
    }

    fn evaluate(&self, intent: &ActionIntent) -> EvaluatorResult {
        let score = self.compute_score(intent);
        let (verdict, reason) = self.score_to_verdict(score);
        EvaluatorResult::new(verdict, format!("{reason} (score={score:.2})"), self.name())
            .with_metadata("risk_score", serde_json::json!(score))
    }
}
