//! Guard configuration: loaded from YAML, validated, and used to wire up
//! the facade's evaluators and state.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::evaluators::{Policy, RateLimit};

/// Top-level configuration document, typically loaded from
/// `actionguard.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    #[serde(default)]
    pub cost: CostConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub trust: TrustConfig,
    #[serde(default)]
    pub cascade: CascadeConfig,
    #[serde(default)]
    pub rollback: RollbackConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub policies: Vec<Policy>,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RiskConfig {
    #[serde(default = "default_max_risk_score")]
    pub max_risk_score: f64,
}

fn default_max_risk_score() -> f64 {
    0.8
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_risk_score: default_max_risk_score(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Rate limit specs like `"10/minute"`, keyed by tool name or glob
    /// pattern (e.g. `"db.*"`).
    #[serde(default)]
    pub per_tool: HashMap<String, String>,
    #[serde(default)]
    pub per_agent: Option<String>,
}

impl RateLimitConfig {
    pub fn parse(&self) -> Result<(HashMap<String, RateLimit>, Option<RateLimit>), ConfigError> {
        let per_tool = self
            .per_tool
            .iter()
            .map(|(k, v)| RateLimit::from_string(v).map(|limit| (k.clone(), limit)))
            .collect::<Result<HashMap<_, _>, String>>()
            .map_err(ConfigError::Invalid)?;
        let per_agent = self
            .per_agent
            .as_ref()
            .map(|v| RateLimit::from_string(v))
            .transpose()
            .map_err(ConfigError::Invalid)?;
        Ok((per_tool, per_agent))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CostConfig {
    #[serde(default = "default_max_per_agent")]
    pub max_per_agent: f64,
    #[serde(default = "default_max_per_task")]
    pub max_per_task: f64,
    #[serde(default = "default_single_action_threshold")]
    pub single_action_escalation_threshold: f64,
}

fn default_max_per_agent() -> f64 {
    100.0
}
fn default_max_per_task() -> f64 {
    500.0
}
fn default_single_action_threshold() -> f64 {
    25.0
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            max_per_agent: default_max_per_agent(),
            max_per_task: default_max_per_task(),
            single_action_escalation_threshold: default_single_action_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BudgetConfig {
    #[serde(default = "default_max_per_task")]
    pub per_task_budget: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            per_task_budget: default_max_per_task(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TrustConfig {
    #[serde(default)]
    pub block_unknown_agents: bool,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            block_unknown_agents: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CascadeConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_per_orchestrator: usize,
}

fn default_max_depth() -> usize {
    5
}
fn default_max_concurrent() -> usize {
    10
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_concurrent_per_orchestrator: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RollbackConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_snapshot_retention_hours")]
    pub snapshot_retention_hours: i64,
}

fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}
fn default_snapshot_retention_hours() -> i64 {
    24
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            database_url: default_database_url(),
            snapshot_retention_hours: default_snapshot_retention_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditConfig {
    #[serde(default = "default_audit_capacity")]
    pub capacity: usize,
}

fn default_audit_capacity() -> usize {
    10_000
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            capacity: default_audit_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    pub agent_id: String,
    pub trust_level: crate::types::TrustLevel,
    #[serde(default)]
    pub can_delegate_to: Vec<String>,
    #[serde(default)]
    pub max_actions_per_run: Option<u32>,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(ConfigError::Parse)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            risk: RiskConfig::default(),
            rate_limits: RateLimitConfig::default(),
            cost: CostConfig::default(),
            budget: BudgetConfig::default(),
            trust: TrustConfig::default(),
            cascade: CascadeConfig::default(),
            rollback: RollbackConfig::default(),
            audit: AuditConfig::default(),
            policies: Vec::new(),
            agents: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive_but_bounded() {
        let config = Config::default();
        assert_eq!(config.risk.max_risk_score, 0.8);
        assert!(config.trust.block_unknown_agents);
    }

    #[test]
    fn parses_minimal_yaml_document() {
        let yaml = r#"
risk:
  max_risk_score: 0.75
rate_limits:
  per_tool:
    "db.*": "10/minute"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.risk.max_risk_score, 0.75);

        let (per_tool, _) = config.rate_limits.parse().unwrap();
        assert_eq!(per_tool.get("db.*").unwrap().max_calls, 10);
    }

    #[test]
    fn rejects_malformed_yaml() {
        assert!(Config::from_yaml("not: [valid, yaml").is_err());
    }
}
