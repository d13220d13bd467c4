mod common;
mod policy;

pub use common::{ConfigError, parse_direction};
pub use policy::{PolicyMapConfig, PolicyRuleConfig};

use std::path::Path;

use domain::policy::entity::PolicyRule;
use serde::{Deserialize, Serialize};

use crate::constants::MAP_CAPACITY_WARN_THRESHOLD;
use common::{MAX_POLICY_RULES, check_limit, warn_if_world_writable};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    #[serde(default)]
    pub agent: AgentInfo,

    #[serde(default)]
    pub policy_map: PolicyMapConfig,
}

impl PolicyConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        warn_if_world_writable(path, "config file");
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.policy_map.map_name.is_empty() {
            return Err(ConfigError::Validation {
                field: "policy_map.map_name".to_string(),
                message: "map name must not be empty".to_string(),
            });
        }

        let count = self.policy_map.rules.len();
        check_limit("policy_map.rules", count, MAX_POLICY_RULES)?;

        #[allow(clippy::cast_precision_loss)]
        let fill = count as f32 / MAX_POLICY_RULES as f32;
        if fill >= MAP_CAPACITY_WARN_THRESHOLD {
            tracing::warn!(
                rules = count,
                max = MAX_POLICY_RULES,
                "policy map close to capacity"
            );
        }

        for (idx, rule_cfg) in self.policy_map.rules.iter().enumerate() {
            rule_cfg.validate(idx)?;
        }

        Ok(())
    }

    pub fn policy_rules(&self) -> Result<Vec<PolicyRule>, ConfigError> {
        self.policy_map
            .rules
            .iter()
            .map(PolicyRuleConfig::to_domain_rule)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentInfo {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for AgentInfo {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

// ── Log level ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(format!(
                "invalid log level '{s}': expected error|warn|info|debug|trace"
            )),
        }
    }
}

// ── Log format ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Text,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            _ => Err(format!("invalid log format '{s}': expected json|text")),
        }
    }
}
