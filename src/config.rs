use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use thiserror::Error;

use crate::authorizer::{DecisionRule, PolicyError, ResiliencePolicy};
use crate::log_mask::LogMask;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid authorizer settings: {0}")]
    Policy(#[from] PolicyError),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Mask owner ids and amounts in log output
    #[serde(default = "default_true")]
    pub mask_sensitive_logs: bool,
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub postgres_pool: PoolConfig,
    pub authorizer: AuthorizerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthorizerConfig {
    pub url: String,
    #[serde(default = "default_decision_field")]
    pub decision_field: String,
    #[serde(default = "default_approval_token")]
    pub approval_token: String,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 100,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_decision_field() -> String {
    "message".to_string()
}

fn default_approval_token() -> String {
    "Autorizado".to_string()
}

fn default_attempt_timeout_ms() -> u64 {
    3000
}

impl AuthorizerConfig {
    /// Validated resilience policy
    pub fn policy(&self) -> Result<ResiliencePolicy, PolicyError> {
        let policy = ResiliencePolicy {
            max_attempts: self.retry.max_attempts,
            backoff_base: Duration::from_millis(self.retry.backoff_base_ms),
            backoff_multiplier: self.retry.backoff_multiplier,
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
            failure_threshold: self.breaker.failure_threshold,
            cooldown: Duration::from_millis(self.breaker.cooldown_ms),
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn decision_rule(&self) -> DecisionRule {
        DecisionRule {
            field: self.decision_field.clone(),
            approval_token: self.approval_token.clone(),
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
            path: config_path.clone(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate; `load` reads the file then delegates here
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.authorizer.policy()?;
        Ok(config)
    }

    pub fn log_mask(&self) -> LogMask {
        LogMask::new(self.mask_sensitive_logs)
    }
}
