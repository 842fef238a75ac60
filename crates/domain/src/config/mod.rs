mod event_store;
mod llm;
mod runner;
mod server;

pub use event_store::*;
pub use llm::*;
pub use runner::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::model::HierarchyConfig;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub event_store: EventStoreConfig,
    /// Hierarchy definitions keyed by `hierarchy_id`, the persistent
    /// configuration store `RunManager::start` resolves against.
    #[serde(default)]
    pub hierarchies: HashMap<String, HierarchyConfig>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    /// Empty vec means the config is good to boot with.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }
        if self.runner.pool_size == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "runner.pool_size".into(),
                message: "pool_size must be greater than 0".into(),
            });
        }
        if self.runner.subscriber_buffer == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "runner.subscriber_buffer".into(),
                message: "subscriber_buffer must be greater than 0".into(),
            });
        }
        if let CredentialMode::ApiKey { env } = &self.llm.credential_mode {
            if env.trim().is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "llm.credential_mode.env".into(),
                    message: "api_key credential mode requires a non-empty env var name".into(),
                });
            }
        }
        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)"
                    .into(),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_config_passes() {
        let issues = Config::default().validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn server_port_zero_is_error() {
        let mut cfg = Config::default();
        cfg.server.port = 0;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|e| e.field == "server.port" && e.severity == ConfigSeverity::Error));
    }

    #[test]
    fn runner_pool_size_zero_is_error() {
        let mut cfg = Config::default();
        cfg.runner.pool_size = 0;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|e| e.field == "runner.pool_size" && e.severity == ConfigSeverity::Error));
    }

    #[test]
    fn empty_api_key_env_is_error() {
        let mut cfg = Config::default();
        cfg.llm.credential_mode = CredentialMode::ApiKey { env: String::new() };
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|e| e.field == "llm.credential_mode.env"));
    }

    #[test]
    fn cors_wildcard_is_warning() {
        let mut cfg = Config::default();
        cfg.server.cors.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        let issue = issues
            .iter()
            .find(|e| e.field == "server.cors.allowed_origins")
            .expect("expected CORS wildcard warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn config_error_display_format() {
        let err = ConfigError {
            severity: ConfigSeverity::Error,
            field: "server.port".into(),
            message: "port must be greater than 0".into(),
        };
        assert_eq!(
            format!("{err}"),
            "[ERROR] server.port: port must be greater than 0"
        );
    }
}
