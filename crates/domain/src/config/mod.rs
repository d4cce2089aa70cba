mod agent;
mod monitor;
mod nats;
mod policy;
mod store;

pub use agent::*;
pub use monitor::*;
pub use nats::*;
pub use policy::*;
pub use store::*;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load the configuration from a YAML file.
    ///
    /// A missing file yields the built-in defaults silently; an
    /// unparseable file yields the defaults with a warning. Config
    /// content alone never aborts startup.
    pub fn load_or_default(path: &Path) -> Config {
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Config::default();
        }

        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read config, using defaults");
                return Config::default();
            }
        };

        match Self::from_yaml(&raw) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "config loaded");
                config
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "using defaults");
                Config::default()
            }
        }
    }

    /// Parse a YAML config document.
    pub fn from_yaml(raw: &str) -> crate::error::Result<Config> {
        serde_yaml::from_str(raw).map_err(|e| crate::error::Error::Config(format!("parsing config: {e}")))
    }

    /// Apply environment-variable overrides.
    ///
    /// Precedence is env > file > built-in default, limited to the two
    /// operational knobs deployments actually move around: the bus URL
    /// (`CM_NATS_URL`) and the agent base URL (`CM_AGENT_URL`).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("CM_NATS_URL") {
            if !url.is_empty() {
                self.nats.url = url;
            }
        }
        if let Ok(url) = std::env::var("CM_AGENT_URL") {
            if !url.is_empty() {
                self.agent.base_url = url;
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
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
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.nats.url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "nats.url".into(),
                message: "url must not be empty".into(),
            });
        }

        if self.nats.subject.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "nats.subject".into(),
                message: "subject must not be empty".into(),
            });
        }

        if self.agent.base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "agent.base_url".into(),
                message: "base_url must not be empty".into(),
            });
        }

        if self.policy.turns_threshold == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "policy.turns_threshold".into(),
                message: "threshold of 0 forwards on every segment".into(),
            });
        }

        if self.policy.send_mode == SendMode::Window && self.policy.window_size == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "policy.window_size".into(),
                message: "window of 0 selects nothing, so no forward will ever fire".into(),
            });
        }

        errors
    }
}
