//! Gateway configuration.
//!
//! Loaded from `config.toml` when present, otherwise defaults. Runtime
//! toggles (prompt source, disabled tools, provider key fallbacks) come
//! from `NEXTAI_*` environment variables and are read where they are used.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Env var holding the API key for the auth middleware.
    pub api_key_env: String,
    /// Root for persisted state (snapshot, leases, uploads).
    pub state_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8800,
            api_key_env: "NEXTAI_API_KEY".into(),
            state_path: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Generate/tool rounds allowed per turn.
    pub max_steps: u32,
    /// Default `wait` deadline for sub-agents.
    pub wait_default_ms: u64,
    /// Hard ceiling on a `wait` deadline.
    pub wait_max_ms: u64,
    /// How long `request_user_input` blocks before timing out.
    pub request_user_input_timeout_secs: u64,
    /// Per cron run timeout.
    pub cron_timeout_ms: u64,
    /// Cron lease time-to-live.
    pub cron_lease_ttl_secs: u64,
    /// Scheduler tick interval.
    pub cron_tick_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_steps: 24,
            wait_default_ms: 30_000,
            wait_max_ms: 300_000,
            request_user_input_timeout_secs: 900,
            cron_timeout_ms: 30_000,
            cron_lease_ttl_secs: 120,
            cron_tick_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Config {
    /// Sanity checks run at boot. Errors abort startup, warnings are logged.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.runtime.max_steps == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "runtime.max_steps must be at least 1".into(),
            });
        }
        if self.runtime.wait_default_ms > self.runtime.wait_max_ms {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: format!(
                    "runtime.wait_default_ms ({}) exceeds wait_max_ms ({}), will be clamped",
                    self.runtime.wait_default_ms, self.runtime.wait_max_ms
                ),
            });
        }
        if self.server.host.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "server.host must not be empty".into(),
            });
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_empty());
        assert_eq!(cfg.runtime.max_steps, 24);
        assert_eq!(cfg.runtime.wait_default_ms, 30_000);
        assert_eq!(cfg.runtime.wait_max_ms, 300_000);
    }

    #[test]
    fn zero_max_steps_is_an_error() {
        let mut cfg = Config::default();
        cfg.runtime.max_steps = 0;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("max_steps")));
    }

    #[test]
    fn toml_partial_overrides() {
        let cfg: Config = toml::from_str(
            r#"
            [server]
            port = 9000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.runtime.max_steps, 24);
    }
}
