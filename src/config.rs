//! TOML configuration for the boostd daemon.
//!
//! Layered configuration model with sensible defaults, environment variable
//! override for the config file path, and a standard filesystem location.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the boostd process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoostdConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BoostdConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path specified by the `BOOSTD_CONFIG` environment variable.
    /// 2. `/etc/boostd/boostd.toml`.
    /// 3. Fall back to compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var("BOOSTD_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "BOOSTD_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new("/etc/boostd/boostd.toml");
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Boost cadence and cooldown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Lower bound of the randomized boost interval, in minutes.
    pub min_minutes: u64,
    /// Upper bound of the randomized boost interval, in minutes (inclusive).
    pub max_minutes: u64,
    /// Fixed wait after a Failure outcome (e.g. no renewable listing), seconds.
    pub failure_cooldown_secs: u64,
    /// Fixed wait after an Error outcome (transport fault), seconds.
    pub error_cooldown_secs: u64,
    /// Retry delay when the database is unreachable from a boost task, seconds.
    pub store_retry_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_minutes: 13,
            max_minutes: 17,
            failure_cooldown_secs: 300,
            error_cooldown_secs: 60,
            store_retry_secs: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Per-owner and process-wide resource limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum number of accounts a single owner may register.
    pub max_accounts_per_owner: u32,
    /// Maximum number of boost executions running concurrently across all
    /// accounts.
    pub execution_concurrency_ceiling: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_accounts_per_owner: 10,
            execution_concurrency_ceiling: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Configuration for the external automation agent that performs the actual
/// listing renewal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// URL of the automation agent's boost endpoint.
    pub agent_url: String,
    /// Request timeout for a single boost attempt, seconds.  Attempts can
    /// legitimately take tens of seconds.
    pub request_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            agent_url: "http://127.0.0.1:7800/boost".to_string(),
            request_timeout_secs: 90,
        }
    }
}

// ---------------------------------------------------------------------------
// API
// ---------------------------------------------------------------------------

/// HTTP API listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address and port for the HTTP API listener.
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = BoostdConfig::default();

        assert_eq!(cfg.scheduler.min_minutes, 13);
        assert_eq!(cfg.scheduler.max_minutes, 17);
        assert_eq!(cfg.scheduler.failure_cooldown_secs, 300);
        assert_eq!(cfg.scheduler.error_cooldown_secs, 60);
        assert_eq!(cfg.scheduler.store_retry_secs, 5);

        assert_eq!(cfg.limits.max_accounts_per_owner, 10);
        assert_eq!(cfg.limits.execution_concurrency_ceiling, 4);

        assert_eq!(cfg.executor.agent_url, "http://127.0.0.1:7800/boost");
        assert_eq!(cfg.executor.request_timeout_secs, 90);

        assert_eq!(cfg.api.bind, "0.0.0.0:8080");
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[scheduler]
min_minutes = 10
max_minutes = 20
failure_cooldown_secs = 120
error_cooldown_secs = 30

[limits]
max_accounts_per_owner = 3
execution_concurrency_ceiling = 2

[executor]
agent_url = "http://10.0.0.5:9000/renew"
request_timeout_secs = 45

[api]
bind = "127.0.0.1:9090"

[logging]
level = "debug"
"#;

        let cfg: BoostdConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.scheduler.min_minutes, 10);
        assert_eq!(cfg.scheduler.max_minutes, 20);
        assert_eq!(cfg.scheduler.failure_cooldown_secs, 120);
        assert_eq!(cfg.scheduler.error_cooldown_secs, 30);
        assert_eq!(cfg.limits.max_accounts_per_owner, 3);
        assert_eq!(cfg.limits.execution_concurrency_ceiling, 2);
        assert_eq!(cfg.executor.agent_url, "http://10.0.0.5:9000/renew");
        assert_eq!(cfg.executor.request_timeout_secs, 45);
        assert_eq!(cfg.api.bind, "127.0.0.1:9090");
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[scheduler]
min_minutes = 5
"#;

        let cfg: BoostdConfig = toml::from_str(toml_str).unwrap();

        // Explicit override.
        assert_eq!(cfg.scheduler.min_minutes, 5);

        // Everything else should be defaults.
        assert_eq!(cfg.scheduler.max_minutes, 17);
        assert_eq!(cfg.limits.max_accounts_per_owner, 10);
        assert_eq!(cfg.api.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: BoostdConfig = toml::from_str("").unwrap();

        assert_eq!(cfg.scheduler.min_minutes, 13);
        assert_eq!(cfg.executor.request_timeout_secs, 90);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("boostd.toml");
        std::fs::write(
            &path,
            r#"
[api]
bind = "0.0.0.0:9999"
"#,
        )
        .unwrap();

        let cfg = BoostdConfig::load(&path).unwrap();
        assert_eq!(cfg.api.bind, "0.0.0.0:9999");
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = BoostdConfig::load(Path::new("/nonexistent/path/boostd.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let cfg = BoostdConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let roundtripped: BoostdConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(cfg.scheduler.max_minutes, roundtripped.scheduler.max_minutes);
        assert_eq!(
            cfg.limits.execution_concurrency_ceiling,
            roundtripped.limits.execution_concurrency_ceiling
        );
        assert_eq!(cfg.executor.agent_url, roundtripped.executor.agent_url);
    }
}
