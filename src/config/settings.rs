//! Orchestrator runtime settings.
//!
//! Loaded from an optional YAML file, then overridden by environment
//! variables, then validated. Every field has a default so an empty file
//! (or no file at all) yields a usable configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::parse_duration_string;

/// Root configuration for the orchestrator process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub server: ServerConfig,

    /// Directory holding `orchestrator-state.json` and its backup.
    pub state_dir: PathBuf,

    /// Root against which every `run.cwd` is resolved.
    pub project_root: PathBuf,

    pub environment: RuntimeEnvironment,

    pub health_check: HealthCheckSettings,

    pub circuit_breaker: CircuitBreakerSettings,

    pub process: ProcessSettings,

    pub auto_restart: AutoRestartSettings,

    pub auto_start: AutoStartSettings,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            state_dir: PathBuf::from("state"),
            project_root: PathBuf::from("."),
            environment: RuntimeEnvironment::Development,
            health_check: HealthCheckSettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            process: ProcessSettings::default(),
            auto_restart: AutoRestartSettings::default(),
            auto_start: AutoStartSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6030,
        }
    }
}

/// Value exported to children as `NODE_ENV`; production also hides
/// internal error details from Control API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Production,
    Test,
}

impl RuntimeEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeEnvironment::Development => "development",
            RuntimeEnvironment::Production => "production",
            RuntimeEnvironment::Test => "test",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" => Some(RuntimeEnvironment::Development),
            "production" => Some(RuntimeEnvironment::Production),
            "test" => Some(RuntimeEnvironment::Test),
            _ => None,
        }
    }
}

/// What an unhealthy check does to warmup progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WarmupFailurePolicy {
    /// Keep the successful-check count; the next healthy check continues from it.
    #[default]
    Pause,
    /// Zero the successful-check count.
    Reset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckSettings {
    #[serde(with = "super::duration")]
    pub interval: Duration,
    #[serde(with = "super::duration")]
    pub timeout: Duration,
    /// Host used to build `http://{host}:{port}{healthEndpoint}`.
    pub host: String,
    pub warmup_failure: WarmupFailurePolicy,
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            host: "localhost".to_string(),
            warmup_failure: WarmupFailurePolicy::Pause,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive unhealthy checks before the breaker opens.
    pub threshold: u32,
    pub backoff_multiplier: f64,
    #[serde(with = "super::duration")]
    pub max_backoff: Duration,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            threshold: 5,
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSettings {
    /// Grace period between SIGTERM and SIGKILL.
    #[serde(with = "super::duration")]
    pub kill_timeout: Duration,
    /// Lines kept per stream in the in-memory ring buffers.
    pub log_lines: usize,
    /// Pause between stop and start during a restart.
    #[serde(with = "super::duration")]
    pub restart_delay: Duration,
    pub package_manager: PackageManagerSettings,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            kill_timeout: Duration::from_secs(10),
            log_lines: 100,
            restart_delay: Duration::from_secs(1),
            package_manager: PackageManagerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageManagerSettings {
    /// Executable name that triggers resolution (`run.command == name`).
    pub name: String,
    /// Explicit directory holding the executable; tried first.
    pub bin_dir: Option<PathBuf>,
}

impl Default for PackageManagerSettings {
    fn default() -> Self {
        Self {
            name: "pnpm".to_string(),
            bin_dir: None,
        }
    }
}

/// Bounded, backed-off restart of crashed critical services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoRestartSettings {
    pub enabled: bool,
    #[serde(with = "super::duration")]
    pub delay: Duration,
    pub max_attempts: u32,
    pub backoff_multiplier: f64,
    #[serde(with = "super::duration")]
    pub max_delay: Duration,
}

impl Default for AutoRestartSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: Duration::from_secs(5),
            max_attempts: 5,
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoStartSettings {
    pub enabled: bool,
    /// How long a dependent waits for a still-starting dependency.
    #[serde(with = "super::duration")]
    pub dependency_timeout: Duration,
}

impl Default for AutoStartSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dependency_timeout: Duration::from_secs(60),
        }
    }
}

impl OrchestratorConfig {
    /// Load from `path` (if given), apply process-environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let env: HashMap<String, String> = std::env::vars().collect();
        config.apply_env_overrides(&env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply the environment variables the orchestrator has always honoured.
    pub fn apply_env_overrides(&mut self, env: &HashMap<String, String>) -> Result<()> {
        if let Some(v) = env.get("ORCHESTRATOR_HOST") {
            self.server.host = v.clone();
        }
        if let Some(v) = env.get("ORCHESTRATOR_PORT") {
            self.server.port = parse_number("ORCHESTRATOR_PORT", v)?;
        }
        if let Some(v) = env.get("STATE_FILE_PATH") {
            self.state_dir = PathBuf::from(v);
        }
        if let Some(v) = env.get("PROJECT_ROOT") {
            self.project_root = PathBuf::from(v);
        }
        if let Some(v) = env.get("NODE_ENV") {
            self.environment = RuntimeEnvironment::parse(v).ok_or_else(|| {
                Error::Config(format!(
                    "NODE_ENV must be development, production or test, got '{}'",
                    v
                ))
            })?;
        }
        if let Some(v) = env.get("HEALTH_CHECK_INTERVAL") {
            self.health_check.interval = parse_duration_env("HEALTH_CHECK_INTERVAL", v)?;
        }
        if let Some(v) = env.get("HEALTH_CHECK_TIMEOUT") {
            self.health_check.timeout = parse_duration_env("HEALTH_CHECK_TIMEOUT", v)?;
        }
        if let Some(v) = env.get("CIRCUIT_BREAKER_THRESHOLD") {
            self.circuit_breaker.threshold = parse_number("CIRCUIT_BREAKER_THRESHOLD", v)?;
        }
        if let Some(v) = env.get("CIRCUIT_BREAKER_BACKOFF_MULTIPLIER") {
            self.circuit_breaker.backoff_multiplier =
                parse_number("CIRCUIT_BREAKER_BACKOFF_MULTIPLIER", v)?;
        }
        if let Some(v) = env.get("CIRCUIT_BREAKER_MAX_BACKOFF") {
            self.circuit_breaker.max_backoff =
                parse_duration_env("CIRCUIT_BREAKER_MAX_BACKOFF", v)?;
        }
        if let Some(v) = env.get("PROCESS_KILL_TIMEOUT") {
            self.process.kill_timeout = parse_duration_env("PROCESS_KILL_TIMEOUT", v)?;
        }
        if let Some(v) = env.get("PROCESS_LOG_LINES") {
            self.process.log_lines = parse_number("PROCESS_LOG_LINES", v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be between 1 and 65535".to_string());
        }
        if self.health_check.interval.is_zero() {
            errors.push("health_check.interval must be positive".to_string());
        }
        if self.health_check.timeout.is_zero() {
            errors.push("health_check.timeout must be positive".to_string());
        }
        if self.circuit_breaker.threshold < 1 {
            errors.push("circuit_breaker.threshold must be at least 1".to_string());
        }
        if self.circuit_breaker.backoff_multiplier < 1.0 {
            errors.push("circuit_breaker.backoff_multiplier must be at least 1".to_string());
        }
        if self.auto_restart.backoff_multiplier < 1.0 {
            errors.push("auto_restart.backoff_multiplier must be at least 1".to_string());
        }
        if self.process.log_lines < 1 {
            errors.push("process.log_lines must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors.join("; ")))
        }
    }

    pub fn state_file_path(&self) -> PathBuf {
        self.state_dir.join(crate::state::STATE_FILE_NAME)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{} has invalid value '{}'", name, value)))
}

fn parse_duration_env(name: &str, value: &str) -> Result<Duration> {
    parse_duration_string(value)
        .ok_or_else(|| Error::Config(format!("{} has invalid duration '{}'", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.server.port, 6030);
        assert_eq!(config.health_check.interval, Duration::from_secs(30));
        assert_eq!(config.health_check.timeout, Duration::from_secs(5));
        assert_eq!(config.circuit_breaker.threshold, 5);
        assert_eq!(config.circuit_breaker.max_backoff, Duration::from_secs(300));
        assert_eq!(config.process.kill_timeout, Duration::from_secs(10));
        assert_eq!(config.process.log_lines, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
server:
  port: 7000
health_check:
  interval: "10s"
  warmup_failure: reset
"#;
        let config = OrchestratorConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.health_check.interval, Duration::from_secs(10));
        assert_eq!(config.health_check.timeout, Duration::from_secs(5));
        assert_eq!(
            config.health_check.warmup_failure,
            WarmupFailurePolicy::Reset
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = OrchestratorConfig::default();
        let env: HashMap<String, String> = [
            ("ORCHESTRATOR_PORT", "6131"),
            ("HEALTH_CHECK_INTERVAL", "15000"),
            ("CIRCUIT_BREAKER_THRESHOLD", "3"),
            ("PROCESS_KILL_TIMEOUT", "2s"),
            ("NODE_ENV", "production"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        config.apply_env_overrides(&env).unwrap();
        assert_eq!(config.server.port, 6131);
        assert_eq!(config.health_check.interval, Duration::from_secs(15));
        assert_eq!(config.circuit_breaker.threshold, 3);
        assert_eq!(config.process.kill_timeout, Duration::from_secs(2));
        assert_eq!(config.environment, RuntimeEnvironment::Production);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = OrchestratorConfig::default();
        let env: HashMap<String, String> =
            [("ORCHESTRATOR_PORT".to_string(), "not-a-port".to_string())]
                .into_iter()
                .collect();
        assert!(config.apply_env_overrides(&env).is_err());
    }

    #[test]
    fn test_validate_collects_errors() {
        let mut config = OrchestratorConfig::default();
        config.circuit_breaker.threshold = 0;
        config.process.log_lines = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("threshold"));
        assert!(err.contains("log_lines"));
    }
}
