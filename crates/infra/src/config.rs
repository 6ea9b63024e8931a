//! Dispatcher configuration loaded from `conveyor.toml`.
//!
//! Values absent from the file use defaults. `CONVEYOR_*` environment
//! variables take precedence over the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "conveyor.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}

/// What the startup sweep does with jobs left in PROCESSING by a dead process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMode {
    /// Move the job to ERROR; an operator restarts it.
    #[default]
    MarkError,
    /// Move the job to ERROR and straight back to ENQUEUED.
    Requeue,
}

impl std::str::FromStr for RecoveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mark_error" => Ok(RecoveryMode::MarkError),
            "requeue" => Ok(RecoveryMode::Requeue),
            other => Err(format!("unknown recovery mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConveyorConfig {
    /// Failed dispatch cycles tolerated in one drain before it halts.
    #[serde(default = "default_max_dispatch_retries")]
    pub max_dispatch_retries: u32,

    /// Base backoff between failed cycles, multiplied by the failure count.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Period of the dispatch timer.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub recovery_mode: RecoveryMode,

    #[serde(default = "default_recover_on_startup")]
    pub recover_on_startup: bool,
}

fn default_max_dispatch_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_recover_on_startup() -> bool {
    true
}

impl Default for ConveyorConfig {
    fn default() -> Self {
        Self {
            max_dispatch_retries: default_max_dispatch_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            recovery_mode: RecoveryMode::default(),
            recover_on_startup: default_recover_on_startup(),
        }
    }
}

impl ConveyorConfig {
    /// Load `conveyor.toml` from the working directory.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from `path`, falling back to defaults when the file does not
    /// exist, then apply environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<ConveyorConfig>(&contents)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply `CONVEYOR_*` overrides read through `lookup`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        const RETRIES: &str = "CONVEYOR_MAX_DISPATCH_RETRIES";
        const POLL: &str = "CONVEYOR_POLL_INTERVAL_MS";
        const MODE: &str = "CONVEYOR_RECOVERY_MODE";

        if let Some(value) = lookup(RETRIES).filter(|v| !v.is_empty()) {
            self.max_dispatch_retries = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key: RETRIES, value })?;
        }
        if let Some(value) = lookup(POLL).filter(|v| !v.is_empty()) {
            self.poll_interval_ms = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key: POLL, value })?;
        }
        if let Some(value) = lookup(MODE).filter(|v| !v.is_empty()) {
            self.recovery_mode = value
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key: MODE, value })?;
        }
        Ok(self)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Backoff before the cycle following the `failures`-th failure.
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let ms = self
            .retry_backoff_ms
            .saturating_mul(u64::from(failures))
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    pub fn with_max_dispatch_retries(mut self, retries: u32) -> Self {
        self.max_dispatch_retries = retries;
        self
    }

    pub fn with_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    pub fn with_recovery_mode(mut self, mode: RecoveryMode) -> Self {
        self.recovery_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = ConveyorConfig::default();
        assert_eq!(config.max_dispatch_retries, 3);
        assert_eq!(config.retry_backoff_ms, 100);
        assert_eq!(config.max_backoff_ms, 2000);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.recovery_mode, RecoveryMode::MarkError);
        assert!(config.recover_on_startup);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            max_dispatch_retries = 5
            recovery_mode = "requeue"
        "#;
        let config: ConveyorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_dispatch_retries, 5);
        assert_eq!(config.recovery_mode, RecoveryMode::Requeue);
        assert_eq!(config.retry_backoff_ms, 100);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConveyorConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.retry_backoff_ms, 100);
        assert!(config.recover_on_startup);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_backoff_ms = 500\nrecover_on_startup = false").unwrap();

        let config = ConveyorConfig::load_from(file.path()).unwrap();
        assert!(!config.recover_on_startup);
        assert_eq!(config.max_backoff_ms, 500);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_dispatch_retries = \"many\"").unwrap();
        assert!(matches!(
            ConveyorConfig::load_from(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CONVEYOR_MAX_DISPATCH_RETRIES", "7"),
            ("CONVEYOR_RECOVERY_MODE", "requeue"),
        ]);
        let config = ConveyorConfig::default()
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.max_dispatch_retries, 7);
        assert_eq!(config.recovery_mode, RecoveryMode::Requeue);
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn invalid_env_value_is_rejected() {
        let err = ConveyorConfig::default()
            .apply_env(|k| (k == "CONVEYOR_POLL_INTERVAL_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                key: "CONVEYOR_POLL_INTERVAL_MS",
                ..
            }
        ));
    }

    #[test]
    fn backoff_is_linear_and_capped() {
        let config = ConveyorConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for(3), Duration::from_millis(300));
        assert_eq!(config.backoff_for(100), Duration::from_millis(2000));
    }
}
