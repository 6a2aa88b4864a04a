//! Configuration management for termhost.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/termhost/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("shell path does not exist: {0}")]
    InvalidShellPath(String),

    #[error("term must not be empty")]
    EmptyTerm,

    #[error("log level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for termhost.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration.
    pub log: LogConfig,

    /// Session configuration.
    pub session: SessionConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub level: String,

    /// Optional log file. Logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Shell override. When unset the platform default shell is used.
    pub shell: Option<String>,

    /// Value of `TERM` for spawned shells.
    pub term: String,

    /// Milliseconds to wait after a kill before escalating to SIGKILL.
    pub kill_grace_ms: u64,

    /// Milliseconds to keep draining output after the process has exited.
    pub exit_drain_ms: u64,

    /// Milliseconds to wait for sessions to exit during shutdown.
    pub shutdown_timeout_ms: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shell: None,
            term: "xterm-color".to_string(),
            kill_grace_ms: 2000,
            exit_drain_ms: 200,
            shutdown_timeout_ms: 3000,
        }
    }
}

impl SessionConfig {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn exit_drain(&self) -> Duration {
        Duration::from_millis(self.exit_drain_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("termhost")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - TERMHOST_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - TERMHOST_SHELL: Override the shell for new sessions
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("TERMHOST_LOG_LEVEL") {
            if !level.is_empty() {
                self.log.level = level;
            }
        }

        if let Ok(shell) = std::env::var("TERMHOST_SHELL") {
            if !shell.is_empty() {
                self.session.shell = Some(shell);
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(shell) = &self.session.shell {
            let shell_path = Path::new(shell);
            let found = if shell_path.is_absolute() {
                shell_path.exists()
            } else {
                which::which(shell).is_ok()
            };
            if !found {
                return Err(ConfigError::InvalidShellPath(shell.clone()));
            }
        }

        if self.session.term.trim().is_empty() {
            return Err(ConfigError::EmptyTerm);
        }

        let level = self.log.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.log.level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file, creating parent directories if needed.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.log.level, "info");
        assert!(config.log.file.is_none());
        assert!(config.session.shell.is_none());
        assert_eq!(config.session.term, "xterm-color");
        assert_eq!(config.session.kill_grace(), Duration::from_secs(2));
        assert_eq!(config.session.exit_drain(), Duration::from_millis(200));
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[log]
level = "debug"

[session]
shell = "/bin/sh"
kill_grace_ms = 500
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.session.shell.as_deref(), Some("/bin/sh"));
        assert_eq!(config.session.kill_grace_ms, 500);
        // Untouched fields keep their defaults
        assert_eq!(config.session.term, "xterm-color");
    }

    #[test]
    fn test_from_toml_invalid() {
        let result = Config::from_toml("[session\nterm = ");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML configuration"), "got: {}", err);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.log.level = "warn".to_string();
        config.session.term = "xterm-256color".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validate_default() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_missing_shell() {
        let mut config = Config::default();
        config.session.shell = Some("/definitely/not/a/shell".to_string());
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidShellPath(
                "/definitely/not/a/shell".to_string()
            ))
        );
    }

    #[test]
    fn test_validate_empty_term() {
        let mut config = Config::default();
        config.session.term = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::EmptyTerm));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.log.level = "DEBUG".to_string();
        assert!(config.validate().is_ok());

        config.log.level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        std::env::set_var("TERMHOST_LOG_LEVEL", "trace");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.log.level, "trace");

        std::env::remove_var("TERMHOST_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_override_shell() {
        std::env::set_var("TERMHOST_SHELL", "/bin/sh");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.session.shell.as_deref(), Some("/bin/sh"));

        std::env::remove_var("TERMHOST_SHELL");
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        std::env::set_var("TERMHOST_LOG_LEVEL", "");
        std::env::remove_var("TERMHOST_SHELL");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.log.level, "info");
        assert!(config.session.shell.is_none());

        std::env::remove_var("TERMHOST_LOG_LEVEL");
    }
}
