//! Layered runtime configuration.
//!
//! Precedence, lowest first: built-in defaults, the user-level
//! `~/.config/storyland/storyland.toml`, the project `storyland.toml`, the
//! process environment (with `.env` loaded through dotenvy), and finally CLI
//! flags applied by the binary.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::logging::LogFormat;
use crate::retry::RetryPolicy;

pub const CONFIG_FILE: &str = "storyland.toml";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-lite";
pub const DEFAULT_DATABASE_URL: &str = ".storyland/sessions.db";

/// Backoff settings as they appear in config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: u32,
    pub exp_base: f64,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 5,
            exp_base: 7.0,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            exp_base: self.exp_base,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model_name: String,
    /// Total budget for all phases of one run, in seconds.
    pub workflow_timeout_secs: u64,
    /// Ceiling for a single generation call, in seconds.
    pub task_timeout_secs: u64,
    pub use_database: bool,
    pub database_url: String,
    pub session_max_events: usize,
    pub max_context_tokens: usize,
    pub log_level: String,
    pub log_format: LogFormat,
    pub retry: RetrySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model_name: DEFAULT_MODEL.to_string(),
            workflow_timeout_secs: 300,
            task_timeout_secs: 120,
            use_database: false,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            session_max_events: 200,
            max_context_tokens: 100_000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            retry: RetrySettings::default(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model_name", &self.model_name)
            .field("workflow_timeout_secs", &self.workflow_timeout_secs)
            .field("task_timeout_secs", &self.task_timeout_secs)
            .field("use_database", &self.use_database)
            .field("database_url", &self.database_url)
            .field("session_max_events", &self.session_max_events)
            .field("max_context_tokens", &self.max_context_tokens)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Config {
    /// Load every layer for a project directory and validate the result.
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let _ = dotenvy::from_path(project_dir.join(".env"));

        let mut config = Self::default();
        if let Some(global) = global_config_path() {
            config = Self::from_file_or(&global, config)?;
        }
        config = Self::from_file_or(&project_dir.join(CONFIG_FILE), config)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file, or return `fallback` when the file does not exist.
    ///
    /// Keys missing from the file keep the fallback's values.
    pub fn from_file_or(path: &Path, fallback: Self) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(fallback);
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::merge_toml(fallback, &content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn merge_toml(base: Self, content: &str) -> Result<Self, toml::de::Error> {
        let overlay: toml::Table = toml::from_str(content)?;
        let api_key = base.api_key.clone();
        let mut merged = match toml::Value::try_from(&base) {
            Ok(toml::Value::Table(table)) => table,
            _ => toml::Table::new(),
        };
        for (key, value) in overlay {
            match (merged.get_mut(&key), value) {
                (Some(toml::Value::Table(existing)), toml::Value::Table(extra)) => {
                    existing.extend(extra);
                }
                (_, value) => {
                    merged.insert(key, value);
                }
            }
        }
        let mut config: Self = toml::Value::Table(merged).try_into()?;
        if config.api_key.is_none() {
            config.api_key = api_key;
        }
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("GOOGLE_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(model) = get("MODEL_NAME") {
            self.model_name = model;
        }
        if let Some(raw) = get("WORKFLOW_TIMEOUT") {
            self.workflow_timeout_secs = parse_var("WORKFLOW_TIMEOUT", &raw)?;
        }
        if let Some(raw) = get("AGENT_TIMEOUT") {
            self.task_timeout_secs = parse_var("AGENT_TIMEOUT", &raw)?;
        }
        if let Some(raw) = get("USE_DATABASE") {
            self.use_database = parse_bool("USE_DATABASE", &raw)?;
        }
        if let Some(url) = get("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(raw) = get("SESSION_MAX_EVENTS") {
            self.session_max_events = parse_var("SESSION_MAX_EVENTS", &raw)?;
        }
        if let Some(raw) = get("MAX_CONTEXT_TOKENS") {
            self.max_context_tokens = parse_var("MAX_CONTEXT_TOKENS", &raw)?;
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(raw) = get("LOG_FORMAT") {
            self.log_format = raw.parse().map_err(|reason| ConfigError::Invalid {
                key: "LOG_FORMAT".into(),
                value: raw.clone(),
                reason,
            })?;
        }
        if let Some(raw) = get("RETRY_ATTEMPTS") {
            self.retry.attempts = parse_var("RETRY_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = get("RETRY_EXP_BASE") {
            self.retry.exp_base = parse_var("RETRY_EXP_BASE", &raw)?;
        }
        if let Some(raw) = get("RETRY_INITIAL_DELAY_MS") {
            self.retry.initial_delay_ms = parse_var("RETRY_INITIAL_DELAY_MS", &raw)?;
        }
        if let Some(raw) = get("RETRY_MAX_DELAY_MS") {
            self.retry.max_delay_ms = parse_var("RETRY_MAX_DELAY_MS", &raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workflow_timeout_secs == 0 {
            return Err(invalid("WORKFLOW_TIMEOUT", "0", "must be at least 1 second"));
        }
        if self.task_timeout_secs == 0 {
            return Err(invalid("AGENT_TIMEOUT", "0", "must be at least 1 second"));
        }
        if self.model_name.trim().is_empty() {
            return Err(invalid("MODEL_NAME", "", "must not be empty"));
        }
        if self.retry.attempts == 0 {
            return Err(invalid("RETRY_ATTEMPTS", "0", "must be at least 1"));
        }
        if !(self.retry.exp_base.is_finite() && self.retry.exp_base >= 1.0) {
            return Err(invalid(
                "RETRY_EXP_BASE",
                &self.retry.exp_base.to_string(),
                "must be a finite number >= 1.0",
            ));
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(invalid(
                "RETRY_MAX_DELAY_MS",
                &self.retry.max_delay_ms.to_string(),
                "must not be smaller than RETRY_INITIAL_DELAY_MS",
            ));
        }
        if self.use_database && self.database_url.trim().is_empty() {
            return Err(invalid("DATABASE_URL", "", "required when USE_DATABASE is true"));
        }
        Ok(())
    }

    /// The API key, or an error naming the missing variable.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing {
                key: "GOOGLE_API_KEY".into(),
            })
    }

    pub fn workflow_timeout(&self) -> Duration {
        Duration::from_secs(self.workflow_timeout_secs)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }

    /// Filesystem path of the SQLite database behind `database_url`.
    ///
    /// Accepts plain paths and SQLAlchemy-style `sqlite:///relative.db` or
    /// `sqlite:////absolute.db` URLs.
    pub fn database_path(&self) -> PathBuf {
        let url = self.database_url.trim();
        let path = url
            .strip_prefix("sqlite:///")
            .or_else(|| url.strip_prefix("sqlite://"))
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        PathBuf::from(path)
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("storyland").join(CONFIG_FILE))
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, raw, &e.to_string()))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, raw, "expected true or false")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.model_name, "gemini-2.0-flash-lite");
        assert_eq!(config.workflow_timeout(), Duration::from_secs(300));
        assert_eq!(config.task_timeout(), Duration::from_secs(120));
        assert!(!config.use_database);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("GOOGLE_API_KEY", "abc"),
                ("WORKFLOW_TIMEOUT", "45"),
                ("USE_DATABASE", "true"),
                ("LOG_FORMAT", "json"),
                ("RETRY_ATTEMPTS", "2"),
            ]))
            .unwrap();
        assert_eq!(config.require_api_key().unwrap(), "abc");
        assert_eq!(config.workflow_timeout_secs, 45);
        assert!(config.use_database);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.retry.attempts, 2);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("WORKFLOW_TIMEOUT", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("WORKFLOW_TIMEOUT"));
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[("MODEL_NAME", "  ")])).unwrap();
        assert_eq!(config.model_name, DEFAULT_MODEL);
    }

    #[test]
    fn test_missing_api_key() {
        let config = Config::default();
        let err = config.require_api_key().unwrap_err();
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = Config {
            workflow_timeout_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shrinking_backoff() {
        let mut config = Config::default();
        config.retry.exp_base = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_layer_keeps_unset_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            "model_name = \"gemini-2.5-flash\"\n[retry]\nattempts = 3\n",
        )
        .unwrap();

        let base = Config {
            workflow_timeout_secs: 90,
            api_key: Some("from-env".into()),
            ..Config::default()
        };
        let config = Config::from_file_or(&path, base).unwrap();
        assert_eq!(config.model_name, "gemini-2.5-flash");
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.retry.exp_base, 7.0);
        assert_eq!(config.workflow_timeout_secs, 90);
        assert_eq!(config.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_missing_file_returns_fallback() {
        let dir = tempdir().unwrap();
        let config = Config::from_file_or(&dir.path().join(CONFIG_FILE), Config::default()).unwrap();
        assert_eq!(config.model_name, DEFAULT_MODEL);
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "model_name = [").unwrap();
        let err = Config::from_file_or(&path, Config::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_database_path_forms() {
        let mut config = Config::default();
        assert_eq!(config.database_path(), PathBuf::from(".storyland/sessions.db"));
        config.database_url = "sqlite:///storyland_sessions.db".into();
        assert_eq!(config.database_path(), PathBuf::from("storyland_sessions.db"));
        config.database_url = "sqlite:////var/lib/storyland.db".into();
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/storyland.db"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = Config {
            api_key: Some("secret-key".into()),
            ..Config::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("<redacted>"));
    }
}
