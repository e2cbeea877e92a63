//! Configuration loading, validation, and management for Tandem.
//!
//! Loads configuration from `~/.tandem/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.tandem/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model used by both agents
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per agent response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Iteration loop settings
    #[serde(default, rename = "loop")]
    pub control: LoopConfig,

    /// Agent instruction overrides
    #[serde(default)]
    pub agents: AgentsConfig,

    /// Turn tracing
    #[serde(default)]
    pub trace: TraceConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("control", &self.control)
            .field("agents", &self.agents)
            .field("trace", &self.trace)
            .finish()
    }
}

/// Settings of the human-in-the-loop iteration controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Turns allowed per question before the loop stops on its own
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Display column after which unbroken streamed text is wrapped
    #[serde(default = "default_wrap_column")]
    pub wrap_column: usize,

    /// Question used when the operator submits an empty one
    #[serde(default = "default_question")]
    pub default_question: String,

    /// Prefix of operator feedback messages
    #[serde(default = "default_feedback_marker")]
    pub feedback_marker: String,

    /// Append each turn's answer to the history before the next turn.
    /// Off by default: only operator feedback extends the history.
    #[serde(default)]
    pub carry_answers: bool,

    /// Treat a transfer-to-agent action as the end of the loop
    #[serde(default)]
    pub transfer_ends_loop: bool,

    /// End the loop after "view details" instead of returning to the menu
    #[serde(default)]
    pub details_ends_loop: bool,

    /// Save the final history to the checkpoint store
    #[serde(default = "default_true")]
    pub persist_history: bool,
}

fn default_max_iterations() -> u32 {
    5
}
fn default_wrap_column() -> usize {
    120
}
fn default_question() -> String {
    "List the files in the current directory and show the first 10 lines of main.rs".into()
}
fn default_feedback_marker() -> String {
    "User feedback:".into()
}
fn default_true() -> bool {
    true
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            wrap_column: default_wrap_column(),
            default_question: default_question(),
            feedback_marker: default_feedback_marker(),
            carry_answers: false,
            transfer_ends_loop: false,
            details_ends_loop: false,
            persist_history: true,
        }
    }
}

/// Instruction overrides for the two agents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_instruction: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critic_instruction: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Record one span per turn
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_service_name() -> String {
    "tandem".into()
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.tandem/config.toml).
    ///
    /// Environment variables override file values:
    /// - `TANDEM_API_KEY`, then `OPENAI_API_KEY`
    /// - `TANDEM_API_URL`
    /// - `TANDEM_MODEL`
    /// - `TANDEM_MAX_ITERATIONS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            self.api_key = lookup("TANDEM_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(url) = lookup("TANDEM_API_URL") {
            self.api_url = url;
        }

        if let Some(model) = lookup("TANDEM_MODEL") {
            self.model = model;
        }

        if let Some(max) = lookup("TANDEM_MAX_ITERATIONS") {
            self.control.max_iterations = max.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "TANDEM_MAX_ITERATIONS must be a positive integer, got '{max}'"
                ))
            })?;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tandem")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.control.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "loop.max_iterations must be at least 1".into(),
            ));
        }

        if self.control.wrap_column == 0 {
            return Err(ConfigError::ValidationError(
                "loop.wrap_column must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Render the configuration as TOML with the API key removed.
    pub fn redacted_toml(&self) -> String {
        let mut config = self.clone();
        config.api_key = None;
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            control: LoopConfig::default(),
            agents: AgentsConfig::default(),
            trace: TraceConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.control.max_iterations, 5);
        assert_eq!(config.control.wrap_column, 120);
        assert!(!config.control.details_ends_loop);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[loop]"));
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.control, config.control);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut config = AppConfig::default();
        config.control.max_iterations = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
    }

    #[test]
    fn loads_loop_section_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
model = "local-model"

[loop]
max_iterations = 3
details_ends_loop = true

[trace]
enabled = true
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.model, "local-model");
        assert_eq!(config.control.max_iterations, 3);
        assert!(config.control.details_ends_loop);
        assert_eq!(config.control.wrap_column, 120);
        assert!(config.trace.enabled);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("TANDEM_MODEL", "gpt-4o"),
            ("TANDEM_MAX_ITERATIONS", "8"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.control.max_iterations, 8);
    }

    #[test]
    fn bad_iteration_override_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_env_overrides(|k| {
            (k == "TANDEM_MAX_ITERATIONS").then(|| "many".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!config.redacted_toml().contains("sk-secret"));
    }
}
