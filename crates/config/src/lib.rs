//! Configuration loading, validation, and management for BoltStudio.
//!
//! Loads configuration from `~/.boltstudio/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.boltstudio/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool dispatcher settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Local workspace settings
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

fn default_api_url() -> String {
    "http://localhost:4141/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_true() -> bool {
    true
}

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
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("tools", &self.tools)
            .field("workspace", &self.workspace)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on model invocations per episode
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Mode used when `run` is not given one (build, fix, refactor, ui, deploy)
    #[serde(default = "default_mode")]
    pub default_mode: String,

    /// Snapshot the canonical files before every episode
    #[serde(default = "default_true")]
    pub checkpoint_before_task: bool,

    /// Save the project after every episode that did not fail
    #[serde(default = "default_true")]
    pub auto_save: bool,
}

fn default_max_turns() -> u32 {
    3
}
fn default_mode() -> String {
    "build".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            default_mode: default_mode(),
            checkpoint_before_task: true,
            auto_save: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Character bound on fetched page content
    #[serde(default = "default_web_read_limit")]
    pub web_read_limit: usize,

    #[serde(default = "default_find_max_depth")]
    pub find_max_depth: u32,

    /// Instant-answer search endpoint queried by `webSearch`
    #[serde(default = "default_search_endpoint")]
    pub search_endpoint: String,

    /// How many related results `webSearch` reports
    #[serde(default = "default_related_results")]
    pub related_results: usize,

    /// Wall-clock bound on sandbox commands
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Relay that performs `webRead` fetches; pages are fetched directly when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
}

fn default_web_read_limit() -> usize {
    8000
}
fn default_find_max_depth() -> u32 {
    4
}
fn default_search_endpoint() -> String {
    "https://api.duckduckgo.com/".into()
}
fn default_related_results() -> usize {
    3
}
fn default_command_timeout() -> u64 {
    120
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            web_read_limit: default_web_read_limit(),
            find_max_depth: default_find_max_depth(),
            search_endpoint: default_search_endpoint(),
            related_results: default_related_results(),
            command_timeout_secs: default_command_timeout(),
            proxy_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory, relative to the project root, holding session state
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

fn default_state_dir() -> String {
    ".boltstudio".into()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.boltstudio/config.toml).
    ///
    /// Environment overrides:
    /// - `BOLTSTUDIO_API_KEY`, then `OPENAI_API_KEY` (when no key is configured)
    /// - `BOLTSTUDIO_API_URL`
    /// - `BOLTSTUDIO_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("BOLTSTUDIO_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(url) = std::env::var("BOLTSTUDIO_API_URL") {
            self.api_url = url;
        }

        if let Ok(model) = std::env::var("BOLTSTUDIO_MODEL") {
            self.default_model = model;
        }
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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".boltstudio")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_turns must be at least 1".into(),
            ));
        }

        if self.tools.command_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.command_timeout_secs must be at least 1".into(),
            ));
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            tools: ToolsConfig::default(),
            workspace: WorkspaceConfig::default(),
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
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.api_url, "http://localhost:4141/v1");
        assert_eq!(config.agent.max_turns, 3);
        assert!(config.agent.checkpoint_before_task);
        assert_eq!(config.tools.web_read_limit, 8000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.api_url, config.api_url);
        assert_eq!(parsed.tools.find_max_depth, config.tools.find_max_depth);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_turn_budget_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_turns = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_model, "gpt-4o");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_model = "claude-sonnet"

[agent]
max_turns = 5
default_mode = "fix"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_model, "claude-sonnet");
        assert_eq!(config.agent.max_turns, 5);
        assert_eq!(config.agent.default_mode, "fix");
        assert!(config.agent.auto_save);
        assert_eq!(config.tools.related_results, 3);
        assert_eq!(config.workspace.state_dir, ".boltstudio");
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "default_model = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret-value".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-secret-value"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("localhost:4141"));
        assert!(toml_str.contains("[agent]"));
        assert!(toml_str.contains("max_turns = 3"));
    }
}
