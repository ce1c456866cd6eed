//! Configuration loading and validation for rivet.
//!
//! Configuration is a TOML file found through a short search path
//! (`./configs/config.toml`, `./config.toml`, `~/.rivet/config.toml`) unless
//! an explicit path is given. Every field has a default, so a missing file
//! or a partial one is fine. A few environment variables override the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub dag: DagConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Chat-completion endpoint settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Bound for whole-response requests, in seconds.
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_api_timeout() -> u64 {
    120
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_api_timeout(),
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// How a turn is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Tool-calling loop.
    #[default]
    Loop,
    /// Fixed think / decide / act / summarize stage graph.
    Pipeline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Stream answers chunk by chunk.
    #[serde(default = "default_true")]
    pub stream: bool,

    /// Run intent analysis before each turn.
    #[serde(default = "default_true")]
    pub analyze_intent: bool,

    #[serde(default)]
    pub mode: AgentMode,

    /// Models offered by the interactive `/model` command.
    #[serde(default = "default_available_models")]
    pub available_models: Vec<String>,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_true() -> bool {
    true
}
fn default_available_models() -> Vec<String> {
    vec!["gpt-4o-mini".into(), "gpt-4o".into(), "gpt-4.1".into()]
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            stream: true,
            analyze_intent: true,
            mode: AgentMode::Loop,
            available_models: default_available_models(),
        }
    }
}

/// Capability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Names of the capabilities to register.
    #[serde(default = "default_enabled_tools")]
    pub enabled: Vec<String>,

    #[serde(default)]
    pub write_code: WriteCodeConfig,

    #[serde(default)]
    pub read_file: ReadFileConfig,

    #[serde(default)]
    pub recognize_image: RecognizeImageConfig,

    #[serde(default)]
    pub execute_command: ExecuteCommandConfig,
}

fn default_enabled_tools() -> Vec<String> {
    ["write_code", "read_file", "recognize_image", "execute_command"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_tools(),
            write_code: WriteCodeConfig::default(),
            read_file: ReadFileConfig::default(),
            recognize_image: RecognizeImageConfig::default(),
            execute_command: ExecuteCommandConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteCodeConfig {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,

    #[serde(default = "default_languages")]
    pub supported_languages: Vec<String>,
}

fn default_max_lines() -> usize {
    1000
}
fn default_languages() -> Vec<String> {
    ["python", "go", "javascript", "typescript", "java", "c", "cpp", "rust"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for WriteCodeConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            supported_languages: default_languages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadFileConfig {
    #[serde(default = "default_read_max_mb")]
    pub max_size_mb: u64,

    /// Extensions including the leading dot, compared case-insensitively.
    #[serde(default = "default_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_read_max_mb() -> u64 {
    10
}
fn default_extensions() -> Vec<String> {
    [
        ".txt", ".md", ".py", ".go", ".js", ".ts", ".java", ".c", ".cpp", ".h", ".rs", ".json",
        ".yaml", ".yml", ".toml",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ReadFileConfig {
    fn default() -> Self {
        Self {
            max_size_mb: default_read_max_mb(),
            allowed_extensions: default_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizeImageConfig {
    #[serde(default = "default_image_max_mb")]
    pub max_size_mb: u64,

    /// Formats without the dot (`png`, `jpg`, ...).
    #[serde(default = "default_formats")]
    pub supported_formats: Vec<String>,
}

fn default_image_max_mb() -> u64 {
    20
}
fn default_formats() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif", "webp", "bmp"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for RecognizeImageConfig {
    fn default() -> Self {
        Self {
            max_size_mb: default_image_max_mb(),
            supported_formats: default_formats(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteCommandConfig {
    #[serde(default = "default_command_timeout")]
    pub timeout_secs: u64,

    /// Base commands that may run. Empty means all.
    #[serde(default)]
    pub allowed_commands: Vec<String>,
}

fn default_command_timeout() -> u64 {
    30
}

impl Default for ExecuteCommandConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_command_timeout(),
            allowed_commands: Vec::new(),
        }
    }
}

/// Stage graph settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagConfig {
    #[serde(default = "default_parallel_nodes")]
    pub parallel_nodes: usize,

    #[serde(default = "default_dag_timeout")]
    pub timeout_secs: u64,

    /// Log node transitions at info instead of debug.
    #[serde(default)]
    pub verbose: bool,
}

fn default_parallel_nodes() -> usize {
    4
}
fn default_dag_timeout() -> u64 {
    300
}

impl Default for DagConfig {
    fn default() -> Self {
        Self {
            parallel_nodes: default_parallel_nodes(),
            timeout_secs: default_dag_timeout(),
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    /// Root of the per-session log files (`<directory>/<date>/<session>.log`).
    #[serde(default = "default_log_dir")]
    pub directory: PathBuf,

    #[serde(default)]
    pub format: LogFormat,

    /// Write the per-session log file.
    #[serde(default = "default_true")]
    pub file: bool,
}

fn default_level() -> String {
    "info".into()
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            directory: default_log_dir(),
            format: LogFormat::Text,
            file: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,

    #[serde(default = "default_memory_dir")]
    pub memory_dir: PathBuf,
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("history")
}
fn default_memory_dir() -> PathBuf {
    PathBuf::from("memory")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_dir: default_history_dir(),
            memory_dir: default_memory_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit path wins; otherwise the first existing file on the
    /// search path is used. Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::search_paths().into_iter().find(|p| p.exists()),
        };

        let mut config = match path {
            Some(path) => Self::load_from(&path)?,
            None => {
                tracing::info!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
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
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Candidate files, in lookup order.
    pub fn search_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from("configs").join("config.toml"),
            PathBuf::from("config.toml"),
            Self::config_dir().join("config.toml"),
        ]
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".rivet")
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// `RIVET_API_KEY` and then `OPENAI_API_KEY` fill a key the file left
    /// empty; `RIVET_BASE_URL` and `RIVET_MODEL` always win.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.api.api_key.as_deref().is_none_or(str::is_empty) {
            self.api.api_key = non_empty("RIVET_API_KEY").or_else(|| non_empty("OPENAI_API_KEY"));
        }

        if let Some(url) = non_empty("RIVET_BASE_URL") {
            self.api.base_url = url;
        }

        if let Some(model) = non_empty("RIVET_MODEL") {
            self.api.model = model;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.dag.parallel_nodes == 0 {
            return Err(ConfigError::ValidationError(
                "dag.parallel_nodes must be at least 1".into(),
            ));
        }

        if self.dag.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "dag.timeout_secs must be at least 1".into(),
            ));
        }

        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "api.base_url must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
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
