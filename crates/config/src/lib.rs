//! Configuration loading, validation, and management for RelayChat.
//!
//! Loads configuration from `~/.relaychat/config.toml` with environment
//! variable overrides for secrets. Validates all settings at startup.

use relaychat_core::message::DEFAULT_GREETING;
use relaychat_core::model::{ModelRegistry, ModelSpec, ProviderKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Persona used when no `[persona]` section overrides it.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI coding assistant. \
You can help with almost any programming request. \
Keep answers short unless a long response is requested.";

/// The root configuration structure.
///
/// Maps directly to `~/.relaychat/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model ids that are sent without `temperature`.
    ///
    /// Only `o3-mini` is listed by default. The built-in `o1` still gets
    /// `temperature`; add it here if the upstream rejects it with a 400.
    #[serde(default = "default_sampling_exempt")]
    pub sampling_exempt_models: Vec<String>,

    /// System persona and greeting
    #[serde(default)]
    pub persona: PersonaConfig,

    /// Chat defaults (history window, default model)
    #[serde(default)]
    pub chat: ChatConfig,

    /// Upstream provider credentials and endpoints
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Extra or overriding model registry entries
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub models: BTreeMap<String, ModelSpec>,

    /// Conversation store persistence
    #[serde(default)]
    pub store: StoreConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_sampling_exempt() -> Vec<String> {
    vec!["o3-mini".into()]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sampling_exempt_models: default_sampling_exempt(),
            persona: PersonaConfig::default(),
            chat: ChatConfig::default(),
            providers: ProvidersConfig::default(),
            models: BTreeMap::new(),
            store: StoreConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// System prompt sent with every provider request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// First assistant turn of every new conversation
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}
fn default_greeting() -> String {
    DEFAULT_GREETING.into()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            greeting: default_greeting(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Number of stored messages considered for the context window
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Model used when a request does not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Conversation id used when a request does not name one
    #[serde(default = "default_chat_id")]
    pub default_chat_id: String,
}

fn default_history_limit() -> usize {
    5
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_chat_id() -> String {
    "default".into()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            default_model: default_model(),
            default_chat_id: default_chat_id(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderConfig,

    #[serde(default)]
    pub anthropic: ProviderConfig,
}

impl ProvidersConfig {
    pub fn get(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Which persistence backend the conversation store flushes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    /// Pretty-printed JSON file
    File,
    /// Keep the last snapshot in memory only
    Memory,
    /// Discard snapshots
    #[serde(rename = "none")]
    Noop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackendKind,

    /// Location of the JSON file (file backend only)
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_backend() -> StoreBackendKind {
    StoreBackendKind::File
}
fn default_store_path() -> PathBuf {
    AppConfig::config_dir().join("chat_histories.json")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    5000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.relaychat/config.toml).
    ///
    /// Also checks environment variables:
    /// - `OPENAI_API_KEY`
    /// - `CLAUDE_API_KEY`, then `ANTHROPIC_API_KEY`
    /// - `RELAYCHAT_MODEL` overrides the default model
    /// - `RELAYCHAT_STORE_PATH` overrides the history file location
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
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
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if self.providers.openai.api_key.is_none() {
            self.providers.openai.api_key = std::env::var("OPENAI_API_KEY").ok();
        }

        if self.providers.anthropic.api_key.is_none() {
            self.providers.anthropic.api_key = std::env::var("CLAUDE_API_KEY")
                .ok()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("RELAYCHAT_MODEL") {
            self.chat.default_model = model;
        }

        if let Ok(path) = std::env::var("RELAYCHAT_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".relaychat")
    }

    /// The built-in models merged with `[models.*]` entries from the file.
    pub fn model_registry(&self) -> ModelRegistry {
        let mut registry = ModelRegistry::builtin();
        registry.extend(self.models.clone());
        registry
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "chat.history_limit must be at least 1".into(),
            ));
        }

        if self.persona.system_prompt.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "persona.system_prompt must not be empty".into(),
            ));
        }

        if !self.model_registry().contains(&self.chat.default_model) {
            return Err(ConfigError::ValidationError(format!(
                "chat.default_model '{}' is not a registered model",
                self.chat.default_model
            )));
        }

        Ok(())
    }

    /// Check whether credentials exist for a provider.
    pub fn has_api_key(&self, kind: ProviderKind) -> bool {
        self.providers.get(kind).api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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
