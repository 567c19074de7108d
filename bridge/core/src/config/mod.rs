//! TOML Configuration File Support
//!
//! Centralized configuration loading for the bridge, supporting a TOML file
//! at `~/.config/ollama-bridge/bridge.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/ollama-bridge/bridge.toml` (typically `~/.config/ollama-bridge/bridge.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [backend]
//! base_url = "http://localhost:11434"
//! connect_timeout_secs = 5
//!
//! [chat]
//! default_model = "qwen3:8b"
//! max_steps = 5
//! default_think = true
//! system_prompt = "You are a helpful assistant."
//!
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [tools]
//! weather_base_url = "https://api.open-meteo.com"
//! geocoding_base_url = "https://geocoding-api.open-meteo.com"
//!
//! [models."qwen3:8b"]
//! temperature = 0.5
//! ```

mod sampling;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::normalize_base_url;

pub use sampling::{SamplingOptions, SamplingTable, SamplingToml};

/// Default Ollama address
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default generation-pass bound per turn
pub const DEFAULT_MAX_STEPS: usize = 5;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Backend section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// Ollama base URL
    pub base_url: Option<String>,

    /// TCP connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,

    /// Whole-request timeout in seconds (unset = none)
    pub request_timeout_secs: Option<u64>,
}

/// Chat section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Model used when a request names none
    pub default_model: Option<String>,

    /// Maximum generation passes per turn
    pub max_steps: Option<usize>,

    /// Think mode used when a request does not say
    pub default_think: Option<bool>,

    /// System prompt prepended to every conversation
    pub system_prompt: Option<String>,

    /// Whether tools are offered to the model
    pub enable_tools: Option<bool>,
}

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Listen address
    pub bind: Option<String>,
}

/// Tools section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsToml {
    /// Open-Meteo forecast API base URL
    pub weather_base_url: Option<String>,

    /// Open-Meteo geocoding API base URL
    pub geocoding_base_url: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeToml {
    /// Backend configuration section
    pub backend: BackendToml,

    /// Chat configuration section
    pub chat: ChatToml,

    /// Server configuration section
    pub server: ServerToml,

    /// Tools configuration section
    pub tools: ToolsToml,

    /// Per-model sampling overrides
    pub models: HashMap<String, SamplingToml>,
}

// =============================================================================
// Resolved Settings
// =============================================================================

/// How to reach the backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendSettings {
    /// Base URL, trailing slashes removed
    pub base_url: String,
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: None,
        }
    }
}

/// Turn defaults
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatSettings {
    /// Model used when a request names none
    pub default_model: String,
    /// Maximum generation passes per turn
    pub max_steps: usize,
    /// Think mode used when a request does not say; `None` omits the field
    pub default_think: Option<bool>,
    /// System prompt prepended to every conversation
    pub system_prompt: Option<String>,
    /// Whether tools are offered to the model
    pub enable_tools: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            default_model: "llama3.2".to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            default_think: None,
            system_prompt: None,
            enable_tools: true,
        }
    }
}

/// HTTP server settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerSettings {
    /// Listen address
    pub bind: SocketAddr,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

/// Built-in tool endpoints
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolSettings {
    /// Open-Meteo forecast API base URL
    pub weather_base_url: String,
    /// Open-Meteo geocoding API base URL
    pub geocoding_base_url: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            weather_base_url: "https://api.open-meteo.com".to_string(),
            geocoding_base_url: "https://geocoding-api.open-meteo.com".to_string(),
        }
    }
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized configuration for the bridge
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug, Default)]
pub struct BridgeConfig {
    /// Backend connection
    pub backend: BackendSettings,

    /// Turn defaults
    pub chat: ChatSettings,

    /// HTTP server
    pub server: ServerSettings,

    /// Built-in tools
    pub tools: ToolSettings,

    /// Sampling parameters per model
    pub sampling: SamplingTable,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Highest-priority source that contributed a value
    source: ConfigSource,
}

impl BridgeConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a zero step bound or an
    /// unusable backend URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "chat.max_steps must be at least 1".to_string(),
            ));
        }
        if self.chat.default_model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "chat.default_model must not be empty".to_string(),
            ));
        }
        normalize_base_url(&self.backend.base_url)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/ollama-bridge/bridge.toml` or
/// `~/.config/ollama-bridge/bridge.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ollama-bridge").join("bridge.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// result fails validation. A missing config file is not an error.
pub fn load_config() -> Result<BridgeConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or the result fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<BridgeConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<BridgeConfig, ConfigError> {
    let mut config = BridgeConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: BridgeToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut BridgeConfig, toml: &BridgeToml) -> Result<(), ConfigError> {
    // Backend settings
    if let Some(ref url) = toml.backend.base_url {
        config.backend.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(timeout) = toml.backend.connect_timeout_secs {
        config.backend.connect_timeout_secs = timeout;
    }
    if toml.backend.request_timeout_secs.is_some() {
        config.backend.request_timeout_secs = toml.backend.request_timeout_secs;
    }

    // Chat settings
    if let Some(ref model) = toml.chat.default_model {
        config.chat.default_model.clone_from(model);
    }
    if let Some(steps) = toml.chat.max_steps {
        config.chat.max_steps = steps;
    }
    if toml.chat.default_think.is_some() {
        config.chat.default_think = toml.chat.default_think;
    }
    if toml.chat.system_prompt.is_some() {
        config.chat.system_prompt.clone_from(&toml.chat.system_prompt);
    }
    if let Some(enabled) = toml.chat.enable_tools {
        config.chat.enable_tools = enabled;
    }

    // Server settings
    if let Some(ref bind) = toml.server.bind {
        config.server.bind = parse_bind(bind)?;
    }

    // Tool settings
    if let Some(ref url) = toml.tools.weather_base_url {
        config.tools.weather_base_url.clone_from(url);
    }
    if let Some(ref url) = toml.tools.geocoding_base_url {
        config.tools.geocoding_base_url.clone_from(url);
    }

    config.sampling.apply_overrides(&toml.models);
    Ok(())
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut BridgeConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(url) = env("OLLAMA_URL").filter(|u| !u.trim().is_empty()) {
        config.backend.base_url = url.trim().trim_end_matches('/').to_string();
        config.source = ConfigSource::Env;
    }

    if let Some(model) = env("BRIDGE_DEFAULT_MODEL").filter(|m| !m.trim().is_empty()) {
        config.chat.default_model = model;
        config.source = ConfigSource::Env;
    }

    if let Some(steps) = env("BRIDGE_MAX_STEPS") {
        match steps.parse::<usize>() {
            Ok(n) => {
                config.chat.max_steps = n;
                config.source = ConfigSource::Env;
            }
            Err(e) => warn!(value = %steps, error = %e, "Ignoring invalid BRIDGE_MAX_STEPS"),
        }
    }

    if let Some(bind) = env("BRIDGE_BIND") {
        match parse_bind(&bind) {
            Ok(addr) => {
                config.server.bind = addr;
                config.source = ConfigSource::Env;
            }
            Err(e) => warn!(value = %bind, error = %e, "Ignoring invalid BRIDGE_BIND"),
        }
    }
}

fn parse_bind(bind: &str) -> Result<SocketAddr, ConfigError> {
    bind.parse()
        .map_err(|e| ConfigError::ValidationError(format!("invalid bind address {bind:?}: {e}")))
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Listen address override
    pub bind: Option<SocketAddr>,

    /// Backend URL override
    pub ollama_url: Option<String>,

    /// Default model override
    pub default_model: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set listen address override
    #[must_use]
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = Some(bind);
        self
    }

    /// Set backend URL override
    #[must_use]
    pub fn with_ollama_url(mut self, url: String) -> Self {
        self.ollama_url = Some(url);
        self
    }

    /// Set default model override
    #[must_use]
    pub fn with_default_model(mut self, model: String) -> Self {
        self.default_model = Some(model);
        self
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the overridden configuration fails validation.
    pub fn apply(&self, config: &mut BridgeConfig) -> Result<(), ConfigError> {
        if let Some(bind) = self.bind {
            config.server.bind = bind;
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.ollama_url {
            config.backend.base_url = url.trim().trim_end_matches('/').to_string();
            config.source = ConfigSource::Cli;
        }

        if let Some(ref model) = self.default_model {
            config.chat.default_model.clone_from(model);
            config.source = ConfigSource::Cli;
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
