//! Configuration management
//!
//! This module handles loading, validation, and management of the Viva configuration.
//! Configuration is stored in TOML format at ~/.viva/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **server**: HTTP bind address and CORS policy
//! - **llm**: Hosted completion provider settings
//! - **discovery**: Sampling settings for each generation the discovery flow makes
//! - **tokens**: Token estimation settings used by the budget guard
//! - **auth**: Session lifetime
//!
//! # Path Expansion
//!
//! `core.data_dir` supports `~` and is created if it doesn't exist. The
//! SQLite database lives at `<data_dir>/viva.db`.
//!
//! # Examples
//!
//! ```no_run
//! use viva_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Listening on {}", config.server.bind_address());
//! println!("Model: {}", config.llm.openai.model);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    pub core: CoreConfig,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Completion provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Per-generation sampling settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Token estimation settings
    #[serde(default)]
    pub tokens: TokensConfig,

    /// Session settings
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allow cross-origin requests from any origin (browser clients on another host)
    #[serde(default)]
    pub cors_allow_any_origin: bool,
}

/// Completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LLMConfig {
    /// OpenAI-compatible provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for OpenAI API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_openai_timeout")]
    pub timeout_secs: u64,
    // Note: API key comes from OPENAI_API_KEY or the OS keychain, never from config
}

/// Sampling settings for one generation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Sampling settings for every generation of the discovery flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Warm acknowledgment after step 1
    #[serde(default = "default_acknowledgment")]
    pub acknowledgment: GenerationConfig,

    /// Theme detection (strict JSON) after step 2
    #[serde(default = "default_pattern_detection")]
    pub pattern_detection: GenerationConfig,

    /// Theme-naming message after step 2
    #[serde(default = "default_pattern_message")]
    pub pattern_message: GenerationConfig,

    /// Final vision statement after step 3
    #[serde(default = "default_vision")]
    pub vision: GenerationConfig,
}

/// Token estimation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokensConfig {
    /// Characters counted as one token when estimating prompt size
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of issued bearer sessions
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.viva")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_openai_timeout() -> u64 {
    60
}

fn default_acknowledgment() -> GenerationConfig {
    GenerationConfig {
        temperature: 0.8,
        max_tokens: 150,
    }
}

fn default_pattern_detection() -> GenerationConfig {
    GenerationConfig {
        temperature: 0.3,
        max_tokens: 200,
    }
}

fn default_pattern_message() -> GenerationConfig {
    GenerationConfig {
        temperature: 0.8,
        max_tokens: 250,
    }
}

fn default_vision() -> GenerationConfig {
    GenerationConfig {
        temperature: 0.7,
        max_tokens: 800,
    }
}

fn default_chars_per_token() -> usize {
    4
}

fn default_session_ttl_hours() -> u64 {
    720
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_allow_any_origin: false,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            timeout_secs: default_openai_timeout(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            acknowledgment: default_acknowledgment(),
            pattern_detection: default_pattern_detection(),
            pattern_message: default_pattern_message(),
            vision: default_vision(),
        }
    }
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            chars_per_token: default_chars_per_token(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.viva/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Serialize before processing so the file keeps the portable "~" form
        let config = Self::default_config();
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.viva/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".viva").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            server: ServerConfig::default(),
            llm: LLMConfig::default(),
            discovery: DiscoveryConfig::default(),
            tokens: TokensConfig::default(),
            auth: AuthConfig::default(),
        }
    }

    /// Path of the SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("viva.db")
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates log level, sampling settings and token settings
    /// - Expands ~ in the data directory
    /// - Creates the data directory if it doesn't exist
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        // Validate log level
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let generations = [
            ("acknowledgment", &self.discovery.acknowledgment),
            ("pattern_detection", &self.discovery.pattern_detection),
            ("pattern_message", &self.discovery.pattern_message),
            ("vision", &self.discovery.vision),
        ];
        for (name, generation) in generations {
            if !(0.0..=2.0).contains(&generation.temperature) {
                return Err(EngineError::Config(format!(
                    "discovery.{}.temperature must be between 0.0 and 2.0",
                    name
                )));
            }
            if generation.max_tokens == 0 {
                return Err(EngineError::Config(format!(
                    "discovery.{}.max_tokens must be greater than 0",
                    name
                )));
            }
        }

        if self.tokens.chars_per_token == 0 {
            return Err(EngineError::Config(
                "tokens.chars_per_token must be greater than 0".to_string(),
            ));
        }

        if self.auth.session_ttl_hours == 0 {
            return Err(EngineError::Config(
                "auth.session_ttl_hours must be greater than 0".to_string(),
            ));
        }

        if self.llm.openai.model.trim().is_empty() {
            return Err(EngineError::Config(
                "llm.openai.model must not be empty".to_string(),
            ));
        }

        // Expand and create the data directory
        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
///
/// # Examples
///
/// ```ignore
/// let path = PathBuf::from("~/.viva");
/// let expanded = expand_path(&path)?;
/// // expanded is now /home/user/.viva (on Unix)
/// ```
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
