//! Configuration system
//!
//! Supports loading configuration from:
//! 1. CLI --config argument
//! 2. ~/.config/subvenciones/config.{SUBVENCIONES_ENV}.json
//! 3. Default values
//!
//! Where SUBVENCIONES_ENV can be: production (default), development, test
//!
//! # Examples
//!
//! ```
//! use subvenciones::config::{AppConfig, ModelProvider};
//!
//! let mut config = AppConfig::default();
//! config.model.provider = ModelProvider::Gemini;
//! config.model.url = "https://generativelanguage.googleapis.com/v1beta".to_string();
//! config.model.model = "gemini-1.5-flash-latest".to_string();
//! config.model.api_key = Some("GEMINI_API_KEY".to_string());
//!
//! config.validate().unwrap();
//! ```
//!
//! ## Environment Variables
//!
//! Environment variables override config file values:
//! - SUBVENCIONES_PROVIDER
//! - SUBVENCIONES_MODEL_URL
//! - SUBVENCIONES_MODEL
//! - SUBVENCIONES_REGISTRY_URL
//! - SUBVENCIONES_PROMPTS_DIR
//! - OPENAI_API_KEY / GEMINI_API_KEY (through `api_key`)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[default]
    Ollama,
    OpenAI,
    Gemini,
}

impl std::fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAI => write!(f, "openai"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

impl std::str::FromStr for ModelProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "gemini" | "google" => Ok(Self::Gemini),
            _ => Err(ConfigError::ValidationError(format!(
                "Unknown provider: {}",
                s
            ))),
        }
    }
}

/// Configuration for the completion model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider type
    pub provider: ModelProvider,

    /// API base URL
    #[serde(default = "default_ollama_url")]
    pub url: String,

    /// Model name
    pub model: String,

    /// API key (can be environment variable name like "GEMINI_API_KEY")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Temperature (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Top P sampling (0.0 - 1.0)
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,

    /// Per-request timeout in seconds
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_top_p() -> f32 {
    0.9
}

fn default_model_timeout() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::Ollama,
            url: default_ollama_url(),
            model: "qwen3:8b".to_string(),
            api_key: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: None,
            timeout_secs: default_model_timeout(),
        }
    }
}

impl ModelConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "Temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }

        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ConfigError::ValidationError(format!(
                "Top P must be between 0.0 and 1.0, got {}",
                self.top_p
            )));
        }

        if self.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "URL cannot be empty".to_string(),
            ));
        }

        if self.model.is_empty() {
            return Err(ConfigError::ValidationError(
                "Model name cannot be empty".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "model.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.provider != ModelProvider::Ollama && self.api_key.is_none() {
            return Err(ConfigError::ValidationError(format!(
                "API key required for {} provider",
                self.provider
            )));
        }

        Ok(())
    }

    /// Resolve API key from environment variable if needed
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.as_ref().and_then(|key| {
            if key.chars().all(|c| c.is_uppercase() || c == '_') {
                std::env::var(key).ok()
            } else {
                Some(key.clone())
            }
        })
    }
}

/// Subsidies registry (BDNS) connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the public API
    #[serde(default = "default_registry_url")]
    pub base_url: String,

    /// Fixed timeout per call, in seconds
    #[serde(default = "default_registry_timeout")]
    pub timeout_secs: u64,

    /// Concurrent detail lookups when enriching search results
    #[serde(default = "default_enrichment_workers")]
    pub enrichment_workers: usize,

    /// Attach budget / regions / beneficiary types to search hits
    #[serde(default = "default_true")]
    pub enrich_search_results: bool,
}

fn default_registry_url() -> String {
    "https://www.infosubvenciones.es/bdnstrans/api".to_string()
}

fn default_registry_timeout() -> u64 {
    10
}

fn default_enrichment_workers() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: default_registry_url(),
            timeout_secs: default_registry_timeout(),
            enrichment_workers: default_enrichment_workers(),
            enrich_search_results: true,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Completion model used by every node
    pub model: ModelConfig,

    /// Subsidies registry API
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Directory with `<template>.txt` overrides for the built-in prompts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts_dir: Option<PathBuf>,

    /// Turns kept per conversation
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    /// Language for fixed user-facing messages ("es" or "en", defaults to system locale)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

fn default_history_turns() -> usize {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            registry: RegistryConfig::default(),
            prompts_dir: None,
            history_turns: default_history_turns(),
            language: None,
            debug: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AppConfig = serde_json::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration with standard priority:
    /// 1. Explicit path
    /// 2. ~/.config/subvenciones/config.{SUBVENCIONES_ENV}.json
    /// 3. Defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit_path {
            if path.exists() {
                tracing::info!("Loading config from: {:?}", path);
                return Self::from_file(path);
            } else {
                return Err(ConfigError::ValidationError(format!(
                    "Config file not found: {:?}",
                    path
                )));
            }
        }

        let env =
            std::env::var("SUBVENCIONES_ENV").unwrap_or_else(|_| "production".to_string());

        if let Some(config_dir) = Self::config_dir() {
            let config_path = config_dir.join(format!("config.{}.json", env));

            if config_path.exists() {
                tracing::info!("Loading config from: {:?}", config_path);
                return Self::from_file(&config_path);
            }
        }

        tracing::info!("Using default configuration with environment overrides");
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(provider) = std::env::var("SUBVENCIONES_PROVIDER") {
            match provider.parse::<ModelProvider>() {
                Ok(provider) => self.model.provider = provider,
                Err(e) => tracing::warn!("Ignoring SUBVENCIONES_PROVIDER: {}", e),
            }
        }

        if let Ok(url) = std::env::var("SUBVENCIONES_MODEL_URL") {
            self.model.url = url;
        }

        if let Ok(model) = std::env::var("SUBVENCIONES_MODEL") {
            self.model.model = model;
        }

        if let Ok(url) = std::env::var("SUBVENCIONES_REGISTRY_URL") {
            self.registry.base_url = url;
        }

        if let Ok(dir) = std::env::var("SUBVENCIONES_PROMPTS_DIR") {
            self.prompts_dir = Some(PathBuf::from(dir));
        }

        // API keys are resolved on-demand via resolve_api_key()
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model.validate()?;

        if self.registry.base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "registry.base_url cannot be empty".to_string(),
            ));
        }

        if self.registry.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "registry.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.registry.enrichment_workers == 0 {
            return Err(ConfigError::ValidationError(
                "registry.enrichment_workers must be greater than 0".to_string(),
            ));
        }

        if self.history_turns == 0 {
            return Err(ConfigError::ValidationError(
                "history_turns must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("subvenciones"))
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model.provider, ModelProvider::Ollama);
        assert_eq!(config.registry.timeout_secs, 10);
        assert_eq!(config.registry.enrichment_workers, 5);
        assert_eq!(config.history_turns, 5);
    }

    #[test]
    fn test_model_config_validation() {
        let mut config = ModelConfig::default();
        assert!(config.validate().is_ok());

        config.temperature = 3.0;
        assert!(config.validate().is_err());

        config.temperature = 0.7;
        config.top_p = 1.5;
        assert!(config.validate().is_err());

        config.top_p = 0.9;
        config.provider = ModelProvider::Gemini;
        assert!(config.validate().is_err(), "hosted providers need an API key");
    }

    #[test]
    fn test_registry_validation() {
        let mut config = AppConfig::default();
        config.registry.enrichment_workers = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.history_turns = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("ollama".parse::<ModelProvider>().unwrap(), ModelProvider::Ollama);
        assert_eq!("OpenAI".parse::<ModelProvider>().unwrap(), ModelProvider::OpenAI);
        assert_eq!("GEMINI".parse::<ModelProvider>().unwrap(), ModelProvider::Gemini);
        assert!("invalid".parse::<ModelProvider>().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.test.json");
        std::fs::write(
            &path,
            r#"{ "model": { "provider": "ollama", "model": "llama3.1:8b" } }"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.model.model, "llama3.1:8b");
        assert_eq!(config.registry.base_url, default_registry_url());
        assert!(config.registry.enrich_search_results);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = AppConfig::default();
        config.save_to_file(&path).unwrap();

        let parsed: AppConfig =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.model.model, parsed.model.model);
        assert_eq!(config.history_turns, parsed.history_turns);
    }
}
