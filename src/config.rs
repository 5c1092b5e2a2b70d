//! Configuration management for modelrelay
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Validation runs at load time so a misconfigured service fails at startup
//! rather than on its first request.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::roster::ModelRoster;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout() -> u64 {
    30
}

/// Upstream provider endpoint and credential source.
///
/// The credential itself never appears in the config file; the file names
/// the environment variable that holds it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

impl ProviderConfig {
    /// Read the provider credential from the configured environment variable.
    pub fn resolve_api_key(&self) -> AppResult<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(AppError::Config(format!(
                "provider credential missing: set the {} environment variable",
                self.api_key_env
            ))),
        }
    }
}

/// Model roster configuration: the primary model plus ordered fallbacks.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelsConfig {
    pub primary: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

impl ModelsConfig {
    /// Build the immutable fallback roster.
    pub fn roster(&self) -> AppResult<ModelRoster> {
        ModelRoster::new(self.primary.clone(), self.fallbacks.iter().cloned())
    }
}

/// Default sampling parameters applied when a request omits them.
///
/// Fields are private to prevent post-validation mutation; use the getters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    max_output_tokens: u32,
}

impl GenerationConfig {
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

fn default_temperature() -> f64 {
    crate::provider::DEFAULT_TEMPERATURE
}

fn default_max_output_tokens() -> u32 {
    crate::provider::DEFAULT_MAX_OUTPUT_TOKENS
}

/// Retry behavior for buffered requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    max_attempts: usize,
    #[serde(default = "default_backoff_ms")]
    backoff_ms: u64,
}

impl RetryConfig {
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn backoff_ms(&self) -> u64 {
        self.backoff_ms
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> usize {
    crate::backoff::DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_ms() -> u64 {
    crate::backoff::DEFAULT_BACKOFF_MS
}

/// Streaming delivery tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    #[serde(default = "default_keepalive_seconds")]
    keepalive_seconds: u64,
    #[serde(default = "default_tail_chars")]
    tail_chars: usize,
}

impl StreamConfig {
    pub fn keepalive_seconds(&self) -> u64 {
        self.keepalive_seconds
    }

    pub fn tail_chars(&self) -> usize {
        self.tail_chars
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keepalive_seconds: default_keepalive_seconds(),
            tail_chars: default_tail_chars(),
        }
    }
}

fn default_keepalive_seconds() -> u64 {
    15
}

fn default_tail_chars() -> usize {
    crate::orchestrator::dedupe::DEFAULT_TAIL_CHARS
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        // Phase 3: Validate parsed config (provides contextual reason)
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()`, but can also be called
    /// explicitly when constructing Config via other means (e.g., in tests).
    pub fn validate(&self) -> AppResult<()> {
        // Model roster: non-blank primary and fallbacks.
        self.models.roster()?;

        // Provider endpoint must be an http(s) URL.
        if !self.provider.base_url.starts_with("http://")
            && !self.provider.base_url.starts_with("https://")
        {
            return Err(AppError::Config(format!(
                "provider.base_url '{}' must start with 'http://' or 'https://'",
                self.provider.base_url
            )));
        }
        if self.provider.api_key_env.trim().is_empty() {
            return Err(AppError::Config(
                "provider.api_key_env must not be blank".to_string(),
            ));
        }

        // Sampling defaults: same bounds the request type enforces.
        let temperature = self.generation.temperature();
        if !temperature.is_finite() || !(0.0..=2.0).contains(&temperature) {
            return Err(AppError::Config(format!(
                "generation.temperature must be a finite number between 0.0 and 2.0, got {}",
                temperature
            )));
        }
        if self.generation.max_output_tokens() == 0 {
            return Err(AppError::Config(
                "generation.max_output_tokens must be greater than 0".to_string(),
            ));
        }

        // Retry: at least one attempt, non-zero backoff base.
        if self.retry.max_attempts() == 0 {
            return Err(AppError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.backoff_ms() == 0 {
            return Err(AppError::Config(
                "retry.backoff_ms must be greater than 0".to_string(),
            ));
        }

        // Streaming: keepalive must be sane, tail window small but non-zero.
        if self.stream.keepalive_seconds() == 0 || self.stream.keepalive_seconds() > 300 {
            return Err(AppError::Config(format!(
                "stream.keepalive_seconds must be between 1 and 300, got {}",
                self.stream.keepalive_seconds()
            )));
        }
        if self.stream.tail_chars() == 0 || self.stream.tail_chars() > 4096 {
            return Err(AppError::Config(format!(
                "stream.tail_chars must be between 1 and 4096, got {}",
                self.stream.tail_chars()
            )));
        }

        // Request timeout bounds buffered provider calls.
        if self.server.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "server.request_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.server.request_timeout_seconds > 300 {
            return Err(AppError::Config(format!(
                "server.request_timeout_seconds cannot exceed 300 seconds (5 minutes), got {}",
                self.server.request_timeout_seconds
            )));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        // Validate config before returning
        config.validate()?;
        Ok(config)
    }
}
