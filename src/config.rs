//! Configuration management for the weather agent.
//!
//! Configuration is read from environment variables, optionally seeded from a
//! `.env` file (process environment wins over the file):
//! - `AI_PROVIDER` - Optional. `gemini` (default), `anthropic` or `openrouter`.
//! - `GEMINI_API_KEY` / `ANTHROPIC_API_KEY` / `OPENROUTER_API_KEY` - Required for
//!   the selected provider.
//! - `AI_MODEL` - Optional. Overrides the provider's default model.
//! - `AI_BASE_URL` - Optional. Overrides the provider's API root.
//! - `OPENWEATHER_API_KEY` - Required. OpenWeatherMap API key.
//! - `OPENWEATHER_BASE_URL` - Optional. Overrides the OpenWeatherMap API root.
//! - `MCP_SERVER_API_KEYS` - Optional. Comma-separated accepted keys. Empty
//!   disables authentication.
//! - `MCP_CLIENT_API_KEY` - Optional. Key presented to the tool session.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::auth::AuthContext;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to read env file {0}: {1}")]
    EnvFile(String, String),
}

/// Which model provider to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Gemini,
    Anthropic,
    OpenRouter,
}

impl BackendKind {
    /// Environment variable holding this provider's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            BackendKind::Gemini => "GEMINI_API_KEY",
            BackendKind::Anthropic => "ANTHROPIC_API_KEY",
            BackendKind::OpenRouter => "OPENROUTER_API_KEY",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(BackendKind::Gemini),
            "anthropic" => Ok(BackendKind::Anthropic),
            "openrouter" => Ok(BackendKind::OpenRouter),
            other => Err(format!(
                "unknown provider '{}', expected gemini, anthropic or openrouter",
                other
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Gemini => write!(f, "gemini"),
            BackendKind::Anthropic => write!(f, "anthropic"),
            BackendKind::OpenRouter => write!(f, "openrouter"),
        }
    }
}

/// Model backend selection and credentials.
#[derive(Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub api_key: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Weather API access.
#[derive(Clone)]
pub struct WeatherConfig {
    pub api_key: String,
    pub base_url: Option<String>,
}

impl fmt::Debug for WeatherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,

    pub weather: WeatherConfig,

    /// Accepted tool-session keys, already hashed.
    pub auth: AuthContext,

    /// Key presented by this client to the tool session.
    pub client_api_key: Option<String>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from the process environment, falling back to
    /// values in `path` for anything the environment does not set.
    pub fn from_env_file(path: &Path) -> Result<Self, ConfigError> {
        let file_vars = read_env_file(path)?;
        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| file_vars.get(key).cloned()))
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let kind = match get("AI_PROVIDER") {
            Some(v) => v
                .parse::<BackendKind>()
                .map_err(|e| ConfigError::InvalidValue("AI_PROVIDER".to_string(), e))?,
            None => BackendKind::Gemini,
        };

        let api_key = get(kind.api_key_var())
            .ok_or_else(|| ConfigError::MissingEnvVar(kind.api_key_var().to_string()))?;

        let backend = BackendConfig {
            kind,
            api_key,
            model: get("AI_MODEL"),
            base_url: get("AI_BASE_URL"),
        };

        let weather = WeatherConfig {
            api_key: get("OPENWEATHER_API_KEY")
                .ok_or_else(|| ConfigError::MissingEnvVar("OPENWEATHER_API_KEY".to_string()))?,
            base_url: get("OPENWEATHER_BASE_URL"),
        };

        let auth = get("MCP_SERVER_API_KEYS")
            .map(|keys| AuthContext::from_csv(&keys))
            .unwrap_or_default();

        Ok(Self {
            backend,
            weather,
            auth,
            client_api_key: get("MCP_CLIENT_API_KEY"),
        })
    }
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let display = path.display().to_string();
    let iter = dotenvy::from_path_iter(path)
        .map_err(|e| ConfigError::EnvFile(display.clone(), e.to_string()))?;

    iter.map(|item| item.map_err(|e| ConfigError::EnvFile(display.clone(), e.to_string())))
        .collect()
}
