//! # sf-config
//!
//! Layered settings: built-in defaults, then an optional `study-forum.toml`,
//! then `FORUM__SECTION__KEY` environment variables. A `.env` file is loaded
//! into the process environment first.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

pub const DEFAULT_CONFIG_FILE: &str = "study-forum.toml";
pub const ENV_PREFIX: &str = "FORUM";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub ai: AiSettings,
    pub rate_limit: RateLimitSettings,
    pub log: LogSettings,
    /// The `.env` file that was applied, if any
    #[serde(skip)]
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Allowed browser origin; any origin when unset
    #[serde(default)]
    pub cors_origin: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiSettings {
    pub enabled: bool,
    #[serde(default, deserialize_with = "optional_secret")]
    pub api_key: Option<SecretString>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl AiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The key, when AI is switched on and one is present.
    pub fn active_key(&self) -> Option<&SecretString> {
        self.api_key
            .as_ref()
            .filter(|k| self.enabled && !k.expose_secret().trim().is_empty())
    }
}

/// Per client address, over every `/api` route.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    pub requests: u32,
    pub window_secs: u64,
}

impl RateLimitSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `tracing` filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub json: bool,
}

fn optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(SecretString::from))
}

impl Settings {
    /// Reads `.env`, then `study-forum.toml` (if present), then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let env_file = dotenvy::dotenv().ok();
        let env = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true);
        let mut settings = Self::from_sources(Some(Path::new(DEFAULT_CONFIG_FILE)), env)?;
        settings.env_file = env_file;
        Ok(settings)
    }

    pub fn from_sources(file: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "sqlite://study_forum.db")?
            .set_default("database.max_connections", 5)?
            .set_default("ai.enabled", true)?
            .set_default("ai.model", "gemini-2.5-flash")?
            .set_default("ai.base_url", "https://generativelanguage.googleapis.com")?
            .set_default("ai.timeout_secs", 30)?
            .set_default("rate_limit.requests", 100)?
            .set_default("rate_limit.window_secs", 900)?
            .set_default("log.level", "info")?
            .set_default("log.json", false)?;

        // The provider's conventional variable, below anything set explicitly.
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            builder = builder.set_default("ai.api_key", key)?;
        }

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }

        let settings: Settings = builder.add_source(env).build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("database.max_connections must be at least 1".into()));
        }
        if self.ai.timeout_secs == 0 {
            return Err(ConfigError::Invalid("ai.timeout_secs must be at least 1".into()));
        }
        if self.rate_limit.requests == 0 || self.rate_limit.window_secs == 0 {
            return Err(ConfigError::Invalid("rate_limit.requests and rate_limit.window_secs must be at least 1".into()));
        }
        if self.ai.model.trim().is_empty() {
            return Err(ConfigError::Invalid("ai.model must not be empty".into()));
        }
        Ok(())
    }
}
