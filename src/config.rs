//! Client configuration parsed from environment variables.

use std::path::PathBuf;

pub const PRODUCTION_BASE_URL: &str = "https://societaire.entrelac.coop/api/";
pub const DEVELOPMENT_BASE_URL: &str = "http://localhost:8080/";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Errors produced while building a [`ClientConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown SOCIETAIRE_ENV: {0} (expected 'production' or 'development')")]
    UnknownEnvironment(String),
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("no data directory available; set SOCIETAIRE_DATA_DIR")]
    MissingDataDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    /// Parse `production`/`prod` or `development`/`dev`, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownEnvironment`] for anything else.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            _ => Err(ConfigError::UnknownEnvironment(raw.to_owned())),
        }
    }

    #[must_use]
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_BASE_URL,
            Self::Development => DEVELOPMENT_BASE_URL,
        }
    }
}

/// Settings fixed for the lifetime of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub environment: Environment,
    /// Base URL, always ending in `/` so endpoint paths join relative to it.
    pub base_url: String,
    /// Directory for the durable token store.
    pub data_dir: Option<PathBuf>,
    pub connect_timeout_secs: u64,
}

impl ClientConfig {
    /// Config for `environment` with its default base URL.
    #[must_use]
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            environment,
            base_url: environment.default_base_url().to_owned(),
            data_dir: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    /// Override the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] unless the URL is absolute
    /// `http` or `https`.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ConfigError> {
        self.base_url = normalize_base_url(base_url)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `SOCIETAIRE_ENV`: `development` (default) or `production`
    /// - `SOCIETAIRE_BASE_URL`: overrides the environment's base URL
    /// - `SOCIETAIRE_DATA_DIR`: token store directory
    /// - `SOCIETAIRE_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns an error if the environment name or base URL is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = match std::env::var("SOCIETAIRE_ENV") {
            Ok(raw) => Environment::parse(&raw)?,
            Err(_) => Environment::default(),
        };
        let mut config = Self::for_environment(environment);
        if let Ok(base_url) = std::env::var("SOCIETAIRE_BASE_URL") {
            config = config.with_base_url(&base_url)?;
        }
        if let Ok(dir) = std::env::var("SOCIETAIRE_DATA_DIR") {
            config = config.with_data_dir(dir);
        }
        config.connect_timeout_secs =
            env_parse_u64("SOCIETAIRE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS);
        Ok(config)
    }

    /// Directory for the token store: the explicit one, else the platform
    /// data directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingDataDir`] if neither is available.
    pub fn resolve_data_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        directories::ProjectDirs::from("coop", "entrelac", "societaire")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(ConfigError::MissingDataDir)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::for_environment(Environment::default())
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let url = reqwest::Url::parse(trimmed).map_err(|e| ConfigError::InvalidBaseUrl(format!("{trimmed}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl(format!("{trimmed}: unsupported scheme")));
    }
    let mut normalized = url.to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Ok(normalized)
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
