//! Core configuration types.

use super::defaults::{DEFAULT_URL, DEFAULT_WEBHOOK_PORT, default_prefix};
use super::env::interpolate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Well-known keys in the `[values]` table.
pub mod keys {
    pub const LOGIN_TOKEN: &str = "login_token";
    pub const WEBHOOK_PORT: &str = "webhook_port";
    pub const URL: &str = "url";
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("values.{key} references unset environment variable '{var}'")]
    UnsetVariable { key: String, var: String },
    #[error("values.{0} is required")]
    MissingValue(&'static str),
    #[error("values.webhook_port is not a valid port: '{0}'")]
    InvalidPort(String),
}

/// Bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Fallback command prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Catalog names of the modules to load, in order.
    #[serde(default)]
    pub modules: Vec<String>,
    /// Free-form values. `${VAR}` references are resolved at load time.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            modules: Vec::new(),
            values: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, resolving against the process
    /// environment.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, |name| std::env::var(name).ok())
    }

    /// Parse TOML text and resolve it with the given environment lookup.
    pub fn parse(
        content: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.resolve(env)
    }

    fn resolve(mut self, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        for (key, value) in self.values.iter_mut() {
            *value = interpolate(value, &env).map_err(|var| ConfigError::UnsetVariable {
                key: key.clone(),
                var,
            })?;
        }

        if self
            .values
            .get(keys::LOGIN_TOKEN)
            .is_none_or(|token| token.is_empty())
        {
            return Err(ConfigError::MissingValue(keys::LOGIN_TOKEN));
        }

        if let Some(port) = env("PORT") {
            self.values.insert(keys::WEBHOOK_PORT.to_string(), port);
        }
        self.values
            .entry(keys::WEBHOOK_PORT.to_string())
            .or_insert_with(|| DEFAULT_WEBHOOK_PORT.to_string());
        self.values
            .entry(keys::URL.to_string())
            .or_insert_with(|| DEFAULT_URL.to_string());

        Ok(self)
    }

    /// Override the fallback prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn login_token(&self) -> Option<&str> {
        self.value(keys::LOGIN_TOKEN)
    }

    pub fn url(&self) -> &str {
        self.value(keys::URL).unwrap_or(DEFAULT_URL)
    }

    /// Webhook listener port.
    pub fn webhook_port(&self) -> Result<u16, ConfigError> {
        let raw = self.value(keys::WEBHOOK_PORT).unwrap_or(DEFAULT_WEBHOOK_PORT);
        raw.trim()
            .parse()
            .map_err(|_| ConfigError::InvalidPort(raw.to_string()))
    }
}
